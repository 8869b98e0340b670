//! SSH tunnel lifecycle.

use std::fmt;

/// Lifecycle of the tunnel process.
///
/// `Starting` covers the grace period before the forward counts as
/// established. `Failed` is left behind by a start that did not survive it and
/// is folded back to `Idle` by the next stop.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TunnelPhase {
    #[default]
    Idle,
    Starting,
    Running,
    Stopping,
    Failed,
}

impl fmt::Display for TunnelPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Starting => write!(f, "starting"),
            Self::Running => write!(f, "running"),
            Self::Stopping => write!(f, "stopping"),
            Self::Failed => write!(f, "failed"),
        }
    }
}
