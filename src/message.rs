//! Events sent from the controller worker to the front end.
//!
//! The worker owns the controller; front ends only ever see these messages
//! and render from them.

use crate::core::service::Command;
use crate::state::{ProxyState, StatusReport};

/// Everything the controller worker reports back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// Published state changed (also sent once at startup).
    StateChanged(ProxyState),
    /// A queued command failed; state has already been cleaned up if needed.
    OperationFailed {
        operation: Command,
        message: String,
        /// Settings or password have to be provided before retrying.
        setup_required: bool,
    },
    /// Answer to [`Command::Status`].
    Status(Box<StatusReport>),
    /// The tunnel died on its own while the proxy was active.
    TunnelLost,
    /// The worker cleaned up and exited.
    Stopped,
}
