//! Domain state types for proxytray.
//!
//! - `proxy`: the published, UI-facing state and its subscribe/notify holder
//! - `tunnel`: lifecycle phase of the SSH tunnel process
//! - `status`: detected system proxy mode and the combined status report

mod proxy;
mod status;
mod tunnel;

pub use proxy::{ProxyState, StateHolder, StateListener};
pub use status::{DetectedProxyMode, StatusReport};
pub use tunnel::TunnelPhase;
