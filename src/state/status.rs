//! Ground-truth inspection results.

use std::fmt;

use super::{ProxyState, TunnelPhase};

/// Proxy mode found in the live system settings. Derived, never stored.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DetectedProxyMode {
    #[default]
    None,
    /// Auto-proxy enabled and pointing at our PAC file.
    Pac,
    /// SOCKS proxy enabled and pointing at the local tunnel endpoint.
    Socks,
}

impl fmt::Display for DetectedProxyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Pac => write!(f, "pac"),
            Self::Socks => write!(f, "socks"),
        }
    }
}

/// Snapshot combining published state with what the system reports.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusReport {
    pub state: ProxyState,
    /// `Err` carries the reason detection failed (e.g. no usable services).
    pub detected: Result<DetectedProxyMode, String>,
    pub tunnel: TunnelPhase,
    /// Pid of the supervised SSH client, if one is alive.
    pub tunnel_pid: Option<u32>,
    /// Processes listening on the local SOCKS port, ours or not.
    pub port_listeners: Vec<u32>,
}

impl fmt::Display for StatusReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Proxy:     {}",
            if self.state.proxy_active {
                "active"
            } else {
                "inactive"
            }
        )?;
        writeln!(
            f,
            "Routing:   {}",
            if self.state.route_all {
                "all traffic"
            } else {
                "whitelist (PAC)"
            }
        )?;
        match &self.detected {
            Ok(mode) => writeln!(f, "Detected:  {mode}")?,
            Err(e) => writeln!(f, "Detected:  unknown ({e})")?,
        }
        match self.tunnel_pid {
            Some(pid) => writeln!(f, "Tunnel:    {} (pid {pid})", self.tunnel)?,
            None => writeln!(f, "Tunnel:    {}", self.tunnel)?,
        }
        if self.port_listeners.is_empty() {
            write!(f, "Listener:  none")
        } else {
            let pids: Vec<String> = self.port_listeners.iter().map(u32::to_string).collect();
            write!(f, "Listener:  pid {}", pids.join(", "))
        }
    }
}
