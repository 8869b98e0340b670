//! Error taxonomy shared by the proxy engines and the controller.

use std::io;

/// Result type for proxy operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while managing the tunnel and system proxy
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The whitelist contained no usable network after filtering.
    #[error("Whitelist is empty or invalid")]
    InvalidWhitelist,

    /// Tunnel settings failed validation.
    #[error("Invalid SSH settings: {0}")]
    InvalidTunnelSettings(String),

    /// The secret could not be sealed or persisted.
    #[error("Could not store password: {0}")]
    VaultWrite(String),

    /// No readable secret is stored.
    #[error("No SSH password stored")]
    MissingSecret,

    /// No active, queryable network service exists on the host.
    #[error("No usable network services found")]
    NoUsableNetworkServices,

    /// An OS command exited non-zero.
    #[error("External command failed (exit {exit_code}): {output}")]
    ExternalCommandFailed { exit_code: i32, output: String },

    /// The SSH tunnel could not be established.
    #[error("SSH tunnel failed to start: {reason}")]
    TunnelStartFailed { reason: String },

    /// `enable` was attempted without valid settings or a stored secret.
    #[error("Missing credentials or SSH settings: {0}")]
    CredentialsOrSettingsMissing(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON (de)serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// True for failures that leave no side effects behind (validation, missing input).
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidWhitelist
                | Self::InvalidTunnelSettings(_)
                | Self::MissingSecret
                | Self::CredentialsOrSettingsMissing(_)
        )
    }
}
