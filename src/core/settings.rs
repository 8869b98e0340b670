//! Tunnel settings and the persisted routing preference.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::error::{Error, Result};
use crate::logger::{self, LogLevel};

/// Where and as whom the SSH tunnel connects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TunnelSettings {
    pub host: String,
    pub username: String,
    /// Kept wider than `u16` so out-of-range input is rejected by
    /// [`TunnelSettings::validate`] instead of failing to parse.
    pub port: u32,
}

impl TunnelSettings {
    /// Builds sanitized, validated settings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTunnelSettings`] if validation fails.
    pub fn new(host: &str, username: &str, port: u32) -> Result<Self> {
        let settings = Self {
            host: host.to_string(),
            username: username.to_string(),
            port,
        }
        .sanitized();
        settings.validate()?;
        Ok(settings)
    }

    /// Copy with surrounding whitespace removed from host and username.
    #[must_use]
    pub fn sanitized(&self) -> Self {
        Self {
            host: self.host.trim().to_string(),
            username: self.username.trim().to_string(),
            port: self.port,
        }
    }

    /// Checks host, username and port.
    ///
    /// Values that ssh would read as an option (leading `-`) or that contain
    /// whitespace are rejected as well.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTunnelSettings`] describing the first problem.
    pub fn validate(&self) -> Result<()> {
        check_field("host", &self.host)?;
        check_field("username", &self.username)?;
        if self.username.contains('@') {
            return Err(Error::InvalidTunnelSettings(
                "username must not contain '@'".to_string(),
            ));
        }
        if !(1..=65535).contains(&self.port) {
            return Err(Error::InvalidTunnelSettings(format!(
                "port {} is outside 1-65535",
                self.port
            )));
        }
        Ok(())
    }
}

fn check_field(name: &str, value: &str) -> Result<()> {
    let value = value.trim();
    if value.is_empty() {
        return Err(Error::InvalidTunnelSettings(format!("{name} is empty")));
    }
    if value.starts_with('-') {
        return Err(Error::InvalidTunnelSettings(format!(
            "{name} must not start with '-'"
        )));
    }
    if value.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(Error::InvalidTunnelSettings(format!(
            "{name} must not contain whitespace"
        )));
    }
    Ok(())
}

impl fmt::Display for TunnelSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.username, self.host, self.port)
    }
}

/// Persistent key-value settings used by the controller.
pub trait SettingsStore: Send {
    /// Loads and validates the tunnel settings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTunnelSettings`] if nothing valid is stored.
    fn load_tunnel_settings(&self) -> Result<TunnelSettings>;

    /// Sanitizes, validates and persists the tunnel settings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTunnelSettings`] without writing anything if
    /// validation fails, or an I/O error if persisting fails.
    fn save_tunnel_settings(&self, settings: &TunnelSettings) -> Result<TunnelSettings>;

    /// Persisted routing mode; `false` when unset or unreadable.
    fn load_route_all(&self) -> bool;

    /// Persists the routing mode.
    ///
    /// # Errors
    ///
    /// Returns an error if the preference cannot be written.
    fn save_route_all(&self, route_all: bool) -> Result<()>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct Preferences {
    route_all: bool,
}

/// JSON files in the config directory.
#[derive(Debug, Clone)]
pub struct JsonSettingsStore {
    ssh_path: PathBuf,
    preferences_path: PathBuf,
}

impl JsonSettingsStore {
    pub fn new(ssh_path: PathBuf, preferences_path: PathBuf) -> Self {
        Self {
            ssh_path,
            preferences_path,
        }
    }

    fn read_preferences(&self) -> Option<Preferences> {
        let raw = std::fs::read_to_string(&self.preferences_path).ok()?;
        match serde_json::from_str(&raw) {
            Ok(prefs) => Some(prefs),
            Err(e) => {
                logger::log(
                    LogLevel::Warning,
                    "SETTINGS",
                    format!("Ignoring malformed {}: {e}", display(&self.preferences_path)),
                );
                None
            }
        }
    }
}

impl SettingsStore for JsonSettingsStore {
    fn load_tunnel_settings(&self) -> Result<TunnelSettings> {
        let raw = match std::fs::read_to_string(&self.ssh_path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::InvalidTunnelSettings(
                    "no SSH settings saved".to_string(),
                ));
            }
            Err(e) => return Err(e.into()),
        };

        let stored: TunnelSettings = serde_json::from_str(&raw).map_err(|e| {
            Error::InvalidTunnelSettings(format!("{}: {e}", display(&self.ssh_path)))
        })?;
        let settings = stored.sanitized();
        settings.validate()?;
        Ok(settings)
    }

    fn save_tunnel_settings(&self, settings: &TunnelSettings) -> Result<TunnelSettings> {
        let settings = settings.sanitized();
        settings.validate()?;

        let json = serde_json::to_string_pretty(&settings)?;
        crate::utils::write_user_file(&self.ssh_path, json)?;
        logger::log(
            LogLevel::Info,
            "SETTINGS",
            format!("Saved SSH settings: {settings}"),
        );
        Ok(settings)
    }

    fn load_route_all(&self) -> bool {
        self.read_preferences().is_some_and(|p| p.route_all)
    }

    fn save_route_all(&self, route_all: bool) -> Result<()> {
        let mut prefs = self.read_preferences().unwrap_or_default();
        prefs.route_all = route_all;
        let json = serde_json::to_string_pretty(&prefs)?;
        crate::utils::write_user_file(&self.preferences_path, json)?;
        logger::log(
            LogLevel::Debug,
            "SETTINGS",
            format!("Saved route_all = {route_all}"),
        );
        Ok(())
    }
}

fn display(path: &Path) -> String {
    path.display().to_string()
}
