//! Application configuration management.
//!
//! Handles config directory resolution (CLI flag > `SUDO_USER`-aware home > XDG > default)
//! and loading `config.toml`.
//!
//! The resolved config directory is stored in a process-wide global via [`set_config_dir`]
//! at startup, so that the file-backed collaborators (settings, vault, whitelist, logs)
//! agree on one location without threading the path through every call.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::constants;

/// Process-wide resolved config directory, set once at startup.
static CONFIG_DIR: OnceLock<PathBuf> = OnceLock::new();

/// Stores the resolved config directory for the lifetime of the process.
///
/// Subsequent calls are ignored (first write wins).
pub fn set_config_dir(dir: PathBuf) {
    let _ = CONFIG_DIR.set(dir);
}

/// Returns the config directory set at startup, or falls back to default resolution.
pub fn get_config_dir() -> std::io::Result<PathBuf> {
    if let Some(dir) = CONFIG_DIR.get() {
        Ok(dir.clone())
    } else {
        resolve_config_dir(None)
    }
}

/// User-configurable application settings.
///
/// Users can override any subset via `config.toml` in the config directory;
/// missing fields use defaults. The local tunnel endpoint and the tunnel
/// grace period are deliberately absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    /// Minimum log level (`"debug"`, `"info"`, `"warning"`, `"error"`).
    pub log_level: String,
    /// Maximum number of log entries kept in memory.
    pub max_log_entries: usize,
    /// Echo every log line to stderr.
    pub log_to_stderr: bool,
    /// Maximum log file size in bytes before rotation.
    pub log_rotation_size: u64,
    /// Number of days to retain old log files.
    pub log_retention_days: u64,
    /// SSH client used for the dynamic forward.
    pub ssh_binary: String,
    /// OS network-service configuration tool.
    pub networksetup_binary: String,
    /// `ServerAliveInterval` in seconds.
    pub keepalive_interval: u32,
    /// `ServerAliveCountMax`.
    pub keepalive_count_max: u32,
    /// Verify the tunnel host key against the user's `known_hosts`.
    pub strict_host_key_checking: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: constants::DEFAULT_LOG_LEVEL.to_string(),
            max_log_entries: constants::DEFAULT_MAX_LOG_ENTRIES,
            log_to_stderr: false,
            log_rotation_size: constants::DEFAULT_LOG_ROTATION_SIZE,
            log_retention_days: constants::DEFAULT_LOG_RETENTION_DAYS,
            ssh_binary: constants::DEFAULT_SSH_BINARY.to_string(),
            networksetup_binary: constants::DEFAULT_NETWORKSETUP_BINARY.to_string(),
            keepalive_interval: constants::DEFAULT_KEEPALIVE_INTERVAL,
            keepalive_count_max: constants::DEFAULT_KEEPALIVE_COUNT_MAX,
            strict_host_key_checking: false,
        }
    }
}

/// Resolves the config directory path.
///
/// Precedence: CLI flag / `PROXYTRAY_CONFIG_DIR` > `SUDO_USER`-aware home > `XDG_CONFIG_HOME` > default.
///
/// # Errors
///
/// Returns an error if the config directory cannot be determined or created.
pub fn resolve_config_dir(cli_override: Option<&PathBuf>) -> std::io::Result<PathBuf> {
    let path = if let Some(dir) = cli_override {
        if dir.is_relative() {
            std::env::current_dir()?.join(dir)
        } else {
            dir.clone()
        }
    } else {
        default_config_dir()?
    };

    if !path.exists() {
        std::fs::create_dir_all(&path)?;
        fix_ownership(&path);
    }

    std::fs::canonicalize(&path)
}

/// Computes the default config directory (no CLI override).
fn default_config_dir() -> std::io::Result<PathBuf> {
    let home = real_user_home().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::NotFound, "Home directory not found")
    })?;

    #[cfg(target_os = "linux")]
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        let xdg_path = PathBuf::from(xdg);
        if xdg_path.is_absolute() {
            return Ok(xdg_path.join(constants::APP_NAME));
        }
    }

    Ok(home.join(".config").join(constants::APP_NAME))
}

/// Resolves the real user's home directory, accounting for sudo.
///
/// `networksetup` mutations are often run under `sudo`; the files must still
/// land in the invoking user's home.
fn real_user_home() -> Option<PathBuf> {
    if crate::utils::is_root() {
        if let Ok(sudo_user) = std::env::var("SUDO_USER") {
            return home_dir_for_user(&sudo_user);
        }
    }
    dirs::home_dir()
}

/// Looks up a user's home directory from `/etc/passwd` via `getpwnam`.
#[cfg(unix)]
#[allow(unsafe_code)]
fn home_dir_for_user(username: &str) -> Option<PathBuf> {
    use std::ffi::{CStr, CString};
    let c_name = CString::new(username).ok()?;
    // SAFETY: getpwnam returns a pointer to a static struct. We copy the
    // home directory string immediately so the pointer is not held.
    unsafe {
        let pw = libc::getpwnam(c_name.as_ptr());
        if pw.is_null() {
            return None;
        }
        let home = CStr::from_ptr((*pw).pw_dir);
        home.to_str().ok().map(PathBuf::from)
    }
}

#[cfg(not(unix))]
fn home_dir_for_user(_username: &str) -> Option<PathBuf> {
    None
}

/// Loads `AppConfig` from `config.toml` in the given directory.
///
/// Returns defaults if the file doesn't exist.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_config(config_dir: &Path) -> Result<AppConfig, String> {
    let config_path = config_dir.join(constants::CONFIG_FILE_NAME);

    if !config_path.exists() {
        return Ok(AppConfig::default());
    }

    let content = std::fs::read_to_string(&config_path)
        .map_err(|e| format!("Failed to read {}: {e}", config_path.display()))?;

    toml::from_str(&content)
        .map_err(|e| format!("Invalid config at {}: {e}", config_path.display()))
}

/// Hands a path created under `sudo` back to the invoking user.
///
/// No-op when not running as root.
pub fn fix_ownership(path: &Path) {
    if !crate::utils::is_root() {
        return;
    }
    if let Err(e) = chown_to_real_user(path) {
        crate::log_warning!(
            "CONFIG",
            "Could not set ownership of {} to your user: {e}",
            path.display()
        );
    }
}

/// Chowns a single path to `SUDO_UID`:`SUDO_GID`.
#[cfg(unix)]
#[allow(unsafe_code)]
fn chown_to_real_user(path: &Path) -> std::io::Result<()> {
    use std::os::unix::ffi::OsStrExt;

    let uid: u32 = std::env::var("SUDO_UID")
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, "SUDO_UID not set"))?;
    let gid: u32 = std::env::var("SUDO_GID")
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, "SUDO_GID not set"))?;

    let c_path = std::ffi::CString::new(path.as_os_str().as_bytes())
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

    // SAFETY: chown only changes file ownership; the CString outlives the call.
    let ret = unsafe { libc::chown(c_path.as_ptr(), uid, gid) };
    if ret != 0 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

#[cfg(not(unix))]
fn chown_to_real_user(_path: &Path) -> std::io::Result<()> {
    Ok(())
}
