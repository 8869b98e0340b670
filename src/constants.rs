//! Application-wide constants and configuration values.
//!
//! This module defines the static values shared across proxytray: the fixed
//! local tunnel endpoint, timing, external tool locations, per-user file
//! names and CLI messages.

// === Application Metadata ===

/// Application name (from Cargo.toml).
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
/// Current application version (from Cargo.toml).
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

// === Local Tunnel Endpoint ===
// Bound by the tunnel manager, pointed at by the network configurator and
// matched by the detector. Not user-configurable.

/// Loopback address the SOCKS listener binds to.
pub const SOCKS_HOST: &str = "127.0.0.1";
/// Local port of the SSH dynamic forward.
pub const SOCKS_PORT: u16 = 1080;

// === Timing ===

/// How long the SSH client must stay alive before the forward counts as established.
pub const TUNNEL_GRACE_PERIOD_MS: u64 = 1000;
/// Poll interval of the tunnel watcher while inside the grace period.
pub const TUNNEL_POLL_MS: u64 = 50;
/// Poll interval of the tunnel watcher after the result has been reported.
pub const TUNNEL_SUPERVISE_POLL_MS: u64 = 500;
/// Tick rate of the foreground session (reconcile interval).
pub const DEFAULT_TICK_RATE_MS: u64 = 1000;

// === External Tools ===

/// Default SSH client.
pub const DEFAULT_SSH_BINARY: &str = "/usr/bin/ssh";
/// Default macOS network-service configuration tool.
pub const DEFAULT_NETWORKSETUP_BINARY: &str = "/usr/sbin/networksetup";
/// Tool used to find processes listening on the local port.
pub const LSOF_BINARY: &str = "/usr/sbin/lsof";
/// Tool used to force-terminate orphaned listeners.
pub const KILL_BINARY: &str = "/bin/kill";
/// Keychain command-line tool holding the vault key on macOS.
pub const SECURITY_BINARY: &str = "/usr/bin/security";
/// Keychain service name of the vault key.
pub const KEYCHAIN_SERVICE: &str = "proxytray";
/// Keychain account name of the vault key.
pub const KEYCHAIN_ACCOUNT: &str = "vault-key";

/// Default `ServerAliveInterval` passed to ssh.
pub const DEFAULT_KEEPALIVE_INTERVAL: u32 = 30;
/// Default `ServerAliveCountMax` passed to ssh.
pub const DEFAULT_KEEPALIVE_COUNT_MAX: u32 = 3;

// === Logging Defaults ===

/// Default number of in-memory log entries.
pub const DEFAULT_MAX_LOG_ENTRIES: usize = 1000;
/// Default minimum log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";
/// Default log file size before rotation (5 MB).
pub const DEFAULT_LOG_ROTATION_SIZE: u64 = 5 * 1024 * 1024;
/// Default retention of old log files in days.
pub const DEFAULT_LOG_RETENTION_DAYS: u64 = 7;

// === Per-user Files ===

/// Name of the config file inside the config dir.
pub const CONFIG_FILE_NAME: &str = "config.toml";
/// User-edited whitelist of IPv4 networks.
pub const WHITELIST_FILE_NAME: &str = "whitelist.txt";
/// Generated proxy auto-config script.
pub const PAC_FILE_NAME: &str = "proxy.pac";
/// Tunnel settings (host, username, port).
pub const SSH_SETTINGS_FILE_NAME: &str = "ssh.json";
/// Persisted preferences (routing mode).
pub const PREFERENCES_FILE_NAME: &str = "preferences.json";
/// Vault encryption key where no Keychain is available.
pub const VAULT_KEY_FILE_NAME: &str = "vault.key";
/// Sealed SSH password.
pub const VAULT_SECRET_FILE_NAME: &str = "password.enc";
/// Name of the logs subdirectory.
pub const LOGS_DIR_NAME: &str = "logs";
/// Runtime directory holding the ephemeral credential helper.
pub const RUN_DIR_NAME: &str = "run";
/// File name prefix of the credential helper script.
pub const ASKPASS_PREFIX: &str = "askpass";

/// Seed content written when no whitelist exists yet.
pub const DEFAULT_WHITELIST: &str = "# one IPv4 or CIDR per line\n\
# example:\n\
10.0.0.0/8\n\
192.168.0.0/16\n\
127.0.0.1/32\n";

// === Messages ===

/// Shown when `enable` is attempted before settings/password were provided.
pub const MSG_SETUP_HINT: &str =
    "Use 'proxytray set-ssh' and 'proxytray set-password' first.";
/// Emitted once per tunnel start while host keys are not verified.
pub const MSG_HOST_KEY_WARNING: &str = "Host key verification is disabled for the tunnel endpoint; \
set strict_host_key_checking = true in config.toml to verify against known_hosts";
/// Printed at the start of a foreground session.
pub const MSG_SESSION_HELP: &str =
    "Commands: enable, disable, route-all [on|off], status, cleanup, logs, help, quit";
