//! Proxy orchestration state machine.
//!
//! The controller is the only writer of [`ProxyState`]. Published state moves
//! between inactive and active; in-flight activation and deactivation are
//! never published. Any failure after the tunnel came up is rolled back with
//! [`ProxyController::cleanup`] before it is returned, so an operation never
//! ends with a tunnel but no system proxy settings, or the reverse.

use std::sync::{mpsc, Arc};

use super::error::{Error, Result};
use super::network::NetworkConfigurator;
use super::settings::{JsonSettingsStore, SettingsStore, TunnelSettings};
use super::tunnel::{TunnelManager, TunnelOptions};
use super::vault::{CredentialVault, FileVault, KeyStore};
use super::whitelist::{self, NetworkEntry};
use super::Layout;
use crate::config::AppConfig;
use crate::logger::{self, LogLevel};
use crate::platform::{CommandRunner, ProcessLauncher, SystemLauncher, SystemRunner};
use crate::state::{DetectedProxyMode, ProxyState, StateHolder, StateListener, StatusReport};

/// Coordinates the tunnel, the system proxy settings and the PAC file.
pub struct ProxyController {
    vault: Box<dyn CredentialVault>,
    settings: Box<dyn SettingsStore>,
    network: NetworkConfigurator,
    tunnel: TunnelManager,
    layout: Layout,
    state: StateHolder,
}

impl ProxyController {
    pub fn new(
        vault: Box<dyn CredentialVault>,
        settings: Box<dyn SettingsStore>,
        network: NetworkConfigurator,
        tunnel: TunnelManager,
        layout: Layout,
    ) -> Self {
        Self {
            vault,
            settings,
            network,
            tunnel,
            layout,
            state: StateHolder::default(),
        }
    }

    /// Controller wired to the real host tools and the files under `layout`.
    pub fn system(layout: Layout, config: &AppConfig) -> Self {
        let runner: Arc<dyn CommandRunner> = Arc::new(SystemRunner);
        let launcher: Arc<dyn ProcessLauncher> = Arc::new(SystemLauncher);

        let network = NetworkConfigurator::new(
            Arc::clone(&runner),
            config.networksetup_binary.clone(),
            layout.pac.clone(),
        );
        let tunnel = TunnelManager::new(
            launcher,
            Arc::clone(&runner),
            TunnelOptions::new(config, layout.run_dir.clone()),
        );
        let vault = FileVault::new(
            key_store(&runner, &layout),
            layout.vault_secret.clone(),
        );
        let settings =
            JsonSettingsStore::new(layout.ssh_settings.clone(), layout.preferences.clone());

        Self::new(
            Box::new(vault),
            Box::new(settings),
            network,
            tunnel,
            layout,
        )
    }

    pub fn subscribe(&mut self, listener: Box<dyn StateListener>) {
        self.state.subscribe(listener);
    }

    #[must_use]
    pub const fn state(&self) -> ProxyState {
        self.state.current()
    }

    /// One-time startup: seed the whitelist, load the routing mode, publish
    /// the initial state and clear settings left over from a crashed run.
    pub fn bootstrap(&mut self) {
        if let Err(e) = whitelist::ensure_whitelist(&self.layout.whitelist) {
            logger::log(
                LogLevel::Warning,
                "CONTROL",
                format!("Could not seed whitelist: {e}"),
            );
        }

        self.load_preferences();

        match self.network.detect_state() {
            Ok(DetectedProxyMode::None) => {}
            Ok(mode) if !self.tunnel.is_running() => {
                logger::log(
                    LogLevel::Warning,
                    "CONTROL",
                    format!("Found leftover {mode} proxy settings from a previous run, cleaning up"),
                );
                self.cleanup();
            }
            Ok(_) => {}
            Err(e) => logger::log(
                LogLevel::Debug,
                "CONTROL",
                format!("Startup proxy detection failed: {e}"),
            ),
        }
    }

    /// Publishes the persisted routing mode with the proxy inactive.
    ///
    /// Unlike [`ProxyController::bootstrap`] this leaves live system settings
    /// alone, for one-shot commands running beside a session.
    pub fn load_preferences(&mut self) {
        self.state.publish(ProxyState {
            proxy_active: false,
            route_all: self.settings.load_route_all(),
        });
    }

    /// Starts the tunnel and applies system proxy settings for the current
    /// routing mode. No-op while active.
    ///
    /// Blocks the calling thread until the tunnel reports its outcome; use
    /// [`crate::core::service`] to keep a front end responsive.
    ///
    /// # Errors
    ///
    /// - [`Error::CredentialsOrSettingsMissing`] before anything is touched
    /// - [`Error::InvalidWhitelist`] (selective routing) before anything is touched
    /// - [`Error::TunnelStartFailed`] with no system settings applied
    /// - any system configuration error, after a full cleanup
    pub fn enable(&mut self) -> Result<()> {
        if self.state.current().proxy_active {
            logger::log(LogLevel::Debug, "CONTROL", "Proxy already active");
            return Ok(());
        }

        let settings = self
            .settings
            .load_tunnel_settings()
            .map_err(|e| missing(&e))?;
        let secret = self.vault.read().map_err(|e| missing(&e))?;

        let entries = if self.state.current().route_all {
            None
        } else {
            Some(self.load_whitelist()?)
        };

        logger::log(
            LogLevel::Info,
            "CONTROL",
            format!("Enabling proxy via {settings}"),
        );
        self.start_tunnel(&settings, &secret)?;

        if let Err(e) = self.apply_proxy(entries.as_deref()) {
            logger::log(
                LogLevel::Error,
                "CONTROL",
                format!("Applying system proxy failed, rolling back: {e}"),
            );
            self.cleanup();
            return Err(e);
        }

        self.state.set_active(true);
        logger::log(
            LogLevel::Info,
            "CONTROL",
            format!("Proxy active ({})", mode_name(self.state.current().route_all)),
        );
        Ok(())
    }

    /// Same as [`ProxyController::cleanup`].
    pub fn disable(&mut self) {
        self.cleanup();
    }

    /// Flips and persists the routing mode, re-applying it if active.
    ///
    /// # Errors
    ///
    /// Returns an error if the mode cannot be persisted (nothing changes), or
    /// if re-applying fails (after a full cleanup).
    pub fn toggle_route_all(&mut self) -> Result<()> {
        let route_all = !self.state.current().route_all;
        self.set_route_all(route_all)
    }

    /// Persists the routing mode and, while active, re-applies it to the
    /// system. The tunnel keeps running; only the routing rule changes.
    ///
    /// # Errors
    ///
    /// See [`ProxyController::toggle_route_all`].
    pub fn set_route_all(&mut self, route_all: bool) -> Result<()> {
        self.settings.save_route_all(route_all)?;
        self.state.set_route_all(route_all);
        logger::log(
            LogLevel::Info,
            "CONTROL",
            format!("Routing mode: {}", mode_name(route_all)),
        );

        if !self.state.current().proxy_active {
            return Ok(());
        }

        if let Err(e) = self.apply_routing(route_all) {
            logger::log(
                LogLevel::Error,
                "CONTROL",
                format!("Re-applying routing mode failed, cleaning up: {e}"),
            );
            self.cleanup();
            return Err(e);
        }
        Ok(())
    }

    /// Switches the system settings of a session running in another process
    /// to the current routing mode.
    ///
    /// Acts only when detection attributes the live settings to us and a
    /// listener holds the local SOCKS port. Returns whether anything was
    /// applied. Nothing is torn down on failure: the tunnel belongs to the
    /// other process.
    ///
    /// # Errors
    ///
    /// Returns the whitelist or system configuration error from applying.
    pub fn retarget_live_session(&self) -> Result<bool> {
        if self.state.current().proxy_active {
            return Ok(false);
        }
        let detected = match self.network.detect_state() {
            Ok(mode) => mode,
            Err(e) => {
                logger::log(
                    LogLevel::Debug,
                    "CONTROL",
                    format!("Proxy detection failed: {e}"),
                );
                return Ok(false);
            }
        };
        if detected == DetectedProxyMode::None || self.tunnel.port_listeners().is_empty() {
            return Ok(false);
        }

        let route_all = self.state.current().route_all;
        logger::log(
            LogLevel::Info,
            "CONTROL",
            format!(
                "Switching live {detected} session to {}",
                mode_name(route_all)
            ),
        );
        self.apply_routing(route_all)?;
        Ok(true)
    }

    /// Stops the tunnel, clears system proxy settings and publishes inactive.
    ///
    /// Never fails and may be called from any state, any number of times.
    pub fn cleanup(&mut self) {
        self.tunnel.stop();
        self.network.disable_proxy();
        self.state.set_active(false);
        logger::log(LogLevel::Info, "CONTROL", "Proxy inactive");
    }

    /// Cleans up if the tunnel died while the proxy was active.
    ///
    /// Returns `true` if a cleanup was performed.
    pub fn reconcile(&mut self) -> bool {
        if !self.state.current().proxy_active || self.tunnel.is_running() {
            return false;
        }
        logger::log(
            LogLevel::Warning,
            "CONTROL",
            "SSH tunnel is no longer running, clearing proxy settings",
        );
        self.cleanup();
        true
    }

    /// Published state plus live system inspection.
    #[must_use]
    pub fn status(&self) -> StatusReport {
        StatusReport {
            state: self.state.current(),
            detected: self.network.detect_state().map_err(|e| e.to_string()),
            tunnel: self.tunnel.phase(),
            tunnel_pid: self.tunnel.pid(),
            port_listeners: self.tunnel.port_listeners(),
        }
    }

    /// Validates and persists tunnel settings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTunnelSettings`] without persisting anything.
    pub fn save_tunnel_settings(&self, settings: &TunnelSettings) -> Result<TunnelSettings> {
        self.settings.save_tunnel_settings(settings)
    }

    /// Seals and stores the SSH password.
    ///
    /// # Errors
    ///
    /// Returns [`Error::VaultWrite`] on failure.
    pub fn store_secret(&self, secret: &str) -> Result<()> {
        self.vault.store(secret)
    }

    fn load_whitelist(&self) -> Result<Vec<NetworkEntry>> {
        whitelist::ensure_whitelist(&self.layout.whitelist)?;
        whitelist::load_whitelist(&self.layout.whitelist)
    }

    /// Starts the tunnel and waits for its single outcome report.
    fn start_tunnel(&self, settings: &TunnelSettings, secret: &str) -> Result<()> {
        let (tx, rx) = mpsc::channel();
        self.tunnel.start(settings, secret, move |result| {
            let _ = tx.send(result);
        });

        let outcome = rx.recv().unwrap_or_else(|_| {
            Err(Error::TunnelStartFailed {
                reason: "tunnel watcher exited without reporting".to_string(),
            })
        });
        if let Err(e) = &outcome {
            logger::log(LogLevel::Error, "CONTROL", format!("{e}"));
        }
        outcome
    }

    fn apply_routing(&self, route_all: bool) -> Result<()> {
        if route_all {
            self.apply_proxy(None)
        } else {
            let entries = self.load_whitelist()?;
            self.apply_proxy(Some(&entries))
        }
    }

    /// Installs system proxy settings: the PAC file for `Some(entries)`,
    /// route-all SOCKS for `None`.
    fn apply_proxy(&self, entries: Option<&[NetworkEntry]>) -> Result<()> {
        match entries {
            None => self.network.enable_route_all_proxy(),
            Some(entries) => {
                let pac = self.network.pac_path();
                whitelist::write_pac(pac, entries)?;
                self.network.enable_pac_proxy(&whitelist::pac_url(pac))
            }
        }
    }
}

/// Keychain-backed vault key on macOS, an owner-only file elsewhere.
#[cfg(target_os = "macos")]
pub fn key_store(runner: &Arc<dyn CommandRunner>, _layout: &Layout) -> Box<dyn KeyStore> {
    Box::new(super::vault::KeychainKeyStore::new(
        Arc::clone(runner),
        crate::constants::SECURITY_BINARY,
    ))
}

/// Keychain-backed vault key on macOS, an owner-only file elsewhere.
#[cfg(not(target_os = "macos"))]
pub fn key_store(_runner: &Arc<dyn CommandRunner>, layout: &Layout) -> Box<dyn KeyStore> {
    Box::new(super::vault::FileKeyStore::new(layout.vault_key.clone()))
}

fn missing(cause: &Error) -> Error {
    logger::log(
        LogLevel::Warning,
        "CONTROL",
        format!("Cannot enable proxy: {cause}"),
    );
    Error::CredentialsOrSettingsMissing(cause.to_string())
}

const fn mode_name(route_all: bool) -> &'static str {
    if route_all {
        "route all"
    } else {
        "whitelist"
    }
}
