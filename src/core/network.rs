//! System proxy configuration through `networksetup`.
//!
//! Every operation applies uniformly to all *usable* network services: those
//! listed as enabled that also answer a `-getinfo` query.

use std::path::PathBuf;
use std::sync::Arc;

use base64::{engine::general_purpose, Engine as _};

use super::error::{Error, Result};
use super::whitelist;
use crate::constants;
use crate::logger::{self, LogLevel};
use crate::platform::CommandRunner;
use crate::state::DetectedProxyMode;

/// Auto-proxy URL form of a PAC script embedded in the setting itself.
const INLINE_PAC_PREFIX: &str = "data:application/x-javascript-config;base64,";

/// Applies and inspects per-service proxy settings.
pub struct NetworkConfigurator {
    runner: Arc<dyn CommandRunner>,
    binary: String,
    pac_path: PathBuf,
}

impl NetworkConfigurator {
    /// `pac_path` is the location this application installs its PAC file at;
    /// detection only recognizes auto-proxy URLs pointing there.
    pub fn new(runner: Arc<dyn CommandRunner>, binary: impl Into<String>, pac_path: PathBuf) -> Self {
        Self {
            runner,
            binary: binary.into(),
            pac_path,
        }
    }

    #[must_use]
    pub fn pac_path(&self) -> &std::path::Path {
        &self.pac_path
    }

    /// Runs one `networksetup` invocation, failing on a non-zero exit.
    fn run(&self, args: &[&str]) -> Result<String> {
        let out = self.runner.run(&self.binary, args)?;
        if !out.success() {
            logger::log(
                LogLevel::Debug,
                "NETWORK",
                format!(
                    "networksetup {} exited {}: {}",
                    args.join(" "),
                    out.exit_code,
                    out.output.trim()
                ),
            );
            return Err(Error::ExternalCommandFailed {
                exit_code: out.exit_code,
                output: out.output.trim().to_string(),
            });
        }
        Ok(out.output)
    }

    /// Enumerates enabled network services that resolve to interface info.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoUsableNetworkServices`] if none qualify, or
    /// [`Error::ExternalCommandFailed`] if the listing itself fails.
    pub fn list_services(&self) -> Result<Vec<String>> {
        let listing = self.run(&["-listallnetworkservices"])?;

        let services: Vec<String> = listing
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .filter(|line| !line.starts_with('*') && !line.contains("asterisk"))
            .filter(|name| {
                let usable = self.run(&["-getinfo", name]).is_ok();
                if !usable {
                    logger::log(
                        LogLevel::Debug,
                        "NETWORK",
                        format!("Skipping network service without interface info: {name}"),
                    );
                }
                usable
            })
            .map(str::to_string)
            .collect();

        if services.is_empty() {
            logger::log(LogLevel::Error, "NETWORK", "No usable network services found");
            return Err(Error::NoUsableNetworkServices);
        }
        Ok(services)
    }

    /// Points every service at the PAC file at `pac_location`.
    ///
    /// SOCKS is turned off before auto-proxy is turned on.
    ///
    /// # Errors
    ///
    /// Fails on the first command that exits non-zero.
    pub fn enable_pac_proxy(&self, pac_location: &str) -> Result<()> {
        let services = self.list_services()?;
        for service in &services {
            self.run(&["-setsocksfirewallproxystate", service, "off"])?;
            self.run(&["-setautoproxyurl", service, pac_location])?;
            self.run(&["-setautoproxystate", service, "on"])?;
        }
        logger::log(
            LogLevel::Info,
            "NETWORK",
            format!(
                "PAC proxy enabled on {} service(s): {pac_location}",
                services.len()
            ),
        );
        Ok(())
    }

    /// Sends all traffic on every service through the local SOCKS endpoint.
    ///
    /// # Errors
    ///
    /// Fails on the first command that exits non-zero.
    pub fn enable_route_all_proxy(&self) -> Result<()> {
        let services = self.list_services()?;
        let port = constants::SOCKS_PORT.to_string();
        for service in &services {
            self.run(&["-setautoproxystate", service, "off"])?;
            self.run(&[
                "-setsocksfirewallproxy",
                service,
                constants::SOCKS_HOST,
                &port,
            ])?;
            self.run(&["-setsocksfirewallproxystate", service, "on"])?;
        }
        logger::log(
            LogLevel::Info,
            "NETWORK",
            format!(
                "SOCKS proxy {}:{} enabled on {} service(s)",
                constants::SOCKS_HOST,
                constants::SOCKS_PORT,
                services.len()
            ),
        );
        Ok(())
    }

    /// Turns auto-proxy and SOCKS off everywhere. Never fails.
    pub fn disable_proxy(&self) {
        let services = match self.list_services() {
            Ok(services) => services,
            Err(e) => {
                logger::log(
                    LogLevel::Warning,
                    "NETWORK",
                    format!("Cannot disable proxy settings: {e}"),
                );
                return;
            }
        };

        for service in &services {
            for flag in ["-setautoproxystate", "-setsocksfirewallproxystate"] {
                if let Err(e) = self.run(&[flag, service, "off"]) {
                    logger::log(
                        LogLevel::Warning,
                        "NETWORK",
                        format!("{flag} off failed for {service}: {e}"),
                    );
                }
            }
        }
        logger::log(LogLevel::Info, "NETWORK", "System proxy settings cleared");
    }

    /// Inspects live settings. SOCKS on any service wins over PAC.
    ///
    /// # Errors
    ///
    /// Fails if services cannot be listed or a query exits non-zero.
    pub fn detect_state(&self) -> Result<DetectedProxyMode> {
        let mut pac_active = false;
        for service in self.list_services()? {
            let socks = parse_fields(&self.run(&["-getsocksfirewallproxy", &service])?);
            if Self::socks_matches(&socks) {
                return Ok(DetectedProxyMode::Socks);
            }

            let auto = parse_fields(&self.run(&["-getautoproxyurl", &service])?);
            pac_active |= self.pac_matches(&auto);
        }

        Ok(if pac_active {
            DetectedProxyMode::Pac
        } else {
            DetectedProxyMode::None
        })
    }

    fn socks_matches(fields: &[(String, String)]) -> bool {
        let port = constants::SOCKS_PORT.to_string();
        is_enabled(fields)
            && field(fields, "Server") == Some(constants::SOCKS_HOST)
            && field(fields, "Port") == Some(port.as_str())
    }

    /// Our PAC as the bare path or a `file://` URL, or an inline `data:` URL
    /// carrying a script we generated.
    fn pac_matches(&self, fields: &[(String, String)]) -> bool {
        let path = whitelist::pac_url(&self.pac_path);
        is_enabled(fields)
            && field(fields, "URL").is_some_and(|url| {
                url == path
                    || url.strip_prefix("file://") == Some(path.as_str())
                    || is_inline_pac(url)
            })
    }
}

fn is_inline_pac(url: &str) -> bool {
    url.strip_prefix(INLINE_PAC_PREFIX)
        .and_then(|data| general_purpose::STANDARD.decode(data.trim()).ok())
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .is_some_and(|script| whitelist::is_generated_pac(&script))
}

/// Splits `Key: value` lines.
fn parse_fields(output: &str) -> Vec<(String, String)> {
    output
        .lines()
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect()
}

fn field<'a>(fields: &'a [(String, String)], key: &str) -> Option<&'a str> {
    fields
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

fn is_enabled(fields: &[(String, String)]) -> bool {
    field(fields, "Enabled") == Some("Yes")
}
