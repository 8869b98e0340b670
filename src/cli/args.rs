//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// SSH dynamic-forward SOCKS proxy with whitelist routing for macOS
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Override config directory (default: platform config dir, honors `XDG_CONFIG_HOME` and sudo)
    #[arg(
        short = 'C',
        long,
        value_name = "DIR",
        env = "PROXYTRAY_CONFIG_DIR",
        global = true
    )]
    pub config_dir: Option<PathBuf>,

    /// Log at debug level and echo log lines to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute (default: run)
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Start a foreground session: bring the proxy up and accept commands on stdin
    Run {
        /// Start with the proxy off
        #[arg(long)]
        no_enable: bool,
    },
    /// Stop any tunnel listener and clear system proxy settings
    Cleanup,
    /// Show detected proxy mode, routing mode and listener state
    Status,
    /// Set or toggle routing of all traffic through the tunnel
    RouteAll {
        #[arg(value_enum, default_value_t = RouteAllMode::Toggle)]
        mode: RouteAllMode,
    },
    /// Save the SSH endpoint
    SetSsh {
        /// Tunnel host name or address
        #[arg(long)]
        host: String,
        /// SSH user name
        #[arg(long)]
        user: String,
        /// SSH port
        #[arg(long, default_value_t = 22)]
        port: u32,
    },
    /// Read the SSH password from stdin and store it encrypted
    SetPassword,
    /// Print the whitelist location, optionally validating it
    Whitelist {
        /// Parse the whitelist and list the networks it yields
        #[arg(long)]
        check: bool,
    },
    /// Show config directory, file locations and runtime info
    Info,
}

impl Default for Commands {
    fn default() -> Self {
        Self::Run { no_enable: false }
    }
}

/// Target of `route-all`.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteAllMode {
    On,
    Off,
    Toggle,
}
