//! # proxytray
//!
//! Routes selected IPv4 networks, or all traffic, through an SSH dynamic
//! forward by steering the macOS system proxy at a local SOCKS endpoint.
//!
//! ## Modules
//! - [`cli`]: Argument parsing, one-shot commands and the foreground session.
//! - [`config`]: Config directory resolution and `config.toml`.
//! - [`core`]: Controller, tunnel manager, network configurator, whitelist and vault.
//! - [`state`]: Proxy state, tunnel phase and status reports.
//! - [`platform`]: Process spawning and command execution seams.

mod cli;
mod config;
mod constants;
mod core;
mod logger;
mod message;
mod platform;
mod state;
mod utils;

use clap::Parser;
use cli::args::Args;
use color_eyre::Result;

fn main() -> Result<()> {
    // Initialize error handling
    color_eyre::install()?;

    let args = Args::parse();

    // Determine how config_dir was provided (for `info` command)
    let config_dir_source = match (&args.config_dir, std::env::var("PROXYTRAY_CONFIG_DIR")) {
        (Some(cli_val), Ok(env_val)) if cli_val.to_string_lossy() == env_val => {
            "from PROXYTRAY_CONFIG_DIR"
        }
        (Some(_), _) => "from --config-dir",
        (None, _) => "default",
    };

    // Resolve config directory (CLI flag > SUDO_USER > XDG > default)
    let config_dir = config::resolve_config_dir(args.config_dir.as_ref())
        .map_err(|e| color_eyre::eyre::eyre!("Failed to resolve config directory: {e}"))?;
    config::set_config_dir(config_dir.clone());

    // Load config.toml (or use defaults)
    let app_config = match config::load_config(&config_dir) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Error: {e}");
            eprintln!();
            eprintln!("Fix the file or remove it to use defaults:");
            eprintln!("  nano {}/config.toml", config_dir.display());
            eprintln!("  rm {}/config.toml", config_dir.display());
            std::process::exit(1);
        }
    };

    let logs_dir = config_dir.join(constants::LOGS_DIR_NAME);
    let log_dir = match utils::create_user_dir(&logs_dir) {
        Ok(()) => Some(logs_dir.as_path()),
        Err(e) => {
            eprintln!(
                "Warning: could not create {} ({e}); logging to memory only",
                logs_dir.display()
            );
            None
        }
    };
    logger::configure(&logger::LoggerOptions {
        log_level: if args.verbose {
            "debug"
        } else {
            app_config.log_level.as_str()
        },
        max_entries: app_config.max_log_entries,
        echo_stderr: args.verbose || app_config.log_to_stderr,
        log_dir,
        rotation_size: app_config.log_rotation_size,
        retention_days: app_config.log_retention_days,
    });
    crate::log_info!(
        "APP",
        "{} {} starting (config dir {})",
        constants::APP_NAME,
        constants::APP_VERSION,
        config_dir.display()
    );

    let ctx = cli::commands::Context {
        config: app_config,
        config_dir_source,
    };
    let command = args.command.unwrap_or_default();
    cli::commands::handle_command(&command, &ctx)
}
