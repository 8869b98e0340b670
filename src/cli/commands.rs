//! CLI command handlers.

use std::sync::Arc;

use color_eyre::eyre::eyre;
use color_eyre::Result;

use crate::cli::args::{Commands, RouteAllMode};
use crate::cli::session;
use crate::config::{self, AppConfig};
use crate::constants;
use crate::core::controller::{self, ProxyController};
use crate::core::settings::TunnelSettings;
use crate::core::whitelist;
use crate::core::Layout;
use crate::platform::{CommandRunner, SystemRunner};

/// Startup facts shared by all handlers.
#[derive(Debug, Clone)]
pub struct Context {
    pub config: AppConfig,
    /// How the config directory was chosen, for `info`.
    pub config_dir_source: &'static str,
}

/// Runs one CLI command to completion.
///
/// # Errors
///
/// Returns the failure of the command as a single descriptive error.
pub fn handle_command(command: &Commands, ctx: &Context) -> Result<()> {
    let layout = Layout::new(&config::get_config_dir()?);
    crate::log_debug!("CLI", "Running command {command:?}");

    match command {
        Commands::Run { no_enable } => {
            let controller = ProxyController::system(layout, &ctx.config);
            session::run(controller, !no_enable)
        }
        Commands::Cleanup => {
            handle_cleanup(layout, ctx);
            Ok(())
        }
        Commands::Status => {
            handle_status(layout, ctx);
            Ok(())
        }
        Commands::RouteAll { mode } => handle_route_all(layout, ctx, *mode),
        Commands::SetSsh { host, user, port } => handle_set_ssh(layout, ctx, host, user, *port),
        Commands::SetPassword => handle_set_password(layout, ctx),
        Commands::Whitelist { check } => handle_whitelist(&layout, *check),
        Commands::Info => {
            handle_info(&layout, ctx);
            Ok(())
        }
    }
}

fn handle_cleanup(layout: Layout, ctx: &Context) {
    let mut controller = ProxyController::system(layout, &ctx.config);
    controller.cleanup();
    println!(
        "Tunnel stopped, port {} released and system proxy settings cleared.",
        constants::SOCKS_PORT
    );
}

/// Reports what the system shows. A session in another process is visible
/// through the detected mode and the port listener.
fn handle_status(layout: Layout, ctx: &Context) {
    let mut controller = ProxyController::system(layout, &ctx.config);
    controller.load_preferences();
    let report = controller.status();

    println!(
        "Routing:   {}",
        if report.state.route_all {
            "all traffic"
        } else {
            "whitelist (PAC)"
        }
    );
    match &report.detected {
        Ok(mode) => println!("Detected:  {mode}"),
        Err(e) => println!("Detected:  unknown ({e})"),
    }
    if report.port_listeners.is_empty() {
        println!("Listener:  none on port {}", constants::SOCKS_PORT);
    } else {
        let pids: Vec<String> = report.port_listeners.iter().map(u32::to_string).collect();
        println!(
            "Listener:  pid {} on port {}",
            pids.join(", "),
            constants::SOCKS_PORT
        );
    }
}

fn handle_route_all(layout: Layout, ctx: &Context, mode: RouteAllMode) -> Result<()> {
    let mut controller = ProxyController::system(layout, &ctx.config);
    controller.load_preferences();

    match mode {
        RouteAllMode::On => controller.set_route_all(true)?,
        RouteAllMode::Off => controller.set_route_all(false)?,
        RouteAllMode::Toggle => controller.toggle_route_all()?,
    }
    let switched = controller.retarget_live_session()?;

    println!(
        "Route all traffic: {}",
        if controller.state().route_all {
            "on"
        } else {
            "off"
        }
    );
    if switched {
        println!("Applied to the running session.");
    }
    Ok(())
}

fn handle_set_ssh(layout: Layout, ctx: &Context, host: &str, user: &str, port: u32) -> Result<()> {
    let controller = ProxyController::system(layout, &ctx.config);
    let settings = TunnelSettings {
        host: host.to_string(),
        username: user.to_string(),
        port,
    };
    let saved = controller.save_tunnel_settings(&settings)?;
    println!("Saved SSH settings: {saved}");
    Ok(())
}

fn handle_set_password(layout: Layout, ctx: &Context) -> Result<()> {
    let secret = crate::utils::read_secret_line("SSH password: ")
        .map_err(|e| eyre!("Could not read password: {e}"))?;
    let controller = ProxyController::system(layout, &ctx.config);
    controller.store_secret(&secret)?;
    println!("Password stored.");
    Ok(())
}

fn handle_whitelist(layout: &Layout, check: bool) -> Result<()> {
    whitelist::ensure_whitelist(&layout.whitelist)?;
    println!("{}", layout.whitelist.display());
    if !check {
        return Ok(());
    }

    let entries = whitelist::load_whitelist(&layout.whitelist)?;
    for entry in &entries {
        println!("  {:<18} mask {}", entry.to_string(), entry.mask());
    }
    println!("{} network(s) routed through the tunnel", entries.len());
    Ok(())
}

fn handle_info(layout: &Layout, ctx: &Context) {
    let present = |path: &std::path::Path| if path.exists() { "" } else { " (missing)" };

    println!("{} {}", constants::APP_NAME, constants::APP_VERSION);
    println!();
    println!(
        "Config dir:   {} ({})",
        layout.config_dir.display(),
        ctx.config_dir_source
    );
    let config_file = layout.config_dir.join(constants::CONFIG_FILE_NAME);
    println!(
        "Config file:  {}{}",
        config_file.display(),
        present(&config_file)
    );
    println!(
        "Whitelist:    {}{}",
        layout.whitelist.display(),
        present(&layout.whitelist)
    );
    println!("PAC file:     {}", layout.pac.display());
    println!(
        "SSH settings: {}{}",
        layout.ssh_settings.display(),
        present(&layout.ssh_settings)
    );
    println!(
        "Password:     {}{}",
        layout.vault_secret.display(),
        present(&layout.vault_secret)
    );
    let runner: Arc<dyn CommandRunner> = Arc::new(SystemRunner);
    println!(
        "Vault key:    {}",
        controller::key_store(&runner, layout).describe()
    );
    println!("Logs:         {}", layout.logs_dir.display());
    println!();
    println!(
        "SOCKS endpoint: {}:{}",
        constants::SOCKS_HOST,
        constants::SOCKS_PORT
    );
    println!("SSH client:     {}", ctx.config.ssh_binary);
    println!("networksetup:   {}", ctx.config.networksetup_binary);
    println!(
        "Host keys:      {}",
        if ctx.config.strict_host_key_checking {
            "verified"
        } else {
            "not verified"
        }
    );
    println!("Running as root: {}", crate::utils::is_root());
}
