//! Configuration file commands

use colored::Colorize;
use eduvpn_core::config::toml_config::{
    config_exists, get_config_path, load_config, save_config, state_dir,
};
use eduvpn_core::config::{ClientConfig, RedirectConfig};
use eduvpn_core::error::EduVpnError;

/// Run the config show command
pub fn run_show() -> Result<(), EduVpnError> {
    let path = get_config_path()?;
    let config = load_config()?;

    if config_exists()? {
        println!("{} {}", "File:".bold(), path.display());
    } else {
        println!("{} {} (not present, using defaults)", "File:".bold(), path.display());
    }

    println!("{}", "[oauth]".bold());
    println!("  client_id = {}", config.oauth.client_id);
    println!("  scope = {}", config.oauth.scope);
    match &config.oauth.redirect {
        RedirectConfig::Loopback { port: 0 } => println!("  redirect = loopback (any port)"),
        RedirectConfig::Loopback { port } => println!("  redirect = loopback (port {})", port),
        RedirectConfig::External { url } => println!("  redirect = external ({})", url),
    }
    match config.oauth.authorization_timeout_secs {
        0 => println!("  authorization_timeout = none"),
        secs => println!("  authorization_timeout = {}s", secs),
    }

    println!("{}", "[session]".bold());
    println!(
        "  diagnostics_poll_interval = {:?}",
        config.diagnostics_poll_interval()
    );
    println!(
        "  certificate_recheck_interval = {:?}",
        config.certificate_recheck_interval()
    );

    println!("{}", "[storage]".bold());
    println!("  state_dir = {}", state_dir(&config)?.display());
    Ok(())
}

/// Run the config init command
pub fn run_init(force: bool) -> Result<(), EduVpnError> {
    if config_exists()? && !force {
        println!(
            "{} Configuration already exists at {} (use --force to overwrite)",
            "⚠".yellow(),
            get_config_path()?.display()
        );
        return Ok(());
    }

    let path = save_config(&ClientConfig::default())?;
    println!("{} Wrote default configuration to {}", "✓".green(), path.display());
    Ok(())
}
