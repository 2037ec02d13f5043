//! eduvpn - eduVPN client CLI
//!
//! Signs in to eduVPN servers through the browser, lists their profiles,
//! downloads tunnel configurations and manages the persisted connection
//! attempt.

use anyhow::Context;
use clap::{Parser, Subcommand};
use colored::Colorize;
use eduvpn_core::{error::EduVpnError, init_logging};

mod cli;

use cli::{ForgetArgs, ServerArgs};

#[derive(Parser)]
#[command(name = "eduvpn")]
#[command(about = "eduVPN client: browser sign-in, profiles and tunnel configurations")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sign in to a server and list its profiles
    Profiles {
        #[command(flatten)]
        server: ServerArgs,
    },
    /// Sign in and download the tunnel configuration of a profile
    FetchConfig {
        #[command(flatten)]
        server: ServerArgs,
        /// Profile id as listed by `eduvpn profiles`
        #[arg(long)]
        profile: String,
        /// File to write the configuration to
        #[arg(long, short)]
        output: std::path::PathBuf,
    },
    /// Inspect or discard the persisted connection attempt
    Attempt {
        #[command(subcommand)]
        action: AttemptCommands,
    },
    /// Reconcile the persisted attempt after removing a server or organization
    Forget(ForgetArgs),
    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum AttemptCommands {
    /// Show the persisted attempt
    Show {
        /// Print the raw record as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete the persisted attempt
    Clear,
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show the effective configuration
    Show,
    /// Write a configuration file with the default settings
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

async fn run(command: Commands) -> anyhow::Result<()> {
    match command {
        Commands::Profiles { server } => cli::remote::run_profiles(&server)
            .await
            .with_context(|| format!("Failed to list profiles of {}", server.server)),
        Commands::FetchConfig {
            server,
            profile,
            output,
        } => cli::remote::run_fetch_config(&server, &profile, &output)
            .await
            .with_context(|| format!("Failed to fetch configuration for profile {}", profile)),
        Commands::Attempt { action } => match action {
            AttemptCommands::Show { json } => cli::attempt::run_show(json),
            AttemptCommands::Clear => cli::attempt::run_clear(),
        }
        .context("Failed to access the connection attempt"),
        Commands::Forget(args) => {
            cli::attempt::run_forget(&args).context("Failed to reconcile the removal")
        }
        Commands::Config { action } => match action {
            ConfigCommands::Show => cli::config::run_show(),
            ConfigCommands::Init { force } => cli::config::run_init(force),
        }
        .context("Configuration command failed"),
    }
}

/// Exit code for a failed command: 2 configuration, 130 cancelled, 1 otherwise
fn exit_code(error: &anyhow::Error) -> i32 {
    match error.downcast_ref::<EduVpnError>() {
        Some(EduVpnError::Config(_) | EduVpnError::Toml(_) | EduVpnError::TomlSerialize(_)) => 2,
        Some(EduVpnError::Connection(e)) if e.is_user_cancelled() => 130,
        _ => 1,
    }
}

fn main() {
    // Initialize logging
    if let Err(e) = init_logging() {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(2);
    }

    let cli = Cli::parse();

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Failed to start async runtime: {}", e);
            std::process::exit(1);
        }
    };

    match runtime.block_on(run(cli.command)) {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            let code = exit_code(&e);
            match e.downcast_ref::<EduVpnError>() {
                Some(EduVpnError::Connection(connection)) if connection.is_user_cancelled() => {
                    eprintln!("{}", connection.summary().yellow());
                }
                Some(EduVpnError::Connection(connection)) => {
                    eprintln!("{} {}", "✗".red().bold(), connection.summary().bold());
                    eprintln!("  {:#}", e);
                }
                _ => eprintln!("{} {:#}", "✗".red().bold(), e),
            }
            std::process::exit(code);
        }
    }
}
