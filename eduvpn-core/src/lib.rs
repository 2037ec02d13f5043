//! Core library for the eduVPN client
//!
//! This crate provides browser authorization against eduVPN servers, profile
//! and tunnel configuration retrieval, and the connection lifecycle
//! orchestration that drives a tunnel through it.

pub mod error;
pub mod types;

pub mod auth;
pub mod config;
pub mod remote;
pub mod store;
pub mod tunnel;
pub mod vpn;

/// Initialize logging infrastructure
///
/// Sets up tracing with systemd journal logging when running as a service.
/// Otherwise logs to stderr with pretty formatting. The level comes from
/// `RUST_LOG` and defaults to `info`.
pub fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = || EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // Try to use systemd journal logging if available
    #[cfg(target_os = "linux")]
    {
        if std::env::var("JOURNAL_STREAM").is_ok() {
            let journal_layer = tracing_journald::layer()?;
            tracing_subscriber::registry()
                .with(journal_layer)
                .with(filter())
                .try_init()?;
            return Ok(());
        }
    }

    // Fallback to stderr logging with pretty formatting
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .pretty()
                .with_writer(std::io::stderr),
        )
        .with(filter())
        .try_init()?;

    Ok(())
}
