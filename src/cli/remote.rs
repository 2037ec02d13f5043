//! Commands that sign in to a server

use std::path::Path;

use chrono::Local;
use colored::Colorize;
use eduvpn_core::auth::{AuthorizationCoordinator, AuthorizationEndpoints};
use eduvpn_core::config::toml_config::load_config;
use eduvpn_core::error::{ConnectionError, EduVpnError};
use eduvpn_core::remote::{HttpConfigFetcher, RemoteConfigFetcher, DEFAULT_REQUEST_TIMEOUT};
use eduvpn_core::types::{AuthState, Profile, ServerInfo};
use tracing::info;

use super::{build_coordinator, ServerArgs};

/// Run one browser sign-in; Ctrl+C cancels it
async fn authorize(
    coordinator: &AuthorizationCoordinator,
    info: &ServerInfo,
    args: &ServerArgs,
) -> Result<AuthState, ConnectionError> {
    let wayf = args.target().wayf_skipping_info();
    let endpoints = AuthorizationEndpoints::from(info);
    let flow = coordinator.start_authorization(&endpoints, wayf.as_ref());
    tokio::pin!(flow);

    tokio::select! {
        result = &mut flow => result,
        _ = tokio::signal::ctrl_c() => {
            coordinator.cancel();
            flow.await
        }
    }
}

/// Sign in and fetch the profile list
async fn signed_in_profiles(
    args: &ServerArgs,
) -> Result<(HttpConfigFetcher, ServerInfo, AuthState, Vec<Profile>), EduVpnError> {
    let config = load_config()?;
    let fetcher = HttpConfigFetcher::new(DEFAULT_REQUEST_TIMEOUT)?;
    let coordinator = build_coordinator(&config, args.print_url)?;

    let info = fetcher.fetch_server_info(&args.remote_server()).await?;
    let auth = authorize(&coordinator, &info, args).await?;
    let profiles = fetcher.list_profiles(&info, &auth).await?;
    Ok((fetcher, info, auth, profiles))
}

/// Run the profiles command
pub async fn run_profiles(args: &ServerArgs) -> Result<(), EduVpnError> {
    let (_, _, _, profiles) = signed_in_profiles(args).await?;

    if profiles.is_empty() {
        println!("{}", "No profiles available on this server".yellow());
        return Ok(());
    }

    println!("{}", format!("Profiles of {}", args.server).bold());
    for profile in &profiles {
        println!("  {}  {}", profile.profile_id.cyan(), profile.display_name);
    }
    Ok(())
}

/// Run the fetch-config command
pub async fn run_fetch_config(
    args: &ServerArgs,
    profile_id: &str,
    output: &Path,
) -> Result<(), EduVpnError> {
    let (fetcher, info, auth, profiles) = signed_in_profiles(args).await?;

    let Some(profile) = profiles.iter().find(|p| p.profile_id == profile_id) else {
        let known: Vec<&str> = profiles.iter().map(|p| p.profile_id.as_str()).collect();
        return Err(ConnectionError::MalformedRemoteResponse {
            reason: format!(
                "server offers no profile {} (available: {})",
                profile_id,
                known.join(", ")
            ),
        }
        .into());
    };

    let configuration = fetcher
        .fetch_tunnel_configuration(&info, &auth, profile)
        .await?;
    write_private(output, configuration.tunnel_blob.expose())?;
    info!(path = %output.display(), profile_id, "Wrote tunnel configuration");

    let validity = configuration.certificate_validity_range;
    println!(
        "{} Wrote configuration for {} to {}",
        "✓".green(),
        profile.display_name.bold(),
        output.display()
    );
    println!(
        "  Certificate valid until {}",
        validity
            .expires_at()
            .with_timezone(&Local)
            .format("%Y-%m-%d %H:%M")
    );
    Ok(())
}

/// The configuration embeds a private key; keep it owner-readable only
fn write_private(path: &Path, contents: &str) -> Result<(), EduVpnError> {
    std::fs::write(path, contents)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
}
