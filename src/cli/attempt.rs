//! Persisted connection attempt commands

use chrono::{Local, Utc};
use colored::Colorize;
use eduvpn_core::config::toml_config::{load_config, state_dir};
use eduvpn_core::error::EduVpnError;
use eduvpn_core::store::{reconcile_removal, ConnectionAttemptStore, JsonFileAttemptStore};
use eduvpn_core::types::ConnectionAttempt;
use eduvpn_core::vpn::{CertificateState, CertificateStatus};

use super::ForgetArgs;

fn open_store() -> Result<JsonFileAttemptStore, EduVpnError> {
    let config = load_config()?;
    Ok(JsonFileAttemptStore::in_dir(&state_dir(&config)?))
}

fn describe(attempt: &ConnectionAttempt) {
    println!("{} {}", "Target:".bold(), attempt.target);
    println!("{} {}", "Attempt:".bold(), attempt.attempt_id);
    println!(
        "{} {}",
        "Created:".bold(),
        attempt.created_at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S")
    );

    if !attempt.profiles.is_empty() {
        println!("{}", "Profiles:".bold());
        for profile in &attempt.profiles {
            let marker = if attempt.selected_profile_id.as_deref() == Some(&profile.profile_id) {
                "*".green().bold()
            } else {
                " ".normal()
            };
            println!("  {} {}  {}", marker, profile.profile_id.cyan(), profile.display_name);
        }
    }

    if let Some(validity) = attempt.certificate_validity_range {
        let status = CertificateStatus::at(validity, Utc::now());
        let state = match status.state {
            CertificateState::Valid => "valid".green(),
            CertificateState::ExpiringSoon => "expiring soon".yellow(),
            CertificateState::Expired => "expired".red(),
        };
        println!(
            "{} {} (until {})",
            "Certificate:".bold(),
            state,
            validity.expires_at().with_timezone(&Local).format("%Y-%m-%d %H:%M")
        );
    }
}

/// Run the attempt show command
pub fn run_show(json: bool) -> Result<(), EduVpnError> {
    let store = open_store()?;
    let Some(attempt) = store.load_most_recent()? else {
        println!("No connection attempt recorded");
        return Ok(());
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&attempt)?);
    } else {
        describe(&attempt);
    }
    Ok(())
}

/// Run the attempt clear command
pub fn run_clear() -> Result<(), EduVpnError> {
    open_store()?.clear()?;
    println!("{} Connection attempt cleared", "✓".green());
    Ok(())
}

/// Run the forget command
pub fn run_forget(args: &ForgetArgs) -> Result<(), EduVpnError> {
    let Some(removal) = args.removal() else {
        return Ok(());
    };
    let store = open_store()?;

    if reconcile_removal(&store, &removal)? {
        println!(
            "{} The recorded connection belonged to the removed entry and was cleared",
            "✓".green()
        );
        println!("  Disable the VPN tunnel it describes if it is still running.");
    } else {
        println!("Recorded connection is unaffected");
    }
    Ok(())
}
