//! CLI command implementations
//!
//! This module contains the implementation of all CLI subcommands and the
//! argument groups they share.

pub mod attempt;
pub mod config;
pub mod remote;

use std::io::BufRead;
use std::sync::Arc;

use eduvpn_core::auth::{
    AuthorizationCoordinator, AuthorizationTransport, ExternalRedirectTransport,
    LoopbackTransport, PrintUrl, SystemBrowser, UserAgent,
};
use eduvpn_core::config::{ClientConfig, RedirectConfig};
use eduvpn_core::error::{ConfigError, EduVpnError};
use eduvpn_core::store::TargetRemoval;
use eduvpn_core::types::{ConnectableTarget, RemoteServer};
use tracing::{debug, warn};
use url::Url;

/// Server selection shared by commands that sign in
#[derive(clap::Args, Debug)]
pub struct ServerArgs {
    /// Base URL of the eduVPN server
    pub server: String,

    /// Organization id, for Secure Internet servers
    #[arg(long, requires = "auth_template")]
    pub org_id: Option<String>,

    /// Authentication URL template of the organization (@RETURN_TO@ and @ORG_ID@ are filled in)
    #[arg(long, requires = "org_id")]
    pub auth_template: Option<String>,

    /// Print the authorization URL instead of opening a browser
    #[arg(long)]
    pub print_url: bool,
}

impl ServerArgs {
    pub fn remote_server(&self) -> RemoteServer {
        RemoteServer {
            base_url: self.server.clone(),
            org_id: self.org_id.clone(),
            auth_url_template: self.auth_template.clone(),
        }
    }

    pub fn target(&self) -> ConnectableTarget {
        ConnectableTarget::RemoteServer(self.remote_server())
    }
}

/// The removed entry; exactly one must be given
#[derive(clap::Args, Debug)]
#[group(required = true, multiple = false)]
pub struct ForgetArgs {
    /// Base URL of a removed server
    #[arg(long)]
    pub server: Option<String>,

    /// Id of a removed organization
    #[arg(long)]
    pub org: Option<String>,

    /// Name of a removed static configuration
    #[arg(long = "static")]
    pub static_config: Option<String>,
}

impl ForgetArgs {
    pub fn removal(&self) -> Option<TargetRemoval> {
        if let Some(base_url) = &self.server {
            return Some(TargetRemoval::Server {
                base_url: base_url.clone(),
            });
        }
        if let Some(org_id) = &self.org {
            return Some(TargetRemoval::Organization {
                org_id: org_id.clone(),
            });
        }
        self.static_config
            .as_ref()
            .map(|name| TargetRemoval::StaticConfig { name: name.clone() })
    }
}

/// Authorization coordinator for the configured redirect mode
///
/// In external mode the redirected URL is read from stdin, one line at a time,
/// until one matches the registered redirect URL.
pub fn build_coordinator(
    config: &ClientConfig,
    print_url: bool,
) -> Result<AuthorizationCoordinator, EduVpnError> {
    let user_agent: Arc<dyn UserAgent> = if print_url {
        Arc::new(PrintUrl)
    } else {
        Arc::new(SystemBrowser)
    };

    let transport: Arc<dyn AuthorizationTransport> = match &config.oauth.redirect {
        RedirectConfig::Loopback { port } => Arc::new(LoopbackTransport::with_port(*port)),
        RedirectConfig::External { url } => {
            let redirect_uri = Url::parse(url).map_err(|_| ConfigError::InvalidUrl {
                field: "oauth.redirect.url".to_string(),
                url: url.clone(),
            })?;
            let transport = ExternalRedirectTransport::new(redirect_uri);
            forward_pasted_redirects(transport.clone());
            Arc::new(transport)
        }
    };

    Ok(AuthorizationCoordinator::new(
        config.oauth_client(),
        transport,
        user_agent,
    )?)
}

fn forward_pasted_redirects(transport: ExternalRedirectTransport) {
    eprintln!("After signing in, paste the URL the browser was redirected to and press Enter.");
    // Detached: a blocked stdin read must not hold up process exit
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else {
                break;
            };
            match Url::parse(line.trim()) {
                Ok(url) if transport.resume(url.clone()) => {
                    debug!("Forwarded pasted redirect");
                    break;
                }
                Ok(_) => warn!("Pasted URL does not match the registered redirect URL"),
                Err(e) => warn!(error = %e, "Pasted text is not a URL"),
            }
        }
    });
}
