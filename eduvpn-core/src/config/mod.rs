//! Configuration module
//!
//! Handles loading and saving client settings from TOML files.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

use crate::auth::coordinator::{DEFAULT_CLIENT_ID, DEFAULT_SCOPE};
use crate::auth::OAuthClientConfig;
use crate::error::ConfigError;

pub mod toml_config;

/// How the authorization redirect reaches the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RedirectConfig {
    /// Local HTTP listener; port 0 picks an ephemeral port
    Loopback {
        #[serde(default)]
        port: u16,
    },
    /// Registered redirect URL intercepted by the host application
    External { url: String },
}

impl Default for RedirectConfig {
    fn default() -> Self {
        RedirectConfig::Loopback { port: 0 }
    }
}

/// OAuth client settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthSettings {
    #[serde(default = "default_client_id")]
    pub client_id: String,

    #[serde(default = "default_scope")]
    pub scope: String,

    #[serde(default)]
    pub redirect: RedirectConfig,

    /// Seconds to wait for the browser; 0 waits forever
    #[serde(default = "default_authorization_timeout")]
    pub authorization_timeout_secs: u64,
}

/// Timers of a running session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSettings {
    #[serde(default = "default_poll_interval_ms")]
    pub diagnostics_poll_interval_ms: u64,

    #[serde(default = "default_recheck_interval")]
    pub certificate_recheck_interval_secs: u64,
}

/// Where state files live
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageSettings {
    /// Directory for the persisted connection attempt; defaults to the config directory
    #[serde(default)]
    pub state_dir: Option<PathBuf>,
}

/// Complete client configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default)]
    pub oauth: OAuthSettings,

    #[serde(default)]
    pub session: SessionSettings,

    #[serde(default)]
    pub storage: StorageSettings,
}

fn default_client_id() -> String {
    DEFAULT_CLIENT_ID.to_string()
}

fn default_scope() -> String {
    DEFAULT_SCOPE.to_string()
}

fn default_authorization_timeout() -> u64 {
    300
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_recheck_interval() -> u64 {
    60
}

impl Default for OAuthSettings {
    fn default() -> Self {
        Self {
            client_id: default_client_id(),
            scope: default_scope(),
            redirect: RedirectConfig::default(),
            authorization_timeout_secs: default_authorization_timeout(),
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            diagnostics_poll_interval_ms: default_poll_interval_ms(),
            certificate_recheck_interval_secs: default_recheck_interval(),
        }
    }
}

impl ClientConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.oauth.client_id.trim().is_empty() {
            return Err(ConfigError::MissingField {
                field: "oauth.client_id".to_string(),
            });
        }

        if self.oauth.scope.trim().is_empty() {
            return Err(ConfigError::MissingField {
                field: "oauth.scope".to_string(),
            });
        }

        if let RedirectConfig::External { url } = &self.oauth.redirect {
            let parsed = Url::parse(url).map_err(|_| ConfigError::InvalidUrl {
                field: "oauth.redirect.url".to_string(),
                url: url.clone(),
            })?;
            if parsed.scheme() == "http" || parsed.scheme() == "https" {
                return Err(ConfigError::ValidationError {
                    message: "External redirect must use an app-specific scheme".to_string(),
                });
            }
        }

        if !(100..=60_000).contains(&self.session.diagnostics_poll_interval_ms) {
            return Err(ConfigError::ValidationError {
                message: "diagnostics_poll_interval_ms must be between 100 and 60000".to_string(),
            });
        }

        if !(1..=3600).contains(&self.session.certificate_recheck_interval_secs) {
            return Err(ConfigError::ValidationError {
                message: "certificate_recheck_interval_secs must be between 1 and 3600"
                    .to_string(),
            });
        }

        Ok(())
    }

    /// OAuth settings in the shape the authorization coordinator takes
    pub fn oauth_client(&self) -> OAuthClientConfig {
        let timeout = match self.oauth.authorization_timeout_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        };
        OAuthClientConfig {
            client_id: self.oauth.client_id.clone(),
            scope: self.oauth.scope.clone(),
            timeout,
        }
    }

    pub fn diagnostics_poll_interval(&self) -> Duration {
        Duration::from_millis(self.session.diagnostics_poll_interval_ms)
    }

    pub fn certificate_recheck_interval(&self) -> Duration {
        Duration::from_secs(self.session.certificate_recheck_interval_secs)
    }
}
