//! Type definitions shared by the connection components
//!
//! Sensitive values (tokens, tunnel configurations carrying private keys) are
//! wrapped with the secrecy crate to prevent accidental exposure in logs or
//! debug output.

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use url::Url;
use uuid::Uuid;

use crate::error::StoreError;

/// A remote eduVPN server that requires browser authorization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteServer {
    /// Base URL identifying the server, e.g. `https://vpn.example.org/`
    pub base_url: String,

    /// Organization the user picked, for Secure Internet servers
    #[serde(default)]
    pub org_id: Option<String>,

    /// Authentication URL template from the server list, used to skip the
    /// identity provider chooser
    #[serde(default)]
    pub auth_url_template: Option<String>,
}

/// A pre-bundled tunnel configuration stored on disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaticConfig {
    pub name: String,
    pub storage_path: PathBuf,
}

/// Something the client can connect to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConnectableTarget {
    RemoteServer(RemoteServer),
    StaticConfig(StaticConfig),
}

impl ConnectableTarget {
    /// Target for an institute access server
    pub fn server(base_url: impl Into<String>) -> Self {
        ConnectableTarget::RemoteServer(RemoteServer {
            base_url: base_url.into(),
            org_id: None,
            auth_url_template: None,
        })
    }

    /// Target for a Secure Internet server reached through an organization
    pub fn secure_internet(
        base_url: impl Into<String>,
        org_id: impl Into<String>,
        auth_url_template: Option<String>,
    ) -> Self {
        ConnectableTarget::RemoteServer(RemoteServer {
            base_url: base_url.into(),
            org_id: Some(org_id.into()),
            auth_url_template,
        })
    }

    pub fn is_remote_server(&self) -> bool {
        matches!(self, ConnectableTarget::RemoteServer(_))
    }

    pub fn is_static_config(&self) -> bool {
        matches!(self, ConnectableTarget::StaticConfig(_))
    }

    /// WAYF skipping info, available only when both an org id and a template are known
    pub fn wayf_skipping_info(&self) -> Option<WayfSkippingInfo> {
        match self {
            ConnectableTarget::RemoteServer(RemoteServer {
                org_id: Some(org_id),
                auth_url_template: Some(template),
                ..
            }) => Some(WayfSkippingInfo {
                auth_url_template: template.clone(),
                org_id: org_id.clone(),
            }),
            _ => None,
        }
    }
}

impl std::fmt::Display for ConnectableTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectableTarget::RemoteServer(server) => write!(f, "{}", server.base_url),
            ConnectableTarget::StaticConfig(config) => write!(f, "config:{}", config.name),
        }
    }
}

/// Info to skip the "Where Are You From" page while authorizing in the browser
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WayfSkippingInfo {
    /// Template containing `@RETURN_TO@` and `@ORG_ID@` placeholders
    pub auth_url_template: String,
    pub org_id: String,
}

/// Endpoints advertised by a server's `info.json`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerInfo {
    pub authorization_endpoint: Url,
    pub token_endpoint: Url,
    pub api_base_url: Url,
}

/// A named tunnel variant offered by a server
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Profile {
    pub profile_id: String,
    pub display_name: String,
}

impl Profile {
    pub fn new(profile_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            profile_id: profile_id.into(),
            display_name: display_name.into(),
        }
    }
}

/// Validity window of the client certificate embedded in a tunnel configuration
///
/// Always satisfies `valid_from < expires_at`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawValidityRange")]
pub struct CertificateValidityRange {
    valid_from: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct RawValidityRange {
    valid_from: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl TryFrom<RawValidityRange> for CertificateValidityRange {
    type Error = String;

    fn try_from(raw: RawValidityRange) -> Result<Self, Self::Error> {
        CertificateValidityRange::new(raw.valid_from, raw.expires_at).ok_or_else(|| {
            format!(
                "certificate validity starts ({}) at or after it ends ({})",
                raw.valid_from, raw.expires_at
            )
        })
    }
}

impl CertificateValidityRange {
    /// Returns `None` unless `valid_from` is strictly before `expires_at`
    pub fn new(valid_from: DateTime<Utc>, expires_at: DateTime<Utc>) -> Option<Self> {
        if valid_from < expires_at {
            Some(Self {
                valid_from,
                expires_at,
            })
        } else {
            None
        }
    }

    pub fn valid_from(&self) -> DateTime<Utc> {
        self.valid_from
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Instant from which the certificate counts as expiring soon
    pub fn expiring_soon_at(&self) -> DateTime<Utc> {
        self.valid_from + (self.expires_at - self.valid_from) / 2
    }
}

/// The persisted record of what we are (or were last) connecting to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionAttempt {
    pub attempt_id: Uuid,
    pub target: ConnectableTarget,
    #[serde(default)]
    pub profiles: Vec<Profile>,
    #[serde(default)]
    pub selected_profile_id: Option<String>,
    #[serde(default)]
    pub certificate_validity_range: Option<CertificateValidityRange>,
    pub created_at: DateTime<Utc>,
}

impl ConnectionAttempt {
    /// Attempt for a remote server profile
    ///
    /// # Errors
    ///
    /// Returns `StoreError::UnknownSelectedProfile` when `selected_profile_id`
    /// is not among `profiles`.
    pub fn for_server(
        target: ConnectableTarget,
        profiles: Vec<Profile>,
        selected_profile_id: String,
        certificate_validity_range: CertificateValidityRange,
    ) -> Result<Self, StoreError> {
        let attempt = Self {
            attempt_id: Uuid::new_v4(),
            target,
            profiles,
            selected_profile_id: Some(selected_profile_id),
            certificate_validity_range: Some(certificate_validity_range),
            created_at: Utc::now(),
        };
        attempt.validate()?;
        Ok(attempt)
    }

    /// Attempt for a static configuration, which has no profiles or certificate
    pub fn for_static_config(target: ConnectableTarget) -> Self {
        Self {
            attempt_id: Uuid::new_v4(),
            target,
            profiles: Vec::new(),
            selected_profile_id: None,
            certificate_validity_range: None,
            created_at: Utc::now(),
        }
    }

    /// Check that the selected profile, if any, is one of the attempt's profiles
    pub fn validate(&self) -> Result<(), StoreError> {
        match &self.selected_profile_id {
            Some(id) if !self.profiles.iter().any(|p| &p.profile_id == id) => {
                Err(StoreError::UnknownSelectedProfile {
                    profile_id: id.clone(),
                })
            }
            _ => Ok(()),
        }
    }

    /// The selected profile, looked up in the attempt's profile list
    pub fn selected_profile(&self) -> Option<&Profile> {
        let id = self.selected_profile_id.as_ref()?;
        self.profiles.iter().find(|p| &p.profile_id == id)
    }
}

/// OAuth access token
#[derive(Clone, Debug)]
pub struct AccessToken(Secret<String>);

impl AccessToken {
    pub fn new(token: String) -> Self {
        Self(Secret::new(token))
    }

    /// Expose the token value (use with caution!)
    ///
    /// This should only be called when building the Authorization header.
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

/// OAuth refresh token
#[derive(Clone, Debug)]
pub struct RefreshToken(Secret<String>);

impl RefreshToken {
    pub fn new(token: String) -> Self {
        Self(Secret::new(token))
    }

    /// Expose the token value (use with caution!)
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

/// Result of a completed authorization code exchange
#[derive(Clone, Debug)]
pub struct AuthState {
    pub access_token: AccessToken,
    pub refresh_token: Option<RefreshToken>,
    pub token_type: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl AuthState {
    /// Whether the access token is known to have expired
    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| at <= Utc::now())
    }
}

/// Tunnel configuration as handed to the OS; contains key material
#[derive(Clone, Debug)]
pub struct TunnelBlob(Secret<String>);

impl TunnelBlob {
    pub fn new(config: String) -> Self {
        Self(Secret::new(config))
    }

    /// Expose the configuration (use with caution!)
    ///
    /// Only the tunnel-control collaborator should read the contents.
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }

    /// Configuration split into lines, the shape most tunnel backends expect
    pub fn lines(&self) -> Vec<String> {
        self.expose().lines().map(str::to_string).collect()
    }
}

impl From<String> for TunnelBlob {
    fn from(config: String) -> Self {
        Self::new(config)
    }
}

/// What the server hands out for a chosen profile
#[derive(Clone, Debug)]
pub struct TunnelConfiguration {
    pub tunnel_blob: TunnelBlob,
    pub certificate_validity_range: CertificateValidityRange,
}

/// Display info used for the connection screen header
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerDisplayInfo {
    pub server_name: String,
    pub flag_country_code: String,
    pub support_contact: Vec<String>,
}
