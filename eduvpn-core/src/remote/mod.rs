//! Talking to the eduVPN server API
//!
//! The orchestrator only depends on [`RemoteConfigFetcher`]. [`HttpConfigFetcher`]
//! implements it against the server's `info.json` discovery document and the
//! `profile_list` / `connect` API calls.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderName, DATE, EXPIRES};
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::ConnectionError;
use crate::types::{
    AuthState, CertificateValidityRange, Profile, RemoteServer, ServerInfo, TunnelBlob,
    TunnelConfiguration,
};

/// API version key inside `info.json`
pub const API_VERSION_KEY: &str = "http://eduvpn.org/api#2";

/// Default timeout for API requests
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Source of server info, profiles and tunnel configurations
#[async_trait]
pub trait RemoteConfigFetcher: Send + Sync {
    async fn fetch_server_info(&self, server: &RemoteServer) -> Result<ServerInfo, ConnectionError>;

    async fn list_profiles(
        &self,
        server_info: &ServerInfo,
        auth: &AuthState,
    ) -> Result<Vec<Profile>, ConnectionError>;

    async fn fetch_tunnel_configuration(
        &self,
        server_info: &ServerInfo,
        auth: &AuthState,
        profile: &Profile,
    ) -> Result<TunnelConfiguration, ConnectionError>;
}

/// Map a transport-level reqwest failure onto the connection taxonomy
pub(crate) fn classify_reqwest_error(e: reqwest::Error) -> ConnectionError {
    if e.is_decode() {
        return ConnectionError::MalformedRemoteResponse {
            reason: format!("Failed to decode response: {}", e),
        };
    }

    let reason = if e.is_timeout() {
        "Request timed out".to_string()
    } else if e.is_connect() {
        "Connection refused or unreachable".to_string()
    } else {
        format!("Request failed: {}", e)
    };
    ConnectionError::NetworkUnavailable { reason }
}

/// Reject non-success statuses, recognising revoked authorizations
fn check_status(response: Response) -> Result<Response, ConnectionError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    warn!(status = %status, url = %response.url(), "Server returned error status");
    match status {
        StatusCode::UNAUTHORIZED => Err(ConnectionError::AuthorizationExpired),
        s if s.is_server_error() => Err(ConnectionError::NetworkUnavailable {
            reason: format!("Server error: {}", s),
        }),
        s => Err(ConnectionError::MalformedRemoteResponse {
            reason: format!("Unexpected status: {}", s),
        }),
    }
}

/// Append `path` to an API base URL without dropping its last segment
fn api_url(base: &Url, path: &str) -> Result<Url, ConnectionError> {
    let joined = format!("{}/{}", base.as_str().trim_end_matches('/'), path);
    Url::parse(&joined).map_err(|e| ConnectionError::MalformedRemoteResponse {
        reason: format!("Invalid API URL {}: {}", joined, e),
    })
}

fn parse_endpoint(endpoints: &HashMap<String, String>, key: &str) -> Result<Url, ConnectionError> {
    let value = endpoints
        .get(key)
        .ok_or_else(|| ConnectionError::MalformedRemoteResponse {
            reason: format!("info.json lacks {}", key),
        })?;
    Url::parse(value).map_err(|e| ConnectionError::MalformedRemoteResponse {
        reason: format!("info.json has invalid {}: {}", key, e),
    })
}

fn parse_http_date(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(value)
        .ok()
        .map(|d| d.with_timezone(&Utc))
}

#[derive(Debug, Deserialize)]
struct InfoDocument {
    api: HashMap<String, HashMap<String, String>>,
}

#[derive(Debug, Deserialize)]
struct ProfileListResponse {
    profile_list: ProfileListBody,
}

#[derive(Debug, Deserialize)]
struct ProfileListBody {
    ok: bool,
    #[serde(default)]
    data: Vec<Profile>,
}

/// [`RemoteConfigFetcher`] over HTTPS
#[derive(Debug, Clone)]
pub struct HttpConfigFetcher {
    client: Client,
}

impl HttpConfigFetcher {
    pub fn new(timeout: Duration) -> Result<Self, ConnectionError> {
        let client = Client::builder()
            .timeout(timeout)
            .use_rustls_tls()
            .build()
            .map_err(|e| ConnectionError::NetworkUnavailable {
                reason: format!("Failed to create HTTP client: {}", e),
            })?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl RemoteConfigFetcher for HttpConfigFetcher {
    #[tracing::instrument(skip(self, server), fields(base_url = %server.base_url))]
    async fn fetch_server_info(&self, server: &RemoteServer) -> Result<ServerInfo, ConnectionError> {
        let base = Url::parse(&server.base_url).map_err(|e| ConnectionError::NetworkUnavailable {
            reason: format!("Invalid server URL {}: {}", server.base_url, e),
        })?;
        let url = api_url(&base, "info.json")?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(classify_reqwest_error)?;
        let document: InfoDocument = check_status(response)?
            .json()
            .await
            .map_err(classify_reqwest_error)?;

        let endpoints = document.api.get(API_VERSION_KEY).ok_or_else(|| {
            ConnectionError::MalformedRemoteResponse {
                reason: format!("info.json does not offer API {}", API_VERSION_KEY),
            }
        })?;

        let info = ServerInfo {
            authorization_endpoint: parse_endpoint(endpoints, "authorization_endpoint")?,
            token_endpoint: parse_endpoint(endpoints, "token_endpoint")?,
            api_base_url: parse_endpoint(endpoints, "api_base_uri")?,
        };
        debug!(api_base_url = %info.api_base_url, "Fetched server info");
        Ok(info)
    }

    #[tracing::instrument(skip_all, fields(api = %server_info.api_base_url))]
    async fn list_profiles(
        &self,
        server_info: &ServerInfo,
        auth: &AuthState,
    ) -> Result<Vec<Profile>, ConnectionError> {
        let url = api_url(&server_info.api_base_url, "profile_list")?;
        let response = self
            .client
            .get(url)
            .bearer_auth(auth.access_token.expose())
            .send()
            .await
            .map_err(classify_reqwest_error)?;
        let body: ProfileListResponse = check_status(response)?
            .json()
            .await
            .map_err(classify_reqwest_error)?;

        if !body.profile_list.ok {
            return Err(ConnectionError::MalformedRemoteResponse {
                reason: "profile_list reported failure".to_string(),
            });
        }

        info!(count = body.profile_list.data.len(), "Fetched profile list");
        Ok(body.profile_list.data)
    }

    #[tracing::instrument(skip_all, fields(api = %server_info.api_base_url, profile_id = %profile.profile_id))]
    async fn fetch_tunnel_configuration(
        &self,
        server_info: &ServerInfo,
        auth: &AuthState,
        profile: &Profile,
    ) -> Result<TunnelConfiguration, ConnectionError> {
        let url = api_url(&server_info.api_base_url, "connect")?;
        let response = self
            .client
            .post(url)
            .bearer_auth(auth.access_token.expose())
            .form(&[("profile_id", profile.profile_id.as_str())])
            .send()
            .await
            .map_err(classify_reqwest_error)?;
        let response = check_status(response)?;

        let headers = response.headers();
        let header_date = |name: HeaderName| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_http_date)
        };
        let valid_from = header_date(DATE).unwrap_or_else(Utc::now);
        let expires_at = header_date(EXPIRES).ok_or_else(|| ConnectionError::MalformedRemoteResponse {
            reason: "Tunnel configuration lacks a valid Expires header".to_string(),
        })?;
        let certificate_validity_range = CertificateValidityRange::new(valid_from, expires_at)
            .ok_or_else(|| ConnectionError::MalformedRemoteResponse {
                reason: format!(
                    "Tunnel configuration expires ({}) before it is valid ({})",
                    expires_at, valid_from
                ),
            })?;

        let blob = response.text().await.map_err(classify_reqwest_error)?;
        if blob.trim().is_empty() {
            return Err(ConnectionError::MalformedRemoteResponse {
                reason: "Tunnel configuration is empty".to_string(),
            });
        }

        info!(expires_at = %certificate_validity_range.expires_at(), "Fetched tunnel configuration");
        Ok(TunnelConfiguration {
            tunnel_blob: TunnelBlob::new(blob),
            certificate_validity_range,
        })
    }
}
