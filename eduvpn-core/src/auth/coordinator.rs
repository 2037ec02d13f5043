//! OAuth authorization-code flow in an external user agent
//!
//! One flow at a time: the coordinator opens the browser, waits for the
//! redirect on its [`AuthorizationTransport`] and exchanges the code for an
//! [`AuthState`]. Cancellation, a timeout and the future being dropped all end
//! the flow and release the redirect listener.

use chrono::Utc;
use reqwest::Client;
use serde::Deserialize;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use url::Url;

use super::pkce::{random_token, PkceChallenge};
use super::transport::AuthorizationTransport;
use super::user_agent::UserAgent;
use super::wayf::apply_wayf_skip;
use crate::error::{precondition_violated, CancelReason, ConnectionError};
use crate::remote::{classify_reqwest_error, DEFAULT_REQUEST_TIMEOUT};
use crate::types::{AccessToken, AuthState, RefreshToken, ServerInfo, WayfSkippingInfo};

/// Default OAuth client id of the desktop client
pub const DEFAULT_CLIENT_ID: &str = "org.eduvpn.app.linux";

/// Default OAuth scope
pub const DEFAULT_SCOPE: &str = "config";

/// OAuth client registration used for every flow
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthClientConfig {
    pub client_id: String,
    pub scope: String,
    /// How long to wait for the browser to come back; `None` waits forever
    pub timeout: Option<Duration>,
}

impl Default for OAuthClientConfig {
    fn default() -> Self {
        Self {
            client_id: DEFAULT_CLIENT_ID.to_string(),
            scope: DEFAULT_SCOPE.to_string(),
            timeout: Some(Duration::from_secs(300)),
        }
    }
}

/// Where to send the user and where to redeem the code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationEndpoints {
    pub authorization_endpoint: Url,
    pub token_endpoint: Url,
}

impl From<&ServerInfo> for AuthorizationEndpoints {
    fn from(info: &ServerInfo) -> Self {
        Self {
            authorization_endpoint: info.authorization_endpoint.clone(),
            token_endpoint: info.token_endpoint.clone(),
        }
    }
}

/// Lifecycle of the most recent flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthorizationFlowState {
    #[default]
    Idle,
    AwaitingRedirect,
    Resolved,
    Cancelled,
}

#[derive(Debug, Default)]
struct FlowSlot {
    state: AuthorizationFlowState,
    flow_id: u64,
    cancel: Option<oneshot::Sender<CancelReason>>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    token_type: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// Drives authorization flows; safe to share between tasks
pub struct AuthorizationCoordinator {
    config: OAuthClientConfig,
    transport: Arc<dyn AuthorizationTransport>,
    user_agent: Arc<dyn UserAgent>,
    http: Client,
    slot: Mutex<FlowSlot>,
}

impl std::fmt::Debug for AuthorizationCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthorizationCoordinator")
            .field("config", &self.config)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

/// Resets the flow slot when a flow ends, including when its future is dropped
struct FlowGuard<'a> {
    slot: &'a Mutex<FlowSlot>,
    flow_id: u64,
    outcome: AuthorizationFlowState,
}

impl Drop for FlowGuard<'_> {
    fn drop(&mut self) {
        let mut slot = lock(self.slot);
        if slot.flow_id == self.flow_id && slot.state == AuthorizationFlowState::AwaitingRedirect {
            slot.state = self.outcome;
            slot.cancel = None;
        }
    }
}

fn lock(slot: &Mutex<FlowSlot>) -> MutexGuard<'_, FlowSlot> {
    // A panic while holding the lock cannot leave FlowSlot half-written
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl AuthorizationCoordinator {
    pub fn new(
        config: OAuthClientConfig,
        transport: Arc<dyn AuthorizationTransport>,
        user_agent: Arc<dyn UserAgent>,
    ) -> Result<Self, ConnectionError> {
        let http = Client::builder()
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .use_rustls_tls()
            .build()
            .map_err(|e| ConnectionError::NetworkUnavailable {
                reason: format!("Failed to create HTTP client: {}", e),
            })?;
        Ok(Self {
            config,
            transport,
            user_agent,
            http,
            slot: Mutex::new(FlowSlot::default()),
        })
    }

    pub fn config(&self) -> &OAuthClientConfig {
        &self.config
    }

    pub fn state(&self) -> AuthorizationFlowState {
        lock(&self.slot).state
    }

    /// Run one authorization flow to completion
    ///
    /// # Panics
    /// If another flow is still awaiting its redirect.
    #[tracing::instrument(skip_all, fields(authorization_endpoint = %endpoints.authorization_endpoint))]
    pub async fn start_authorization(
        &self,
        endpoints: &AuthorizationEndpoints,
        wayf: Option<&WayfSkippingInfo>,
    ) -> Result<AuthState, ConnectionError> {
        let (cancel_tx, mut cancel_rx) = oneshot::channel();
        let flow_id = {
            let mut slot = lock(&self.slot);
            if slot.state == AuthorizationFlowState::AwaitingRedirect {
                drop(slot);
                precondition_violated("an authorization flow is already awaiting its redirect");
            }
            slot.flow_id += 1;
            slot.state = AuthorizationFlowState::AwaitingRedirect;
            slot.cancel = Some(cancel_tx);
            slot.flow_id
        };
        let mut guard = FlowGuard {
            slot: &self.slot,
            flow_id,
            outcome: AuthorizationFlowState::Cancelled,
        };

        let timeout: Pin<Box<dyn Future<Output = ()> + Send>> = match self.config.timeout {
            Some(limit) => Box::pin(tokio::time::sleep(limit)),
            None => Box::pin(std::future::pending()),
        };

        let result = tokio::select! {
            result = self.run_flow(endpoints, wayf) => result,
            reason = &mut cancel_rx => Err(ConnectionError::UserCancelled {
                reason: reason.unwrap_or(CancelReason::Superseded),
            }),
            _ = timeout => {
                warn!("Authorization timed out");
                Err(ConnectionError::UserCancelled { reason: CancelReason::TimedOut })
            }
        };

        guard.outcome = match &result {
            Ok(_) => AuthorizationFlowState::Resolved,
            Err(e) if e.is_user_cancelled() => AuthorizationFlowState::Cancelled,
            Err(_) => AuthorizationFlowState::Idle,
        };
        match &result {
            Ok(_) => info!(flow_id, "Authorization completed"),
            Err(e) => info!(flow_id, error = %e, "Authorization ended without a result"),
        }
        result
    }

    /// Cancel the flow in progress, if any
    pub fn cancel(&self) {
        self.cancel_with_reason(CancelReason::User);
    }

    /// Cancel the flow in progress with an explicit reason
    ///
    /// Idempotent; the coordinator always ends up `Cancelled`.
    pub fn cancel_with_reason(&self, reason: CancelReason) {
        let mut slot = lock(&self.slot);
        if let Some(tx) = slot.cancel.take() {
            debug!(flow_id = slot.flow_id, %reason, "Cancelling authorization");
            let _ = tx.send(reason);
        }
        slot.state = AuthorizationFlowState::Cancelled;
    }

    async fn run_flow(
        &self,
        endpoints: &AuthorizationEndpoints,
        wayf: Option<&WayfSkippingInfo>,
    ) -> Result<AuthState, ConnectionError> {
        let mut listener = self.transport.listen().await?;
        let redirect_uri = listener.redirect_uri().clone();

        let pkce = PkceChallenge::generate();
        let state = random_token(16);

        let mut authorization_url = endpoints.authorization_endpoint.clone();
        authorization_url
            .query_pairs_mut()
            .append_pair("client_id", &self.config.client_id)
            .append_pair("redirect_uri", redirect_uri.as_str())
            .append_pair("response_type", "code")
            .append_pair("scope", &self.config.scope)
            .append_pair("state", &state)
            .append_pair("code_challenge_method", PkceChallenge::METHOD)
            .append_pair("code_challenge", &pkce.code_challenge);

        let browser_url = match wayf {
            Some(info) => {
                debug!(org_id = %info.org_id, "Skipping WAYF");
                apply_wayf_skip(info, &authorization_url)?
            }
            None => authorization_url,
        };

        self.user_agent.open(&browser_url)?;
        let callback = listener.wait_for_redirect().await?;
        drop(listener);

        let code = parse_callback(&callback, &state)?;
        self.exchange_code(endpoints, &code, &redirect_uri, &pkce).await
    }

    async fn exchange_code(
        &self,
        endpoints: &AuthorizationEndpoints,
        code: &str,
        redirect_uri: &Url,
        pkce: &PkceChallenge,
    ) -> Result<AuthState, ConnectionError> {
        let response = self
            .http
            .post(endpoints.token_endpoint.clone())
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", redirect_uri.as_str()),
                ("client_id", self.config.client_id.as_str()),
                ("code_verifier", pkce.code_verifier.as_str()),
            ])
            .send()
            .await
            .map_err(classify_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            let reason = match response.json::<TokenErrorResponse>().await {
                Ok(body) => match body.error_description {
                    Some(description) => format!("{}: {}", body.error, description),
                    None => body.error,
                },
                Err(_) => format!("Token endpoint returned {}", status),
            };
            return Err(ConnectionError::AuthorizationFailed { reason });
        }

        let token: TokenResponse = response.json().await.map_err(classify_reqwest_error)?;
        let expires_at = token
            .expires_in
            .map(|secs| {
                chrono::Duration::try_seconds(secs)
                    .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
                    .ok_or_else(|| ConnectionError::MalformedRemoteResponse {
                        reason: format!("Token endpoint returned an out-of-range expires_in of {}", secs),
                    })
            })
            .transpose()?;
        Ok(AuthState {
            access_token: AccessToken::new(token.access_token),
            refresh_token: token.refresh_token.map(RefreshToken::new),
            token_type: token.token_type,
            expires_at,
        })
    }
}

/// Validate the redirect and extract the authorization code
fn parse_callback(callback: &Url, expected_state: &str) -> Result<String, ConnectionError> {
    let mut code = None;
    let mut state = None;
    let mut error = None;
    for (key, value) in callback.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => error = Some(value.into_owned()),
            _ => {}
        }
    }

    if let Some(error) = error {
        if error == "access_denied" {
            return Err(ConnectionError::UserCancelled {
                reason: CancelReason::AccessDenied,
            });
        }
        return Err(ConnectionError::AuthorizationFailed {
            reason: format!("Server reported {}", error),
        });
    }
    if state.as_deref() != Some(expected_state) {
        return Err(ConnectionError::AuthorizationFailed {
            reason: "State mismatch in redirect".to_string(),
        });
    }
    code.filter(|c| !c.is_empty())
        .ok_or_else(|| ConnectionError::AuthorizationFailed {
            reason: "Redirect carries no authorization code".to_string(),
        })
}
