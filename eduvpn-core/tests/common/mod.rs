//! Shared test doubles for the orchestrator integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use eduvpn_core::auth::{
    AuthorizationCoordinator, ExternalRedirectTransport, OAuthClientConfig, UserAgent,
};
use eduvpn_core::error::ConnectionError;
use eduvpn_core::remote::RemoteConfigFetcher;
use eduvpn_core::store::ConnectionAttemptStore;
use eduvpn_core::tunnel::{ObservedTunnelStatus, TunnelControl, TunnelControlError, TunnelStats};
use eduvpn_core::types::{
    AuthState, CertificateValidityRange, ConnectableTarget, Profile, RemoteServer,
    ServerDisplayInfo, ServerInfo, TunnelBlob, TunnelConfiguration,
};
use eduvpn_core::vpn::{OrchestratorDeps, OrchestratorEvent, SessionTiming};
use serde_json::json;
use std::collections::VecDeque;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use url::Url;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const SERVER_URL: &str = "https://vpn.example.org/";
pub const REDIRECT_URL: &str = "org.eduvpn.app:/api/callback";

/// What the mock tunnel does when asked to enable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnableBehavior {
    /// Connects and reports success
    Connect,
    /// Reports Connected, then returns an error anyway
    ConnectThenError,
    /// Stays down and returns an error
    Fail,
}

/// In-memory stand-in for the OS tunnel
pub struct MockTunnel {
    initialized: AtomicBool,
    enabled: AtomicBool,
    status: Mutex<ObservedTunnelStatus>,
    attempt_id: Mutex<Option<Uuid>>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<ObservedTunnelStatus>>>,
    behavior: Mutex<EnableBehavior>,
    pub enable_calls: AtomicUsize,
    pub disable_calls: AtomicUsize,
    pub stats_calls: AtomicUsize,
}

impl MockTunnel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            initialized: AtomicBool::new(true),
            enabled: AtomicBool::new(false),
            status: Mutex::new(ObservedTunnelStatus::Disconnected),
            attempt_id: Mutex::new(None),
            subscribers: Mutex::new(Vec::new()),
            behavior: Mutex::new(EnableBehavior::Connect),
            enable_calls: AtomicUsize::new(0),
            disable_calls: AtomicUsize::new(0),
            stats_calls: AtomicUsize::new(0),
        })
    }

    /// Tunnel left running by a previous process
    pub fn already_enabled(attempt_id: Option<Uuid>) -> Arc<Self> {
        let tunnel = Self::new();
        tunnel.enabled.store(true, Ordering::SeqCst);
        *tunnel.status.lock().unwrap() = ObservedTunnelStatus::Connected;
        *tunnel.attempt_id.lock().unwrap() = attempt_id;
        tunnel
    }

    pub fn set_behavior(&self, behavior: EnableBehavior) {
        *self.behavior.lock().unwrap() = behavior;
    }

    pub fn set_initialized(&self, initialized: bool) {
        self.initialized.store(initialized, Ordering::SeqCst);
    }

    /// Simulate the OS reporting a status
    pub fn report(&self, status: ObservedTunnelStatus) {
        *self.status.lock().unwrap() = status;
        self.subscribers
            .lock()
            .unwrap()
            .retain(|tx| tx.send(status).is_ok());
    }

    /// Simulate the tunnel being torn down outside the client
    pub fn drop_externally(&self) {
        self.enabled.store(false, Ordering::SeqCst);
        self.report(ObservedTunnelStatus::Disconnected);
    }
}

#[async_trait]
impl TunnelControl for MockTunnel {
    fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    fn current_status(&self) -> ObservedTunnelStatus {
        *self.status.lock().unwrap()
    }

    fn current_attempt_id(&self) -> Option<Uuid> {
        *self.attempt_id.lock().unwrap()
    }

    async fn enable(&self, tunnel_blob: &TunnelBlob, attempt_id: Uuid) -> Result<(), TunnelControlError> {
        self.enable_calls.fetch_add(1, Ordering::SeqCst);
        assert!(!tunnel_blob.expose().is_empty());
        let behavior = *self.behavior.lock().unwrap();

        match behavior {
            EnableBehavior::Connect | EnableBehavior::ConnectThenError => {
                self.enabled.store(true, Ordering::SeqCst);
                *self.attempt_id.lock().unwrap() = Some(attempt_id);
                self.report(ObservedTunnelStatus::Connecting);
                self.report(ObservedTunnelStatus::Connected);
                // Let the status listener see Connected before we answer
                tokio::time::sleep(Duration::from_millis(20)).await;
                if behavior == EnableBehavior::ConnectThenError {
                    return Err(TunnelControlError::new("late error from the OS"));
                }
                Ok(())
            }
            EnableBehavior::Fail => {
                self.report(ObservedTunnelStatus::Disconnected);
                Err(TunnelControlError::new("permission denied"))
            }
        }
    }

    async fn disable(&self) -> Result<(), TunnelControlError> {
        self.disable_calls.fetch_add(1, Ordering::SeqCst);
        self.report(ObservedTunnelStatus::Disconnecting);
        self.enabled.store(false, Ordering::SeqCst);
        *self.attempt_id.lock().unwrap() = None;
        self.report(ObservedTunnelStatus::Disconnected);
        tokio::time::sleep(Duration::from_millis(20)).await;
        Ok(())
    }

    fn subscribe(&self) -> mpsc::UnboundedReceiver<ObservedTunnelStatus> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().unwrap().push(tx);
        rx
    }

    async fn connection_stats(&self) -> Result<TunnelStats, TunnelControlError> {
        let calls = self.stats_calls.fetch_add(1, Ordering::SeqCst) as u64 + 1;
        Ok(TunnelStats {
            bytes_in: calls * 1000,
            bytes_out: calls * 100,
            local_address: Some(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2))),
            remote_address: Some("vpn.example.org".to_string()),
            connected_secs: calls,
        })
    }
}

/// Scripted remote API
pub struct MockFetcher {
    server_info: ServerInfo,
    profiles: Mutex<Vec<Profile>>,
    validity: Mutex<CertificateValidityRange>,
    config_failures: Mutex<VecDeque<ConnectionError>>,
    pub server_info_calls: AtomicUsize,
    pub list_calls: AtomicUsize,
    pub config_calls: AtomicUsize,
}

impl MockFetcher {
    /// Fetcher whose OAuth endpoints live on `oauth_server`
    pub fn new(oauth_server: &MockServer, profiles: Vec<Profile>) -> Arc<Self> {
        let base = oauth_server.uri();
        Arc::new(Self {
            server_info: ServerInfo {
                authorization_endpoint: Url::parse(&format!("{}/oauth/authorize", base)).unwrap(),
                token_endpoint: Url::parse(&format!("{}/oauth/token", base)).unwrap(),
                api_base_url: Url::parse(&format!("{}/api/v2", base)).unwrap(),
            },
            profiles: Mutex::new(profiles),
            validity: Mutex::new(hours_window(8)),
            config_failures: Mutex::new(VecDeque::new()),
            server_info_calls: AtomicUsize::new(0),
            list_calls: AtomicUsize::new(0),
            config_calls: AtomicUsize::new(0),
        })
    }

    pub fn set_validity(&self, validity: CertificateValidityRange) {
        *self.validity.lock().unwrap() = validity;
    }

    /// Make the next configuration fetch fail with `error`
    pub fn fail_next_config(&self, error: ConnectionError) {
        self.config_failures.lock().unwrap().push_back(error);
    }

    pub fn network_calls(&self) -> usize {
        self.server_info_calls.load(Ordering::SeqCst)
            + self.list_calls.load(Ordering::SeqCst)
            + self.config_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteConfigFetcher for MockFetcher {
    async fn fetch_server_info(&self, _server: &RemoteServer) -> Result<ServerInfo, ConnectionError> {
        self.server_info_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.server_info.clone())
    }

    async fn list_profiles(
        &self,
        _server_info: &ServerInfo,
        auth: &AuthState,
    ) -> Result<Vec<Profile>, ConnectionError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        assert_eq!(auth.access_token.expose(), "access");
        Ok(self.profiles.lock().unwrap().clone())
    }

    async fn fetch_tunnel_configuration(
        &self,
        _server_info: &ServerInfo,
        _auth: &AuthState,
        profile: &Profile,
    ) -> Result<TunnelConfiguration, ConnectionError> {
        self.config_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.config_failures.lock().unwrap().pop_front() {
            return Err(error);
        }
        Ok(TunnelConfiguration {
            tunnel_blob: TunnelBlob::new(format!("# profile {}\nremote vpn.example.org\n", profile.profile_id)),
            certificate_validity_range: *self.validity.lock().unwrap(),
        })
    }
}

/// Browser stand-in that approves (or ignores) the authorization request
pub struct BrowserStub {
    transport: ExternalRedirectTransport,
    approve: bool,
    pub opened: AtomicUsize,
}

impl UserAgent for BrowserStub {
    fn open(&self, url: &Url) -> Result<(), ConnectionError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        if !self.approve {
            return Ok(());
        }
        let state = url
            .query_pairs()
            .find(|(k, _)| k == "state")
            .map(|(_, v)| v.into_owned())
            .unwrap_or_default();
        let callback =
            Url::parse(&format!("{}?code=the-code&state={}", REDIRECT_URL, state)).unwrap();
        assert!(self.transport.resume(callback));
        Ok(())
    }
}

/// Authorization coordinator wired to a browser stub
pub fn coordinator(approve: bool) -> (Arc<AuthorizationCoordinator>, Arc<BrowserStub>) {
    let transport = ExternalRedirectTransport::new(Url::parse(REDIRECT_URL).unwrap());
    let browser = Arc::new(BrowserStub {
        transport: transport.clone(),
        approve,
        opened: AtomicUsize::new(0),
    });
    let coordinator = AuthorizationCoordinator::new(
        OAuthClientConfig {
            timeout: Some(Duration::from_secs(10)),
            ..OAuthClientConfig::default()
        },
        Arc::new(transport),
        browser.clone(),
    )
    .unwrap();
    (Arc::new(coordinator), browser)
}

/// OAuth server answering every code exchange
pub async fn oauth_server() -> MockServer {
    let server = MockServer::start().await;
    mount_token_endpoint(&server, None).await;
    server
}

pub async fn mount_token_endpoint(server: &MockServer, expected_calls: Option<u64>) {
    let mock = Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "access",
            "token_type": "bearer",
            "expires_in": 3600
        })));
    let mock = match expected_calls {
        Some(n) => mock.expect(n),
        None => mock,
    };
    mock.mount(server).await;
}

pub fn profiles(n: usize) -> Vec<Profile> {
    (1..=n)
        .map(|i| Profile::new(format!("profile-{}", i), format!("Profile {}", i)))
        .collect()
}

pub fn hours_window(hours: i64) -> CertificateValidityRange {
    let now = Utc::now();
    CertificateValidityRange::new(now - ChronoDuration::minutes(1), now + ChronoDuration::hours(hours))
        .unwrap()
}

pub fn expired_window() -> CertificateValidityRange {
    let now = Utc::now();
    CertificateValidityRange::new(now - ChronoDuration::hours(9), now - ChronoDuration::hours(1))
        .unwrap()
}

pub fn remote_target() -> ConnectableTarget {
    ConnectableTarget::server(SERVER_URL)
}

pub fn display_info() -> ServerDisplayInfo {
    ServerDisplayInfo {
        server_name: "Example University".to_string(),
        flag_country_code: "NL".to_string(),
        support_contact: vec!["mailto:help@example.org".to_string()],
    }
}

pub fn fast_timing() -> SessionTiming {
    SessionTiming {
        diagnostics_poll_interval: Duration::from_millis(50),
        certificate_recheck_interval: Duration::from_millis(50),
    }
}

pub fn deps(
    target: ConnectableTarget,
    tunnel: Arc<MockTunnel>,
    fetcher: Arc<MockFetcher>,
    authorization: Arc<AuthorizationCoordinator>,
    store: Arc<dyn ConnectionAttemptStore>,
) -> OrchestratorDeps {
    OrchestratorDeps {
        target,
        display_info: display_info(),
        tunnel,
        fetcher,
        authorization,
        data_store: None,
        attempt_store: store,
        timing: fast_timing(),
    }
}

/// Everything currently queued on `rx`
pub fn drain(rx: &mut mpsc::UnboundedReceiver<OrchestratorEvent>) -> Vec<OrchestratorEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// Poll `condition` until it holds, failing the test after two seconds
pub async fn wait_until(what: &str, condition: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting until {}", what);
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
