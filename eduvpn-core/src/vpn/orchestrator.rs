//! Connection lifecycle orchestration
//!
//! [`ConnectionOrchestrator`] owns one connection screen: it sequences
//! authorization, profile and configuration fetches, tunnel activation and
//! deactivation, the certificate expiry monitor and the diagnostics poller, and
//! pushes the derived UI state to its subscribers.
//!
//! All mutable state lives behind one mutex that is never held across an
//! `.await`. Tunnel status events are consumed by a dedicated task and applied
//! in delivery order, interleaved with command completions. The final state
//! after an enable or disable request is always read back from the tunnel's
//! live enabled flag rather than from the request's own result.

use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::auth::{AuthorizationCoordinator, AuthorizationEndpoints};
use crate::error::{precondition_violated, CancelReason, ConnectionError};
use crate::remote::RemoteConfigFetcher;
use crate::store::ConnectionAttemptStore;
use crate::tunnel::{
    DataStore, FsDataStore, ObservedTunnelStatus, TunnelControl, TunnelControlError,
};
use crate::types::{
    AuthState, CertificateValidityRange, ConnectableTarget, ConnectionAttempt, Profile,
    RemoteServer, ServerDisplayInfo, ServerInfo, TunnelConfiguration,
};
use crate::vpn::certificate_expiry::{
    CertificateExpiryMonitor, CertificateStatus, DEFAULT_RECHECK_INTERVAL,
};
use crate::vpn::diagnostics::{
    ConnectionDiagnosticsPoller, DiagnosticsSnapshot, DEFAULT_POLL_INTERVAL,
};
use crate::vpn::events::OrchestratorEvent;
use crate::vpn::state::{DerivationInput, Header, OrchestratorState, UiSnapshot};

/// Timer settings of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTiming {
    pub diagnostics_poll_interval: Duration,
    pub certificate_recheck_interval: Duration,
}

impl Default for SessionTiming {
    fn default() -> Self {
        Self {
            diagnostics_poll_interval: DEFAULT_POLL_INTERVAL,
            certificate_recheck_interval: DEFAULT_RECHECK_INTERVAL,
        }
    }
}

/// Collaborators of one orchestrator
pub struct OrchestratorDeps {
    pub target: ConnectableTarget,
    pub display_info: ServerDisplayInfo,
    pub tunnel: Arc<dyn TunnelControl>,
    pub fetcher: Arc<dyn RemoteConfigFetcher>,
    pub authorization: Arc<AuthorizationCoordinator>,
    /// Storage of a static configuration; defaults to an [`FsDataStore`] at the
    /// target's storage path
    pub data_store: Option<Arc<dyn DataStore>>,
    pub attempt_store: Arc<dyn ConnectionAttemptStore>,
    pub timing: SessionTiming,
}

/// How a connection command ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowOutcome {
    /// Activation was requested; `enabled` is the tunnel's live flag afterwards
    Activated { enabled: bool },
    /// The user has to pick one of these with `continue_with_profile`
    ProfileSelectionRequired(Vec<Profile>),
    /// The static configuration has no stored tunnel configuration
    NoConfiguration,
}

#[derive(Default)]
struct Core {
    state: OrchestratorState,
    observed: ObservedTunnelStatus,
    profiles: Option<Vec<Profile>>,
    connecting_profile: Option<Profile>,
    server_info: Option<ServerInfo>,
    auth_state: Option<AuthState>,
    attempt: Option<ConnectionAttempt>,
    certificate_status: Option<CertificateStatus>,
    monitor: Option<CertificateExpiryMonitor>,
    poller: Option<ConnectionDiagnosticsPoller>,
    diagnostics_snapshot: Option<DiagnosticsSnapshot>,
    /// Bumped whenever a certificate monitor is created
    session_generation: u64,
    /// Bumped whenever a diagnostics poller is created
    diagnostics_generation: u64,
    cancel_requested: bool,
    last_snapshot: Option<UiSnapshot>,
    last_can_go_back: Option<bool>,
    subscribers: Vec<mpsc::UnboundedSender<OrchestratorEvent>>,
}

impl Core {
    fn emit(&mut self, event: OrchestratorEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    fn knows_profile(&self, profile: &Profile) -> Option<Profile> {
        self.profiles
            .as_ref()?
            .iter()
            .find(|p| p.profile_id == profile.profile_id)
            .cloned()
    }
}

struct Inner {
    target: ConnectableTarget,
    display_info: ServerDisplayInfo,
    header: Header,
    tunnel: Arc<dyn TunnelControl>,
    fetcher: Arc<dyn RemoteConfigFetcher>,
    authorization: Arc<AuthorizationCoordinator>,
    data_store: Option<Arc<dyn DataStore>>,
    attempt_store: Arc<dyn ConnectionAttemptStore>,
    timing: SessionTiming,
    cancel_signal: Notify,
    core: Mutex<Core>,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, Core> {
        // A precondition panic may poison the lock; the state it guards is still consistent
        self.core.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn derive(&self, core: &Core) -> UiSnapshot {
        UiSnapshot::derive(&DerivationInput {
            state: core.state,
            observed: core.observed,
            is_remote_server: self.target.is_remote_server(),
            profiles: core.profiles.as_deref(),
            certificate_status: core.certificate_status.as_ref(),
            diagnostics_active: core.poller.is_some(),
            diagnostics_snapshot: core.diagnostics_snapshot.as_ref(),
            tunnel_enabled: self.tunnel.is_enabled(),
        })
    }

    /// Recompute the UI state and emit whatever changed
    fn publish(&self, core: &mut Core) {
        let next = self.derive(core);
        let previous = core.last_snapshot.replace(next.clone());

        let prev = previous.as_ref();
        let mut events = Vec::new();
        if prev.map(|p| p.status) != Some(next.status) {
            events.push(OrchestratorEvent::StatusChanged(next.status));
        }
        if prev.map(|p| &p.status_detail) != Some(&next.status_detail) {
            events.push(OrchestratorEvent::StatusDetailChanged(next.status_detail.clone()));
        }
        if prev.map(|p| p.vpn_switch) != Some(next.vpn_switch) {
            events.push(OrchestratorEvent::VpnSwitchStateChanged(next.vpn_switch));
        }
        if prev.map(|p| &p.additional_control) != Some(&next.additional_control) {
            events.push(OrchestratorEvent::AdditionalControlChanged(
                next.additional_control.clone(),
            ));
        }
        if prev.map(|p| &p.diagnostics) != Some(&next.diagnostics) {
            events.push(OrchestratorEvent::DiagnosticsStateChanged(next.diagnostics.clone()));
        }

        let can_go_back = core.state == OrchestratorState::Idle;
        if core.last_can_go_back != Some(can_go_back) {
            core.last_can_go_back = Some(can_go_back);
            events.push(OrchestratorEvent::CanGoBackChanged(can_go_back));
        }

        for event in events {
            core.emit(event);
        }
    }

    fn check_ready(&self, core: &Core, command: &str) {
        if !self.tunnel.is_initialized() {
            precondition_violated(&format!("{}: tunnel control is not initialized", command));
        }
        if core.state.is_busy() {
            precondition_violated(&format!(
                "{}: another command is in flight ({})",
                command, core.state
            ));
        }
    }

    fn require_tunnel_disabled(&self, command: &str) {
        if self.tunnel.is_enabled() {
            precondition_violated(&format!("{}: tunnel is already enabled", command));
        }
    }

    fn remote_server(&self, command: &str) -> RemoteServer {
        match &self.target {
            ConnectableTarget::RemoteServer(server) => server.clone(),
            ConnectableTarget::StaticConfig(_) => {
                precondition_violated(&format!("{}: target is not a remote server", command))
            }
        }
    }

    /// Start a certificate monitor for a new session generation
    fn start_certificate_monitor(
        self: &Arc<Self>,
        core: &mut Core,
        validity: CertificateValidityRange,
    ) {
        core.session_generation += 1;
        let generation = core.session_generation;
        let weak = Arc::downgrade(self);

        core.certificate_status = None;
        core.monitor = Some(CertificateExpiryMonitor::start(
            validity,
            self.timing.certificate_recheck_interval,
            move |status| {
                if let Some(inner) = weak.upgrade() {
                    inner.apply_certificate_status(generation, status);
                }
            },
        ));
    }

    fn apply_certificate_status(&self, generation: u64, status: CertificateStatus) {
        let mut core = self.lock();
        if core.session_generation != generation || core.monitor.is_none() {
            debug!(generation, "Ignoring certificate status of a retired session");
            return;
        }
        core.certificate_status = Some(status);
        self.publish(&mut core);
    }

    fn apply_diagnostics(&self, generation: u64, snapshot: DiagnosticsSnapshot) {
        let mut core = self.lock();
        if core.diagnostics_generation != generation || core.poller.is_none() {
            debug!(generation, "Ignoring diagnostics of a stopped poller");
            return;
        }
        core.diagnostics_snapshot = Some(snapshot);
        self.publish(&mut core);
    }

    fn apply_observed_status(&self, status: ObservedTunnelStatus) {
        let mut core = self.lock();
        debug!(%status, state = %core.state, "Tunnel status changed");
        core.observed = status;

        match status {
            ObservedTunnelStatus::Connected => {
                if let Some(poller) = &core.poller {
                    poller.refresh_now();
                }
            }
            ObservedTunnelStatus::Disconnected => {
                core.poller = None;
                core.diagnostics_snapshot = None;
            }
            _ => {}
        }

        if core.state == OrchestratorState::Enabled && status.is_down() && !self.tunnel.is_enabled()
        {
            info!("Tunnel was disabled outside the client, ending session");
            self.end_session(&mut core);
            core.state = OrchestratorState::Idle;
        }

        self.publish(&mut core);
    }

    /// Forget everything tied to the running session
    fn end_session(&self, core: &mut Core) {
        core.monitor = None;
        core.certificate_status = None;
        core.poller = None;
        core.diagnostics_snapshot = None;
        core.connecting_profile = None;
        if let Some(attempt) = core.attempt.take() {
            match self.attempt_store.clear() {
                Ok(()) => debug!(attempt_id = %attempt.attempt_id, "Cleared connection attempt"),
                Err(e) => warn!(error = %e, "Failed to clear connection attempt"),
            }
        }
    }

    /// Return to idle after a failure that happened before anything was persisted
    fn fail(&self, error: ConnectionError) -> ConnectionError {
        let mut core = self.lock();
        if error == ConnectionError::AuthorizationExpired {
            debug!("Discarding expired authorization");
            core.auth_state = None;
        }
        core.state = OrchestratorState::Idle;
        self.publish(&mut core);

        if error.is_user_cancelled() {
            info!(error = %error, "Connection flow cancelled");
        } else {
            warn!(error = %error, "Connection flow failed");
        }
        error
    }

    /// Settle the state after an enable request from the live enabled flag
    fn finish_activation(
        &self,
        result: Result<(), TunnelControlError>,
    ) -> Result<FlowOutcome, ConnectionError> {
        let enabled = self.tunnel.is_enabled();
        let mut core = self.lock();

        if enabled {
            if let Err(e) = &result {
                warn!(error = %e, "Tunnel reported an activation error but is enabled");
            }
            core.state = OrchestratorState::Enabled;
            self.publish(&mut core);
            info!("Tunnel enabled");
            return Ok(FlowOutcome::Activated { enabled: true });
        }

        self.end_session(&mut core);
        core.state = OrchestratorState::Idle;
        self.publish(&mut core);

        match result {
            Ok(()) => {
                warn!("Tunnel is not enabled after activation");
                Ok(FlowOutcome::Activated { enabled: false })
            }
            Err(e) => {
                warn!(error = %e, "Tunnel activation failed");
                Err(ConnectionError::TunnelActivationFailed {
                    reason: e.to_string(),
                })
            }
        }
    }
}

async fn run_status_listener(
    inner: Weak<Inner>,
    mut statuses: mpsc::UnboundedReceiver<ObservedTunnelStatus>,
) {
    while let Some(status) = statuses.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        inner.apply_observed_status(status);
    }
    debug!("Tunnel status listener stopped");
}

/// Drives the connection lifecycle of one target
///
/// Must be created inside a tokio runtime. Commands that overlap an in-flight
/// command, or that violate their preconditions, panic.
pub struct ConnectionOrchestrator {
    inner: Arc<Inner>,
    status_task: JoinHandle<()>,
}

impl ConnectionOrchestrator {
    /// Bind an orchestrator to `deps.target`
    ///
    /// With `restoring` set the orchestrator starts out enabled, with the
    /// attempt's profiles, connecting profile and certificate window, without
    /// contacting the server.
    ///
    /// # Panics
    /// If `restoring` belongs to a different target.
    pub fn new(deps: OrchestratorDeps, restoring: Option<ConnectionAttempt>) -> Self {
        if let Some(attempt) = &restoring {
            if attempt.target != deps.target {
                precondition_violated("restoring attempt belongs to a different target");
            }
        }

        let data_store = deps.data_store.or_else(|| match &deps.target {
            ConnectableTarget::StaticConfig(config) => {
                Some(Arc::new(FsDataStore::new(config.storage_path.clone())) as Arc<dyn DataStore>)
            }
            ConnectableTarget::RemoteServer(_) => None,
        });

        // Subscribe before sampling the status so nothing falls in between
        let statuses = deps.tunnel.subscribe();
        let core = Core {
            observed: deps.tunnel.current_status(),
            ..Core::default()
        };

        let inner = Arc::new(Inner {
            header: Header::from(&deps.display_info),
            target: deps.target,
            display_info: deps.display_info,
            tunnel: deps.tunnel,
            fetcher: deps.fetcher,
            authorization: deps.authorization,
            data_store,
            attempt_store: deps.attempt_store,
            timing: deps.timing,
            cancel_signal: Notify::new(),
            core: Mutex::new(core),
        });

        {
            let mut core = inner.lock();
            if let Some(attempt) = restoring {
                info!(attempt_id = %attempt.attempt_id, target = %attempt.target, "Restoring connection attempt");
                if inner.target.is_remote_server() {
                    core.profiles = Some(attempt.profiles.clone());
                }
                core.connecting_profile = attempt.selected_profile().cloned();
                if let Some(validity) = attempt.certificate_validity_range {
                    Inner::start_certificate_monitor(&inner, &mut core, validity);
                }
                core.attempt = Some(attempt);
                core.state = OrchestratorState::Enabled;
            }
            inner.publish(&mut core);
        }

        let status_task = tokio::spawn(run_status_listener(Arc::downgrade(&inner), statuses));
        Self { inner, status_task }
    }

    /// Bind to `deps.target`, resuming the persisted attempt when it still applies
    ///
    /// The record is used only when it is for this target, the tunnel is
    /// enabled, and the tunnel's own attempt id (when it knows one) matches.
    /// A record for this target that fails those checks is cleared. Before the
    /// tunnel backend is initialized nothing can be checked, so the record is
    /// left as it is and the orchestrator starts idle.
    pub fn restore(deps: OrchestratorDeps) -> Self {
        if !deps.tunnel.is_initialized() {
            warn!("Tunnel backend not initialized, keeping the connection attempt for a later restore");
            return Self::new(deps, None);
        }
        let restoring = match deps.attempt_store.load_most_recent() {
            Ok(Some(attempt)) if attempt.target == deps.target => {
                let tunnel_matches = deps.tunnel.is_enabled()
                    && deps
                        .tunnel
                        .current_attempt_id()
                        .map_or(true, |id| id == attempt.attempt_id);
                if tunnel_matches {
                    Some(attempt)
                } else {
                    info!(attempt_id = %attempt.attempt_id, "Discarding stale connection attempt");
                    if let Err(e) = deps.attempt_store.clear() {
                        warn!(error = %e, "Failed to clear stale connection attempt");
                    }
                    None
                }
            }
            Ok(_) => None,
            Err(e) => {
                warn!(error = %e, "Discarding unreadable connection attempt");
                if let Err(e) = deps.attempt_store.clear() {
                    warn!(error = %e, "Failed to clear unreadable connection attempt");
                }
                None
            }
        };
        Self::new(deps, restoring)
    }

    /// Authorize with the server and fetch its profiles
    ///
    /// With exactly one profile and `continue_if_single_profile` set the flow
    /// goes straight on to configure and enable the tunnel.
    ///
    /// # Panics
    /// If the target is not a remote server, the tunnel is enabled or another
    /// command is in flight.
    #[tracing::instrument(skip(self), fields(target = %self.inner.target))]
    pub async fn begin_authorized_connection(
        &self,
        continue_if_single_profile: bool,
    ) -> Result<FlowOutcome, ConnectionError> {
        const COMMAND: &str = "begin_authorized_connection";
        let server = self.inner.remote_server(COMMAND);
        {
            let mut core = self.inner.lock();
            self.inner.check_ready(&core, COMMAND);
            self.inner.require_tunnel_disabled(COMMAND);
            core.state = OrchestratorState::FetchingProfiles;
            core.cancel_requested = false;
            self.inner.publish(&mut core);
        }

        let profiles = match self.fetch_profiles(&server).await {
            Ok(profiles) => profiles,
            Err(e) => return Err(self.inner.fail(e)),
        };

        let auto_selected = {
            let mut core = self.inner.lock();
            core.profiles = Some(profiles.clone());
            core.emit(OrchestratorEvent::ProfilesFound(profiles.clone()));

            let auto_selected = match (profiles.as_slice(), continue_if_single_profile) {
                ([profile], true) => Some(profile.clone()),
                _ => None,
            };
            match &auto_selected {
                Some(profile) => {
                    info!(profile_id = %profile.profile_id, "Selecting the only profile");
                    core.emit(OrchestratorEvent::WillAutomaticallySelectProfile {
                        profile_id: profile.profile_id.clone(),
                    });
                    core.state = OrchestratorState::ConfiguringTunnel;
                }
                None => core.state = OrchestratorState::Idle,
            }
            self.inner.publish(&mut core);
            auto_selected
        };

        match auto_selected {
            Some(profile) => self.configure_and_enable(&server, profile).await,
            None => Ok(FlowOutcome::ProfileSelectionRequired(profiles)),
        }
    }

    /// Fetch a configuration for `profile` and enable the tunnel with it
    ///
    /// Reuses the authorization of the preceding flow when it is still valid.
    ///
    /// # Panics
    /// If the target is not a remote server, the tunnel is enabled, another
    /// command is in flight, or `profile` is not among the fetched profiles.
    #[tracing::instrument(skip(self, profile), fields(target = %self.inner.target, profile_id = %profile.profile_id))]
    pub async fn continue_with_profile(
        &self,
        profile: &Profile,
    ) -> Result<FlowOutcome, ConnectionError> {
        const COMMAND: &str = "continue_with_profile";
        let server = self.inner.remote_server(COMMAND);
        let profile = {
            let mut core = self.inner.lock();
            self.inner.check_ready(&core, COMMAND);
            self.inner.require_tunnel_disabled(COMMAND);
            let Some(known) = core.knows_profile(profile) else {
                drop(core);
                precondition_violated(&format!(
                    "{}: profile {} was not offered by the server",
                    COMMAND, profile.profile_id
                ));
            };
            core.state = OrchestratorState::ConfiguringTunnel;
            core.cancel_requested = false;
            self.inner.publish(&mut core);
            known
        };

        self.configure_and_enable(&server, profile).await
    }

    /// Enable the tunnel from the stored static configuration
    ///
    /// A missing configuration is not an error and changes nothing.
    ///
    /// # Panics
    /// If the target is not a static configuration, the tunnel is enabled or
    /// another command is in flight.
    #[tracing::instrument(skip(self), fields(target = %self.inner.target))]
    pub async fn begin_static_connection(&self) -> Result<FlowOutcome, ConnectionError> {
        const COMMAND: &str = "begin_static_connection";
        let (blob, attempt) = {
            if !self.inner.target.is_static_config() {
                precondition_violated(&format!("{}: target is not a static configuration", COMMAND));
            }
            let Some(data_store) = self.inner.data_store.clone() else {
                precondition_violated(&format!("{}: no data store for the configuration", COMMAND));
            };
            let mut core = self.inner.lock();
            self.inner.check_ready(&core, COMMAND);
            self.inner.require_tunnel_disabled(COMMAND);

            let blob = data_store.read_static_tunnel_blob().map_err(|e| {
                ConnectionError::TunnelActivationFailed {
                    reason: format!("Failed to read tunnel configuration: {}", e),
                }
            })?;
            let Some(blob) = blob else {
                info!("No stored tunnel configuration");
                return Ok(FlowOutcome::NoConfiguration);
            };

            let attempt = ConnectionAttempt::for_static_config(self.inner.target.clone());
            self.inner.attempt_store.save(&attempt)?;

            core.attempt = Some(attempt.clone());
            core.state = OrchestratorState::EnableRequested;
            core.emit(OrchestratorEvent::WillAttemptToConnect(attempt.clone()));
            self.inner.publish(&mut core);
            (blob, attempt)
        };

        let result = self.inner.tunnel.enable(&blob, attempt.attempt_id).await;
        self.inner.finish_activation(result)
    }

    /// Disable the tunnel; a no-op when it is not enabled
    ///
    /// # Panics
    /// If another command is in flight.
    #[tracing::instrument(skip(self), fields(target = %self.inner.target))]
    pub async fn disable_connection(&self) -> Result<(), ConnectionError> {
        const COMMAND: &str = "disable_connection";
        {
            let mut core = self.inner.lock();
            if !self.inner.tunnel.is_initialized() {
                drop(core);
                precondition_violated(&format!("{}: tunnel control is not initialized", COMMAND));
            }
            if !self.inner.tunnel.is_enabled() {
                debug!("Tunnel not enabled, nothing to disable");
                return Ok(());
            }
            self.inner.check_ready(&core, COMMAND);
            core.state = OrchestratorState::DisableRequested;
            self.inner.publish(&mut core);
        }

        let result = self.inner.tunnel.disable().await;
        let enabled = self.inner.tunnel.is_enabled();
        let mut core = self.inner.lock();

        if enabled {
            core.state = OrchestratorState::Enabled;
            self.inner.publish(&mut core);
            return match result {
                Ok(()) => {
                    warn!("Tunnel still enabled after deactivation");
                    Ok(())
                }
                Err(e) => Err(ConnectionError::TunnelDeactivationFailed {
                    reason: e.to_string(),
                }),
            };
        }

        if let Err(e) = &result {
            warn!(error = %e, "Tunnel reported a deactivation error but is disabled");
        }
        self.inner.end_session(&mut core);
        core.state = OrchestratorState::Idle;
        self.inner.publish(&mut core);
        info!("Tunnel disabled");
        Ok(())
    }

    /// Replace the running session with a freshly authorized one
    ///
    /// Disables the tunnel, drops the cached authorization and connects the
    /// same profile again.
    #[tracing::instrument(skip(self), fields(target = %self.inner.target))]
    pub async fn renew_session(&self) -> Result<FlowOutcome, ConnectionError> {
        self.inner.remote_server("renew_session");
        let profile = self.inner.lock().connecting_profile.clone();

        self.disable_connection().await?;
        if self.inner.tunnel.is_enabled() {
            return Err(ConnectionError::TunnelDeactivationFailed {
                reason: "tunnel is still enabled".to_string(),
            });
        }

        let known = {
            let mut core = self.inner.lock();
            core.auth_state = None;
            profile.and_then(|p| core.knows_profile(&p))
        };
        match known {
            Some(profile) => self.continue_with_profile(&profile).await,
            None => self.begin_authorized_connection(true).await,
        }
    }

    /// Cancel the authorization of the command in flight
    pub fn cancel_authorization(&self) {
        let mut core = self.inner.lock();
        if !matches!(
            core.state,
            OrchestratorState::FetchingProfiles | OrchestratorState::ConfiguringTunnel
        ) {
            debug!(state = %core.state, "No authorization to cancel");
            return;
        }
        core.cancel_requested = true;
        drop(core);
        self.inner.cancel_signal.notify_waiters();
        self.inner.authorization.cancel();
    }

    pub fn toggle_connection_diagnostics(&self) {
        let active = self.inner.lock().poller.is_some();
        if active {
            self.collapse_diagnostics();
        } else {
            self.expand_diagnostics();
        }
    }

    /// Start the diagnostics poller; a no-op unless the tunnel is up
    pub fn expand_diagnostics(&self) {
        let mut core = self.inner.lock();
        if core.poller.is_some() {
            return;
        }
        let status = core.observed;
        if !status.is_up() {
            debug!(%status, "Not expanding diagnostics while tunnel is down");
            return;
        }

        core.diagnostics_generation += 1;
        let generation = core.diagnostics_generation;
        let weak = Arc::downgrade(&self.inner);
        let profile_name = core.connecting_profile.as_ref().map(|p| p.display_name.clone());

        core.poller = Some(ConnectionDiagnosticsPoller::start(
            self.inner.tunnel.clone(),
            profile_name,
            self.inner.timing.diagnostics_poll_interval,
            move |snapshot| {
                if let Some(inner) = weak.upgrade() {
                    inner.apply_diagnostics(generation, snapshot);
                }
            },
        ));
        self.inner.publish(&mut core);
    }

    /// Stop the diagnostics poller and forget its last reading
    pub fn collapse_diagnostics(&self) {
        let mut core = self.inner.lock();
        core.poller = None;
        core.diagnostics_snapshot = None;
        self.inner.publish(&mut core);
    }

    /// Receive every subsequent event, starting with the current values
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<OrchestratorEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut core = self.inner.lock();
        let snapshot = self.inner.derive(&core);

        let initial = [
            OrchestratorEvent::HeaderChanged(self.inner.header.clone()),
            OrchestratorEvent::StatusChanged(snapshot.status),
            OrchestratorEvent::StatusDetailChanged(snapshot.status_detail),
            OrchestratorEvent::VpnSwitchStateChanged(snapshot.vpn_switch),
            OrchestratorEvent::AdditionalControlChanged(snapshot.additional_control),
            OrchestratorEvent::DiagnosticsStateChanged(snapshot.diagnostics),
        ];
        for event in initial {
            let _ = tx.send(event);
        }
        if let Some(profiles) = &core.profiles {
            let _ = tx.send(OrchestratorEvent::ProfilesFound(profiles.clone()));
        }
        let _ = tx.send(OrchestratorEvent::CanGoBackChanged(
            core.state == OrchestratorState::Idle,
        ));

        core.subscribers.push(tx);
        rx
    }

    /// Current derived UI state
    pub fn snapshot(&self) -> UiSnapshot {
        let core = self.inner.lock();
        self.inner.derive(&core)
    }

    pub fn state(&self) -> OrchestratorState {
        self.inner.lock().state
    }

    pub fn observed_status(&self) -> ObservedTunnelStatus {
        self.inner.lock().observed
    }

    pub fn profiles(&self) -> Option<Vec<Profile>> {
        self.inner.lock().profiles.clone()
    }

    pub fn connecting_profile(&self) -> Option<Profile> {
        self.inner.lock().connecting_profile.clone()
    }

    pub fn certificate_status(&self) -> Option<CertificateStatus> {
        self.inner.lock().certificate_status
    }

    pub fn current_attempt(&self) -> Option<ConnectionAttempt> {
        self.inner.lock().attempt.clone()
    }

    pub fn diagnostics_snapshot(&self) -> Option<DiagnosticsSnapshot> {
        self.inner.lock().diagnostics_snapshot.clone()
    }

    /// Navigation away from the connection screen is allowed only while idle
    pub fn can_go_back(&self) -> bool {
        self.inner.lock().state == OrchestratorState::Idle
    }

    pub fn target(&self) -> &ConnectableTarget {
        &self.inner.target
    }

    pub fn header(&self) -> &Header {
        &self.inner.header
    }

    pub fn support_contact(&self) -> &[String] {
        &self.inner.display_info.support_contact
    }

    async fn fetch_profiles(&self, server: &RemoteServer) -> Result<Vec<Profile>, ConnectionError> {
        let info = self.inner.fetcher.fetch_server_info(server).await?;
        self.inner.lock().server_info = Some(info.clone());

        let auth = self.authorize(&info).await?;
        self.inner.fetcher.list_profiles(&info, &auth).await
    }

    async fn fetch_configuration(
        &self,
        server: &RemoteServer,
        profile: &Profile,
    ) -> Result<TunnelConfiguration, ConnectionError> {
        let cached = self.inner.lock().server_info.clone();
        let info = match cached {
            Some(info) => info,
            None => {
                let info = self.inner.fetcher.fetch_server_info(server).await?;
                self.inner.lock().server_info = Some(info.clone());
                info
            }
        };

        let auth = self.authorize(&info).await?;
        self.inner
            .fetcher
            .fetch_tunnel_configuration(&info, &auth, profile)
            .await
    }

    /// Cached authorization of this target, or a new one from the browser
    async fn authorize(&self, info: &ServerInfo) -> Result<AuthState, ConnectionError> {
        // Armed before the flag is read so no cancel slips in between
        let cancelled = self.inner.cancel_signal.notified();
        tokio::pin!(cancelled);
        cancelled.as_mut().enable();

        let cached = {
            let core = self.inner.lock();
            if core.cancel_requested {
                return Err(ConnectionError::UserCancelled {
                    reason: CancelReason::User,
                });
            }
            core.auth_state.clone().filter(|auth| !auth.is_expired())
        };
        if let Some(auth) = cached {
            debug!("Reusing cached authorization");
            return Ok(auth);
        }

        let wayf = self.inner.target.wayf_skipping_info();
        let endpoints = AuthorizationEndpoints::from(info);
        let flow = self
            .inner
            .authorization
            .start_authorization(&endpoints, wayf.as_ref());
        let auth = tokio::select! {
            biased;
            _ = &mut cancelled => {
                debug!("Authorization cancelled before the flow settled");
                return Err(ConnectionError::UserCancelled {
                    reason: CancelReason::User,
                });
            }
            result = flow => result?,
        };
        self.inner.lock().auth_state = Some(auth.clone());
        Ok(auth)
    }

    async fn configure_and_enable(
        &self,
        server: &RemoteServer,
        profile: Profile,
    ) -> Result<FlowOutcome, ConnectionError> {
        let config = match self.fetch_configuration(server, &profile).await {
            Ok(config) => config,
            Err(e) => return Err(self.inner.fail(e)),
        };
        let validity = config.certificate_validity_range;

        let attempt = {
            let profiles = self.inner.lock().profiles.clone().unwrap_or_default();
            ConnectionAttempt::for_server(
                self.inner.target.clone(),
                profiles,
                profile.profile_id.clone(),
                validity,
            )
            .and_then(|attempt| {
                self.inner.attempt_store.save(&attempt)?;
                Ok(attempt)
            })
        };
        let attempt = match attempt {
            Ok(attempt) => attempt,
            Err(e) => return Err(self.inner.fail(e.into())),
        };

        {
            let mut core = self.inner.lock();
            core.connecting_profile = Some(profile);
            core.attempt = Some(attempt.clone());
            Inner::start_certificate_monitor(&self.inner, &mut core, validity);
            core.state = OrchestratorState::EnableRequested;
            core.emit(OrchestratorEvent::WillAttemptToConnect(attempt.clone()));
            self.inner.publish(&mut core);
        }

        info!(attempt_id = %attempt.attempt_id, expires_at = %validity.expires_at(), "Requesting tunnel activation");
        let result = self.inner.tunnel.enable(&config.tunnel_blob, attempt.attempt_id).await;
        self.inner.finish_activation(result)
    }
}

impl Drop for ConnectionOrchestrator {
    fn drop(&mut self) {
        self.status_task.abort();
    }
}
