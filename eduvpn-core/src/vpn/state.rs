//! Connection state machine and the UI state derived from it
//!
//! The orchestrator tracks what the user asked for (`OrchestratorState`); the
//! OS reports what the tunnel is doing (`ObservedTunnelStatus`). Everything
//! the connection screen shows is a pure function of both plus a few pieces
//! of session data, computed here.

use crate::tunnel::ObservedTunnelStatus;
use crate::types::{Profile, ServerDisplayInfo};
use crate::vpn::certificate_expiry::CertificateStatus;
use crate::vpn::diagnostics::DiagnosticsSnapshot;

/// User intent as tracked by the orchestrator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OrchestratorState {
    #[default]
    Idle,
    FetchingProfiles,
    ConfiguringTunnel,
    EnableRequested,
    DisableRequested,
    Enabled,
}

impl OrchestratorState {
    pub const ALL: [OrchestratorState; 6] = [
        OrchestratorState::Idle,
        OrchestratorState::FetchingProfiles,
        OrchestratorState::ConfiguringTunnel,
        OrchestratorState::EnableRequested,
        OrchestratorState::DisableRequested,
        OrchestratorState::Enabled,
    ];

    /// Whether a command is in flight
    pub fn is_busy(&self) -> bool {
        !matches!(self, OrchestratorState::Idle | OrchestratorState::Enabled)
    }
}

impl std::fmt::Display for OrchestratorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrchestratorState::Idle => write!(f, "idle"),
            OrchestratorState::FetchingProfiles => write!(f, "fetching profiles"),
            OrchestratorState::ConfiguringTunnel => write!(f, "configuring tunnel"),
            OrchestratorState::EnableRequested => write!(f, "enable requested"),
            OrchestratorState::DisableRequested => write!(f, "disable requested"),
            OrchestratorState::Enabled => write!(f, "enabled"),
        }
    }
}

/// Connection screen header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub server_name: String,
    pub flag_country_code: String,
}

impl From<&ServerDisplayInfo> for Header {
    fn from(info: &ServerDisplayInfo) -> Self {
        Self {
            server_name: info.server_name.clone(),
            flag_country_code: info.flag_country_code.clone(),
        }
    }
}

/// Headline status shown to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UiStatus {
    /// Busy talking to the server
    Working,
    /// Waiting for the OS to acknowledge activation
    Configuring,
    NotConnected,
    Connecting,
    Connected,
    Reconnecting,
    Disconnecting,
}

impl std::fmt::Display for UiStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UiStatus::Working => write!(f, "working"),
            UiStatus::Configuring => write!(f, "configuring"),
            UiStatus::NotConnected => write!(f, "not connected"),
            UiStatus::Connecting => write!(f, "connecting"),
            UiStatus::Connected => write!(f, "connected"),
            UiStatus::Reconnecting => write!(f, "reconnecting"),
            UiStatus::Disconnecting => write!(f, "disconnecting"),
        }
    }
}

/// Secondary line under the status
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusDetail {
    None,
    SessionStatus(CertificateStatus),
    NoProfilesAvailable,
}

/// The connect switch: whether it can be flipped, and which way it points
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VpnSwitchState {
    pub is_enabled: bool,
    pub is_on: bool,
}

/// Extra control shown below the switch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdditionalControl {
    None,
    ProfileSelector(Vec<Profile>),
    RenewSessionButton,
    Spinner,
}

/// State of the connection diagnostics panel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiagnosticsPanelState {
    Hidden,
    Collapsed,
    Expanded(DiagnosticsSnapshot),
}

/// Inputs of the UI derivation
#[derive(Debug, Clone, Copy)]
pub struct DerivationInput<'a> {
    pub state: OrchestratorState,
    pub observed: ObservedTunnelStatus,
    pub is_remote_server: bool,
    /// Profiles known for the target; `None` until fetched or restored
    pub profiles: Option<&'a [Profile]>,
    pub certificate_status: Option<&'a CertificateStatus>,
    pub diagnostics_active: bool,
    pub diagnostics_snapshot: Option<&'a DiagnosticsSnapshot>,
    /// Live enabled flag of the OS tunnel
    pub tunnel_enabled: bool,
}

/// Everything the connection screen displays
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UiSnapshot {
    pub status: UiStatus,
    pub status_detail: StatusDetail,
    pub vpn_switch: VpnSwitchState,
    pub additional_control: AdditionalControl,
    pub diagnostics: DiagnosticsPanelState,
}

impl UiSnapshot {
    pub fn derive(input: &DerivationInput<'_>) -> Self {
        Self {
            status: derive_status(input.state, input.observed),
            status_detail: derive_status_detail(input),
            vpn_switch: derive_vpn_switch(input),
            additional_control: derive_additional_control(input),
            diagnostics: derive_diagnostics_panel(input),
        }
    }
}

/// Headline status; first matching rule wins
pub fn derive_status(state: OrchestratorState, observed: ObservedTunnelStatus) -> UiStatus {
    use ObservedTunnelStatus as Os;
    use OrchestratorState as St;

    match (state, observed) {
        (St::FetchingProfiles | St::ConfiguringTunnel, _) => UiStatus::Working,
        (St::EnableRequested, Os::Invalid | Os::Disconnected) => UiStatus::Configuring,
        (_, Os::Invalid | Os::Disconnected) => UiStatus::NotConnected,
        (_, Os::Connecting) => UiStatus::Connecting,
        (_, Os::Connected) => UiStatus::Connected,
        (_, Os::Reasserting) => UiStatus::Reconnecting,
        (_, Os::Disconnecting) => UiStatus::Disconnecting,
    }
}

fn profile_count(input: &DerivationInput<'_>) -> usize {
    input.profiles.map_or(0, <[Profile]>::len)
}

pub fn derive_status_detail(input: &DerivationInput<'_>) -> StatusDetail {
    match input.state {
        OrchestratorState::FetchingProfiles | OrchestratorState::ConfiguringTunnel => {
            StatusDetail::None
        }
        OrchestratorState::Idle if input.is_remote_server && profile_count(input) == 0 => {
            StatusDetail::NoProfilesAvailable
        }
        OrchestratorState::Enabled => input
            .certificate_status
            .map_or(StatusDetail::None, |status| StatusDetail::SessionStatus(*status)),
        _ => StatusDetail::None,
    }
}

/// Switch position follows intent while a request is pending, so it does not
/// flick back before the OS acknowledges
pub fn derive_vpn_switch(input: &DerivationInput<'_>) -> VpnSwitchState {
    let is_enabled = matches!(
        input.state,
        OrchestratorState::Idle | OrchestratorState::Enabled
    ) || input.observed == ObservedTunnelStatus::Connecting;

    let is_on = match input.state {
        OrchestratorState::ConfiguringTunnel | OrchestratorState::EnableRequested => true,
        OrchestratorState::DisableRequested => false,
        _ => input.tunnel_enabled,
    };

    VpnSwitchState { is_enabled, is_on }
}

pub fn derive_additional_control(input: &DerivationInput<'_>) -> AdditionalControl {
    // Expanded diagnostics take the place of the extra control
    if input.diagnostics_active {
        return AdditionalControl::None;
    }
    if matches!(
        input.state,
        OrchestratorState::FetchingProfiles | OrchestratorState::ConfiguringTunnel
    ) {
        return AdditionalControl::Spinner;
    }
    if input.state == OrchestratorState::Enabled
        && input
            .certificate_status
            .is_some_and(CertificateStatus::should_show_renew_button)
    {
        return AdditionalControl::RenewSessionButton;
    }
    if input.state == OrchestratorState::Idle {
        if let Some(profiles) = input.profiles.filter(|p| p.len() > 1) {
            return AdditionalControl::ProfileSelector(profiles.to_vec());
        }
    }
    if matches!(
        input.observed,
        ObservedTunnelStatus::Connecting
            | ObservedTunnelStatus::Disconnecting
            | ObservedTunnelStatus::Reasserting
    ) {
        return AdditionalControl::Spinner;
    }
    AdditionalControl::None
}

pub fn derive_diagnostics_panel(input: &DerivationInput<'_>) -> DiagnosticsPanelState {
    if !input.observed.is_up() {
        return DiagnosticsPanelState::Hidden;
    }
    match (input.diagnostics_active, input.diagnostics_snapshot) {
        (true, Some(snapshot)) => DiagnosticsPanelState::Expanded(snapshot.clone()),
        _ => DiagnosticsPanelState::Collapsed,
    }
}
