//! Events pushed by the orchestrator to its observers

use crate::types::{ConnectionAttempt, Profile};
use crate::vpn::state::{
    AdditionalControl, DiagnosticsPanelState, Header, StatusDetail, UiStatus, VpnSwitchState,
};

/// Notification delivered to orchestrator subscribers, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrchestratorEvent {
    HeaderChanged(Header),
    StatusChanged(UiStatus),
    StatusDetailChanged(StatusDetail),
    VpnSwitchStateChanged(VpnSwitchState),
    AdditionalControlChanged(AdditionalControl),
    DiagnosticsStateChanged(DiagnosticsPanelState),
    /// Profiles fetched from (or restored for) the server
    ProfilesFound(Vec<Profile>),
    /// The only profile is about to be selected without asking
    WillAutomaticallySelectProfile { profile_id: String },
    /// A tunnel is about to be requested for this attempt
    WillAttemptToConnect(ConnectionAttempt),
    /// Navigation away from the connection screen is allowed only while idle
    CanGoBackChanged(bool),
}
