//! VPN connection module
//!
//! Handles the connection lifecycle of one target and the state derived from it.

pub mod certificate_expiry;
pub mod events;
pub mod orchestrator;
pub mod state;

// Session helpers owned by the orchestrator
pub mod diagnostics;

// Public re-exports
pub use certificate_expiry::{CertificateExpiryMonitor, CertificateState, CertificateStatus};
pub use diagnostics::{ConnectionDiagnosticsPoller, DiagnosticsSnapshot};
pub use events::OrchestratorEvent;
pub use orchestrator::{ConnectionOrchestrator, FlowOutcome, OrchestratorDeps, SessionTiming};
pub use state::{
    AdditionalControl, DiagnosticsPanelState, Header, OrchestratorState, StatusDetail, UiSnapshot,
    UiStatus, VpnSwitchState,
};
