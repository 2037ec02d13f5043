//! Authorization module
//!
//! Handles the OAuth authorization-code flow with PKCE, redirect delivery and
//! WAYF skipping for Secure Internet servers.

pub mod coordinator;
pub mod pkce;
pub mod transport;
pub mod user_agent;
pub mod wayf;

// Public re-exports
pub use coordinator::{
    AuthorizationCoordinator, AuthorizationEndpoints, AuthorizationFlowState, OAuthClientConfig,
};
pub use transport::{
    AuthorizationTransport, ExternalRedirectTransport, LoopbackTransport, RedirectListener,
};
pub use user_agent::{PrintUrl, SystemBrowser, UserAgent};
