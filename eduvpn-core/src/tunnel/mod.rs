//! OS tunnel-control seam
//!
//! The operating system owns the tunnel. The orchestrator only asks it to
//! enable or disable, and observes the status it reports asynchronously.

use async_trait::async_trait;
use std::net::IpAddr;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::types::TunnelBlob;

pub mod data_store;

pub use data_store::{DataStore, FsDataStore};

/// Tunnel status as reported by the operating system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ObservedTunnelStatus {
    /// No tunnel configuration is installed
    #[default]
    Invalid,
    Disconnected,
    Connecting,
    Connected,
    /// Re-establishing after a network change
    Reasserting,
    Disconnecting,
}

impl ObservedTunnelStatus {
    /// All statuses, in declaration order
    pub const ALL: [ObservedTunnelStatus; 6] = [
        ObservedTunnelStatus::Invalid,
        ObservedTunnelStatus::Disconnected,
        ObservedTunnelStatus::Connecting,
        ObservedTunnelStatus::Connected,
        ObservedTunnelStatus::Reasserting,
        ObservedTunnelStatus::Disconnecting,
    ];

    /// Whether traffic is (about to be) flowing through the tunnel
    pub fn is_up(&self) -> bool {
        matches!(
            self,
            ObservedTunnelStatus::Connected | ObservedTunnelStatus::Reasserting
        )
    }

    /// Whether the OS reports no usable tunnel
    pub fn is_down(&self) -> bool {
        matches!(
            self,
            ObservedTunnelStatus::Invalid | ObservedTunnelStatus::Disconnected
        )
    }
}

impl std::fmt::Display for ObservedTunnelStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ObservedTunnelStatus::Invalid => write!(f, "invalid"),
            ObservedTunnelStatus::Disconnected => write!(f, "disconnected"),
            ObservedTunnelStatus::Connecting => write!(f, "connecting"),
            ObservedTunnelStatus::Connected => write!(f, "connected"),
            ObservedTunnelStatus::Reasserting => write!(f, "reasserting"),
            ObservedTunnelStatus::Disconnecting => write!(f, "disconnecting"),
        }
    }
}

/// Live statistics of an active tunnel
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TunnelStats {
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub local_address: Option<IpAddr>,
    pub remote_address: Option<String>,
    /// Seconds since the tunnel came up
    pub connected_secs: u64,
}

/// Error reported by the tunnel-control collaborator
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct TunnelControlError {
    pub message: String,
}

impl TunnelControlError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Operating-system tunnel control
///
/// `enable` and `disable` may complete before or after the matching status
/// change is delivered on the subscription channel. Callers should read
/// `is_enabled` after the call returns instead of trusting its result.
#[async_trait]
pub trait TunnelControl: Send + Sync {
    /// Whether the OS-side tunnel manager finished loading
    fn is_initialized(&self) -> bool;

    /// Whether the tunnel is switched on (regardless of its connection status)
    fn is_enabled(&self) -> bool;

    fn current_status(&self) -> ObservedTunnelStatus;

    /// Attempt id recorded with the installed tunnel, if the backend keeps one
    fn current_attempt_id(&self) -> Option<Uuid>;

    async fn enable(&self, tunnel_blob: &TunnelBlob, attempt_id: Uuid)
        -> Result<(), TunnelControlError>;

    async fn disable(&self) -> Result<(), TunnelControlError>;

    /// Ordered stream of status changes
    fn subscribe(&self) -> mpsc::UnboundedReceiver<ObservedTunnelStatus>;

    /// Live statistics; only meaningful while the tunnel is up
    async fn connection_stats(&self) -> Result<TunnelStats, TunnelControlError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_up_and_down_partition() {
        for status in ObservedTunnelStatus::ALL {
            assert!(!(status.is_up() && status.is_down()), "{status}");
        }
        assert!(ObservedTunnelStatus::Reasserting.is_up());
        assert!(ObservedTunnelStatus::Invalid.is_down());
        assert!(!ObservedTunnelStatus::Connecting.is_up());
        assert!(!ObservedTunnelStatus::Connecting.is_down());
    }
}
