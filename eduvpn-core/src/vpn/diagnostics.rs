//! Live connection diagnostics
//!
//! While the diagnostics panel is open the poller periodically asks the
//! tunnel for its traffic counters and addresses.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::tunnel::TunnelControl;

/// Default poll interval
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// One reading of the tunnel's live statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiagnosticsSnapshot {
    /// Display name of the connected profile, if the session has one
    pub profile_name: Option<String>,
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub local_address: Option<IpAddr>,
    pub remote_address: Option<String>,
    /// How long the tunnel has been up
    pub duration: Duration,
}

/// Polls tunnel statistics on a fixed interval until dropped
#[derive(Debug)]
pub struct ConnectionDiagnosticsPoller {
    refresh: Arc<Notify>,
    handle: JoinHandle<()>,
}

impl ConnectionDiagnosticsPoller {
    /// Start polling; the first query runs immediately
    pub fn start<F>(
        tunnel: Arc<dyn TunnelControl>,
        profile_name: Option<String>,
        interval: Duration,
        handler: F,
    ) -> Self
    where
        F: Fn(DiagnosticsSnapshot) + Send + 'static,
    {
        let refresh = Arc::new(Notify::new());
        let wake = refresh.clone();
        let interval = interval.max(Duration::from_millis(10));

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = wake.notified() => {
                        debug!("Diagnostics refresh requested");
                    }
                }

                match tunnel.connection_stats().await {
                    Ok(stats) => handler(DiagnosticsSnapshot {
                        profile_name: profile_name.clone(),
                        bytes_in: stats.bytes_in,
                        bytes_out: stats.bytes_out,
                        local_address: stats.local_address,
                        remote_address: stats.remote_address,
                        duration: Duration::from_secs(stats.connected_secs),
                    }),
                    Err(e) => warn!(error = %e, "Failed to query connection statistics"),
                }
            }
        });

        Self { refresh, handle }
    }

    /// Poll again right away, e.g. after the tunnel (re)connected
    pub fn refresh_now(&self) {
        self.refresh.notify_one();
    }

    /// Stop polling; safe to call more than once
    pub fn stop(&self) {
        self.handle.abort();
    }
}

impl Drop for ConnectionDiagnosticsPoller {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
