//! Certificate expiry tracking
//!
//! This module provides CertificateExpiryMonitor, which reports when the
//! client certificate of the running session becomes due for renewal and
//! when it expires.

use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::types::CertificateValidityRange;

/// Default upper bound between two clock readings
pub const DEFAULT_RECHECK_INTERVAL: Duration = Duration::from_secs(60);

/// Lifecycle stage of a client certificate
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum CertificateState {
    Valid,
    ExpiringSoon,
    Expired,
}

/// Certificate stage together with the window it was computed from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CertificateStatus {
    pub state: CertificateState,
    pub validity: CertificateValidityRange,
}

impl CertificateStatus {
    /// Status of `validity` at the instant `now`
    pub fn at(validity: CertificateValidityRange, now: DateTime<Utc>) -> Self {
        let state = if now >= validity.expires_at() {
            CertificateState::Expired
        } else if now >= validity.expiring_soon_at() {
            CertificateState::ExpiringSoon
        } else {
            CertificateState::Valid
        };
        Self { state, validity }
    }

    /// Whether the UI should offer to renew the session
    pub fn should_show_renew_button(&self) -> bool {
        matches!(
            self.state,
            CertificateState::ExpiringSoon | CertificateState::Expired
        )
    }

    /// Time left until expiry, zero once expired
    pub fn time_remaining(&self, now: DateTime<Utc>) -> Duration {
        (self.validity.expires_at() - now)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }

    /// Next instant at which the stage changes, if any
    fn next_transition(&self) -> Option<DateTime<Utc>> {
        match self.state {
            CertificateState::Valid => Some(self.validity.expiring_soon_at()),
            CertificateState::ExpiringSoon => Some(self.validity.expires_at()),
            CertificateState::Expired => None,
        }
    }
}

/// Emits certificate stage transitions for one validity window
///
/// The first status is delivered from the monitor's own task shortly after
/// construction, never synchronously. Each stage is reported once, in order.
/// Sleeps are capped at the recheck interval and the wall clock is read on
/// every wake, so a suspended machine catches up as soon as it resumes.
///
/// The monitor stops when dropped.
#[derive(Debug)]
pub struct CertificateExpiryMonitor {
    validity: CertificateValidityRange,
    handle: JoinHandle<()>,
}

impl CertificateExpiryMonitor {
    /// Start monitoring `validity`; must be called within a tokio runtime
    pub fn start<F>(validity: CertificateValidityRange, recheck_interval: Duration, handler: F) -> Self
    where
        F: Fn(CertificateStatus) + Send + 'static,
    {
        let recheck_interval = recheck_interval.max(Duration::from_millis(1));
        let handle = tokio::spawn(async move {
            let mut reported: Option<CertificateState> = None;
            loop {
                let now = Utc::now();
                let status = CertificateStatus::at(validity, now);

                // A clock stepping backwards must not resurrect an earlier stage
                if reported.map_or(true, |last| status.state > last) {
                    debug!(state = ?status.state, expires_at = %validity.expires_at(), "Certificate status changed");
                    if status.state == CertificateState::Expired {
                        info!("Session certificate expired");
                    }
                    handler(status);
                    reported = Some(status.state);
                }

                let Some(next) = reported
                    .map(|state| CertificateStatus { state, validity })
                    .and_then(|s| s.next_transition())
                else {
                    break;
                };
                let wait = (next - now)
                    .to_std()
                    .unwrap_or(Duration::ZERO)
                    .min(recheck_interval);
                tokio::time::sleep(wait + Duration::from_millis(1)).await;
            }
        });

        Self { validity, handle }
    }

    pub fn validity(&self) -> CertificateValidityRange {
        self.validity
    }

    /// Stop the timer; safe to call more than once
    pub fn stop(&self) {
        self.handle.abort();
    }
}

impl Drop for CertificateExpiryMonitor {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
