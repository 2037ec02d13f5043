//! Connection flows driven through the orchestrator
//!
//! Uses scripted tunnel and remote API doubles; the OAuth token endpoint is a
//! wiremock server.

mod common;

use common::*;
use eduvpn_core::error::{CancelReason, ConnectionError};
use eduvpn_core::store::{ConnectionAttemptStore, MemoryAttemptStore};
use eduvpn_core::tunnel::{FsDataStore, ObservedTunnelStatus, TunnelControl};
use eduvpn_core::types::{ConnectableTarget, ConnectionAttempt, StaticConfig};
use eduvpn_core::vpn::{
    AdditionalControl, ConnectionOrchestrator, FlowOutcome, OrchestratorEvent, OrchestratorState,
    StatusDetail, UiStatus,
};
use std::sync::atomic::Ordering;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn position(events: &[OrchestratorEvent], wanted: impl Fn(&OrchestratorEvent) -> bool) -> usize {
    events
        .iter()
        .position(wanted)
        .unwrap_or_else(|| panic!("event not found in {:?}", events))
}

#[tokio::test]
async fn test_single_profile_connects_without_asking() {
    let oauth = oauth_server().await;
    let tunnel = MockTunnel::new();
    let fetcher = MockFetcher::new(&oauth, profiles(1));
    let (authorization, browser) = coordinator(true);
    let store = Arc::new(MemoryAttemptStore::new());
    let orchestrator = ConnectionOrchestrator::new(
        deps(remote_target(), tunnel.clone(), fetcher.clone(), authorization, store.clone()),
        None,
    );

    let mut rx = orchestrator.subscribe();
    let initial = drain(&mut rx);
    assert!(matches!(initial[0], OrchestratorEvent::HeaderChanged(ref h) if h.server_name == "Example University"));
    assert_eq!(initial.last(), Some(&OrchestratorEvent::CanGoBackChanged(true)));

    let outcome = orchestrator.begin_authorized_connection(true).await.unwrap();
    assert_eq!(outcome, FlowOutcome::Activated { enabled: true });
    assert_eq!(orchestrator.state(), OrchestratorState::Enabled);
    assert_eq!(browser.opened.load(Ordering::SeqCst), 1);

    let events = drain(&mut rx);
    let found = position(&events, |e| matches!(e, OrchestratorEvent::ProfilesFound(p) if p.len() == 1));
    let selected = position(&events, |e| {
        matches!(e, OrchestratorEvent::WillAutomaticallySelectProfile { profile_id } if profile_id == "profile-1")
    });
    let attempting = position(&events, |e| matches!(e, OrchestratorEvent::WillAttemptToConnect(_)));
    assert!(found < selected && selected < attempting);

    // The auto-selected flow never offers a choice or allows navigating back
    assert!(!events.iter().any(|e| matches!(
        e,
        OrchestratorEvent::AdditionalControlChanged(AdditionalControl::ProfileSelector(_))
    )));
    assert!(!events.contains(&OrchestratorEvent::CanGoBackChanged(true)));
    assert!(events.contains(&OrchestratorEvent::CanGoBackChanged(false)));

    let stored = store.load_most_recent().unwrap().unwrap();
    assert_eq!(stored.selected_profile_id.as_deref(), Some("profile-1"));
    assert_eq!(tunnel.current_attempt_id(), Some(stored.attempt_id));
    assert_eq!(orchestrator.current_attempt(), Some(stored));
    assert_eq!(
        orchestrator.connecting_profile().map(|p| p.profile_id),
        Some("profile-1".to_string())
    );
}

#[tokio::test]
async fn test_multiple_profiles_wait_for_a_choice() {
    let oauth = MockServer::start().await;
    // One sign-in covers both the profile list and the configuration
    mount_token_endpoint(&oauth, Some(1)).await;
    let tunnel = MockTunnel::new();
    let fetcher = MockFetcher::new(&oauth, profiles(3));
    let (authorization, browser) = coordinator(true);
    let store = Arc::new(MemoryAttemptStore::new());
    let orchestrator = ConnectionOrchestrator::new(
        deps(remote_target(), tunnel.clone(), fetcher.clone(), authorization, store.clone()),
        None,
    );
    let mut rx = orchestrator.subscribe();
    drain(&mut rx);

    let outcome = orchestrator.begin_authorized_connection(true).await.unwrap();
    let offered = match outcome {
        FlowOutcome::ProfileSelectionRequired(offered) => offered,
        other => panic!("unexpected outcome {:?}", other),
    };
    assert_eq!(offered.len(), 3);
    assert_eq!(orchestrator.state(), OrchestratorState::Idle);
    assert_eq!(tunnel.enable_calls.load(Ordering::SeqCst), 0);
    assert!(store.load_most_recent().unwrap().is_none());

    let events = drain(&mut rx);
    assert!(events.contains(&OrchestratorEvent::AdditionalControlChanged(
        AdditionalControl::ProfileSelector(offered.clone())
    )));
    assert_eq!(events.last(), Some(&OrchestratorEvent::CanGoBackChanged(true)));

    let outcome = orchestrator.continue_with_profile(&offered[1]).await.unwrap();
    assert_eq!(outcome, FlowOutcome::Activated { enabled: true });
    assert_eq!(browser.opened.load(Ordering::SeqCst), 1);
    assert_eq!(fetcher.config_calls.load(Ordering::SeqCst), 1);

    let stored = store.load_most_recent().unwrap().unwrap();
    assert_eq!(stored.profiles, offered);
    assert_eq!(stored.selected_profile_id.as_deref(), Some("profile-2"));
}

#[tokio::test]
async fn test_enable_error_with_tunnel_up_still_ends_enabled() {
    let oauth = oauth_server().await;
    let tunnel = MockTunnel::new();
    tunnel.set_behavior(EnableBehavior::ConnectThenError);
    let fetcher = MockFetcher::new(&oauth, profiles(1));
    let (authorization, _browser) = coordinator(true);
    let store = Arc::new(MemoryAttemptStore::new());
    let orchestrator = ConnectionOrchestrator::new(
        deps(remote_target(), tunnel.clone(), fetcher, authorization, store.clone()),
        None,
    );
    let mut rx = orchestrator.subscribe();
    drain(&mut rx);

    let outcome = orchestrator.begin_authorized_connection(true).await.unwrap();
    assert_eq!(outcome, FlowOutcome::Activated { enabled: true });
    assert_eq!(orchestrator.state(), OrchestratorState::Enabled);
    assert_eq!(orchestrator.observed_status(), ObservedTunnelStatus::Connected);
    assert!(store.load_most_recent().unwrap().is_some());

    // Connected arrived while the enable call was still pending
    let events = drain(&mut rx);
    let connected = position(&events, |e| *e == OrchestratorEvent::StatusChanged(UiStatus::Connected));
    let attempting = position(&events, |e| matches!(e, OrchestratorEvent::WillAttemptToConnect(_)));
    assert!(attempting < connected);
    assert_eq!(orchestrator.snapshot().status, UiStatus::Connected);
}

#[tokio::test]
async fn test_activation_failure_returns_to_idle_and_clears_attempt() {
    let oauth = oauth_server().await;
    let tunnel = MockTunnel::new();
    tunnel.set_behavior(EnableBehavior::Fail);
    let fetcher = MockFetcher::new(&oauth, profiles(1));
    let (authorization, _browser) = coordinator(true);
    let store = Arc::new(MemoryAttemptStore::new());
    let orchestrator = ConnectionOrchestrator::new(
        deps(remote_target(), tunnel.clone(), fetcher, authorization, store.clone()),
        None,
    );

    let err = orchestrator.begin_authorized_connection(true).await.unwrap_err();
    assert!(matches!(err, ConnectionError::TunnelActivationFailed { .. }));
    assert_eq!(orchestrator.state(), OrchestratorState::Idle);
    assert!(orchestrator.can_go_back());
    assert!(orchestrator.current_attempt().is_none());
    assert!(orchestrator.certificate_status().is_none());
    assert!(store.load_most_recent().unwrap().is_none());
    assert!(!orchestrator.snapshot().vpn_switch.is_on);
}

#[tokio::test]
async fn test_cancelled_sign_in_leaves_nothing_behind() {
    let oauth = oauth_server().await;
    let tunnel = MockTunnel::new();
    let fetcher = MockFetcher::new(&oauth, profiles(1));
    let (authorization, browser) = coordinator(false);
    let store = Arc::new(MemoryAttemptStore::new());
    let orchestrator = ConnectionOrchestrator::new(
        deps(remote_target(), tunnel.clone(), fetcher.clone(), authorization, store.clone()),
        None,
    );

    let (result, ()) = tokio::join!(orchestrator.begin_authorized_connection(true), async {
        wait_until("the browser opens", || browser.opened.load(Ordering::SeqCst) == 1).await;
        assert_eq!(orchestrator.snapshot().status, UiStatus::Working);
        assert_eq!(orchestrator.snapshot().additional_control, AdditionalControl::Spinner);
        orchestrator.cancel_authorization();
    });

    let err = result.unwrap_err();
    assert!(err.is_user_cancelled());
    assert_eq!(err, ConnectionError::UserCancelled { reason: CancelReason::User });
    assert_eq!(orchestrator.state(), OrchestratorState::Idle);
    assert_eq!(fetcher.list_calls.load(Ordering::SeqCst), 0);
    assert_eq!(tunnel.enable_calls.load(Ordering::SeqCst), 0);
    assert!(store.load_most_recent().unwrap().is_none());
    assert_eq!(orchestrator.snapshot().status_detail, StatusDetail::NoProfilesAvailable);
}

#[tokio::test]
async fn test_cancel_while_idle_changes_nothing() {
    let oauth = oauth_server().await;
    let (authorization, _browser) = coordinator(true);
    let orchestrator = ConnectionOrchestrator::new(
        deps(
            remote_target(),
            MockTunnel::new(),
            MockFetcher::new(&oauth, profiles(1)),
            authorization,
            Arc::new(MemoryAttemptStore::new()),
        ),
        None,
    );

    orchestrator.cancel_authorization();
    let outcome = orchestrator.begin_authorized_connection(true).await.unwrap();
    assert_eq!(outcome, FlowOutcome::Activated { enabled: true });
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_cancel_racing_the_sign_in_is_always_honored() {
    let oauth = oauth_server().await;
    let (authorization, _browser) = coordinator(false);
    let orchestrator = Arc::new(ConnectionOrchestrator::new(
        deps(
            remote_target(),
            MockTunnel::new(),
            MockFetcher::new(&oauth, profiles(1)),
            authorization,
            Arc::new(MemoryAttemptStore::new()),
        ),
        None,
    ));

    // Land the cancel at a different point of the sign-in on each round
    for round in 0..20 {
        let canceller = {
            let orchestrator = orchestrator.clone();
            tokio::spawn(async move {
                while orchestrator.state() != OrchestratorState::FetchingProfiles {
                    tokio::task::yield_now().await;
                }
                for _ in 0..round % 4 {
                    tokio::task::yield_now().await;
                }
                orchestrator.cancel_authorization();
            })
        };

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            orchestrator.begin_authorized_connection(true),
        )
        .await
        .unwrap_or_else(|_| panic!("cancel ignored in round {}", round));
        canceller.await.unwrap();

        assert_eq!(
            result.unwrap_err(),
            ConnectionError::UserCancelled { reason: CancelReason::User }
        );
        assert_eq!(orchestrator.state(), OrchestratorState::Idle);
    }
}

#[tokio::test]
async fn test_unusable_token_lifetime_returns_to_idle() {
    let oauth = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "access",
            "token_type": "bearer",
            "expires_in": i64::MAX
        })))
        .mount(&oauth)
        .await;
    let tunnel = MockTunnel::new();
    let (authorization, _browser) = coordinator(true);
    let orchestrator = ConnectionOrchestrator::new(
        deps(
            remote_target(),
            tunnel.clone(),
            MockFetcher::new(&oauth, profiles(1)),
            authorization,
            Arc::new(MemoryAttemptStore::new()),
        ),
        None,
    );

    let err = orchestrator.begin_authorized_connection(true).await.unwrap_err();

    assert!(matches!(err, ConnectionError::MalformedRemoteResponse { .. }));
    assert_eq!(orchestrator.state(), OrchestratorState::Idle);
    assert_eq!(tunnel.enable_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_configuration_failure_keeps_unrelated_record() {
    let oauth = oauth_server().await;
    let tunnel = MockTunnel::new();
    let fetcher = MockFetcher::new(&oauth, profiles(1));
    fetcher.fail_next_config(ConnectionError::NetworkUnavailable {
        reason: "connection reset".to_string(),
    });
    let (authorization, _browser) = coordinator(true);
    let other = ConnectionAttempt::for_server(
        ConnectableTarget::server("https://other.example.org/"),
        profiles(1),
        "profile-1".to_string(),
        hours_window(4),
    )
    .unwrap();
    let store = Arc::new(MemoryAttemptStore::with_attempt(other.clone()));
    let orchestrator = ConnectionOrchestrator::new(
        deps(remote_target(), tunnel.clone(), fetcher, authorization, store.clone()),
        None,
    );

    let err = orchestrator.begin_authorized_connection(true).await.unwrap_err();
    assert!(matches!(err, ConnectionError::NetworkUnavailable { .. }));
    assert_eq!(orchestrator.state(), OrchestratorState::Idle);
    assert_eq!(tunnel.enable_calls.load(Ordering::SeqCst), 0);
    assert_eq!(store.load_most_recent().unwrap(), Some(other));
}

#[tokio::test]
async fn test_expired_authorization_forces_new_sign_in() {
    let oauth = MockServer::start().await;
    mount_token_endpoint(&oauth, Some(2)).await;
    let fetcher = MockFetcher::new(&oauth, profiles(2));
    let (authorization, browser) = coordinator(true);
    let orchestrator = ConnectionOrchestrator::new(
        deps(
            remote_target(),
            MockTunnel::new(),
            fetcher.clone(),
            authorization,
            Arc::new(MemoryAttemptStore::new()),
        ),
        None,
    );

    let offered = match orchestrator.begin_authorized_connection(false).await.unwrap() {
        FlowOutcome::ProfileSelectionRequired(offered) => offered,
        other => panic!("unexpected outcome {:?}", other),
    };

    fetcher.fail_next_config(ConnectionError::AuthorizationExpired);
    let err = orchestrator.continue_with_profile(&offered[0]).await.unwrap_err();
    assert_eq!(err, ConnectionError::AuthorizationExpired);
    assert_eq!(browser.opened.load(Ordering::SeqCst), 1);

    let outcome = orchestrator.continue_with_profile(&offered[0]).await.unwrap();
    assert_eq!(outcome, FlowOutcome::Activated { enabled: true });
    assert_eq!(browser.opened.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_disable_when_not_enabled_is_a_no_op() {
    let oauth = oauth_server().await;
    let tunnel = MockTunnel::new();
    let (authorization, _browser) = coordinator(true);
    let orchestrator = ConnectionOrchestrator::new(
        deps(
            remote_target(),
            tunnel.clone(),
            MockFetcher::new(&oauth, profiles(1)),
            authorization,
            Arc::new(MemoryAttemptStore::new()),
        ),
        None,
    );
    let mut rx = orchestrator.subscribe();
    drain(&mut rx);

    orchestrator.disable_connection().await.unwrap();
    assert_eq!(tunnel.disable_calls.load(Ordering::SeqCst), 0);
    assert_eq!(orchestrator.state(), OrchestratorState::Idle);
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test]
async fn test_disable_ends_the_session() {
    let oauth = oauth_server().await;
    let tunnel = MockTunnel::new();
    let (authorization, _browser) = coordinator(true);
    let store = Arc::new(MemoryAttemptStore::new());
    let orchestrator = ConnectionOrchestrator::new(
        deps(
            remote_target(),
            tunnel.clone(),
            MockFetcher::new(&oauth, profiles(1)),
            authorization,
            store.clone(),
        ),
        None,
    );
    orchestrator.begin_authorized_connection(true).await.unwrap();
    wait_until("the certificate is checked", || {
        orchestrator.certificate_status().is_some()
    })
    .await;
    let mut rx = orchestrator.subscribe();
    drain(&mut rx);

    orchestrator.disable_connection().await.unwrap();
    assert_eq!(tunnel.disable_calls.load(Ordering::SeqCst), 1);
    assert!(!tunnel.is_enabled());
    assert_eq!(orchestrator.state(), OrchestratorState::Idle);
    assert!(orchestrator.certificate_status().is_none());
    assert!(orchestrator.connecting_profile().is_none());
    assert!(store.load_most_recent().unwrap().is_none());
    assert_eq!(orchestrator.observed_status(), ObservedTunnelStatus::Disconnected);

    let events = drain(&mut rx);
    assert!(events.contains(&OrchestratorEvent::StatusChanged(UiStatus::Disconnecting)));
    assert!(events.contains(&OrchestratorEvent::CanGoBackChanged(false)));
    assert_eq!(events.last(), Some(&OrchestratorEvent::CanGoBackChanged(true)));
    let snapshot = orchestrator.snapshot();
    assert_eq!(snapshot.status, UiStatus::NotConnected);
    assert!(!snapshot.vpn_switch.is_on);
}

#[tokio::test]
async fn test_tunnel_stopped_elsewhere_ends_the_session() {
    let oauth = oauth_server().await;
    let tunnel = MockTunnel::new();
    let (authorization, _browser) = coordinator(true);
    let store = Arc::new(MemoryAttemptStore::new());
    let orchestrator = ConnectionOrchestrator::new(
        deps(
            remote_target(),
            tunnel.clone(),
            MockFetcher::new(&oauth, profiles(1)),
            authorization,
            store.clone(),
        ),
        None,
    );
    orchestrator.begin_authorized_connection(true).await.unwrap();

    tunnel.drop_externally();
    wait_until("the orchestrator goes idle", || {
        orchestrator.state() == OrchestratorState::Idle
    })
    .await;
    assert!(store.load_most_recent().unwrap().is_none());
    assert!(orchestrator.current_attempt().is_none());
}

#[tokio::test]
async fn test_renew_session_reconnects_same_profile() {
    let oauth = MockServer::start().await;
    mount_token_endpoint(&oauth, Some(2)).await;
    let tunnel = MockTunnel::new();
    let fetcher = MockFetcher::new(&oauth, profiles(2));
    let (authorization, browser) = coordinator(true);
    let store = Arc::new(MemoryAttemptStore::new());
    let orchestrator = ConnectionOrchestrator::new(
        deps(remote_target(), tunnel.clone(), fetcher.clone(), authorization, store.clone()),
        None,
    );
    let offered = match orchestrator.begin_authorized_connection(true).await.unwrap() {
        FlowOutcome::ProfileSelectionRequired(offered) => offered,
        other => panic!("unexpected outcome {:?}", other),
    };
    orchestrator.continue_with_profile(&offered[1]).await.unwrap();
    let first = store.load_most_recent().unwrap().unwrap();

    let outcome = orchestrator.renew_session().await.unwrap();
    assert_eq!(outcome, FlowOutcome::Activated { enabled: true });
    assert_eq!(browser.opened.load(Ordering::SeqCst), 2);
    assert_eq!(tunnel.disable_calls.load(Ordering::SeqCst), 1);

    let second = store.load_most_recent().unwrap().unwrap();
    assert_ne!(first.attempt_id, second.attempt_id);
    assert_eq!(second.selected_profile_id.as_deref(), Some("profile-2"));
}

fn static_target(dir: &std::path::Path) -> ConnectableTarget {
    ConnectableTarget::StaticConfig(StaticConfig {
        name: "office".to_string(),
        storage_path: dir.join("office"),
    })
}

#[tokio::test]
async fn test_static_config_enables_from_stored_blob() {
    let dir = tempdir().unwrap();
    let target = static_target(dir.path());
    FsDataStore::new(dir.path().join("office"))
        .write_static_tunnel_blob("client\nremote vpn.example.org 1194\n")
        .unwrap();

    let oauth = oauth_server().await;
    let tunnel = MockTunnel::new();
    let fetcher = MockFetcher::new(&oauth, profiles(1));
    let (authorization, browser) = coordinator(true);
    let store = Arc::new(MemoryAttemptStore::new());
    let orchestrator = ConnectionOrchestrator::new(
        deps(target.clone(), tunnel.clone(), fetcher.clone(), authorization, store.clone()),
        None,
    );

    let outcome = orchestrator.begin_static_connection().await.unwrap();
    assert_eq!(outcome, FlowOutcome::Activated { enabled: true });
    assert_eq!(orchestrator.state(), OrchestratorState::Enabled);
    assert_eq!(fetcher.network_calls(), 0);
    assert_eq!(browser.opened.load(Ordering::SeqCst), 0);

    let stored = store.load_most_recent().unwrap().unwrap();
    assert_eq!(stored.target, target);
    assert!(stored.profiles.is_empty());
    assert!(stored.certificate_validity_range.is_none());
    // Static targets never report a missing profile list
    assert_eq!(orchestrator.snapshot().status_detail, StatusDetail::None);
}

#[tokio::test]
async fn test_static_config_without_blob_does_nothing() {
    let dir = tempdir().unwrap();
    let oauth = oauth_server().await;
    let tunnel = MockTunnel::new();
    let (authorization, _browser) = coordinator(true);
    let store = Arc::new(MemoryAttemptStore::new());
    let orchestrator = ConnectionOrchestrator::new(
        deps(
            static_target(dir.path()),
            tunnel.clone(),
            MockFetcher::new(&oauth, profiles(1)),
            authorization,
            store.clone(),
        ),
        None,
    );
    let mut rx = orchestrator.subscribe();
    drain(&mut rx);

    let outcome = orchestrator.begin_static_connection().await.unwrap();
    assert_eq!(outcome, FlowOutcome::NoConfiguration);
    assert_eq!(orchestrator.state(), OrchestratorState::Idle);
    assert_eq!(tunnel.enable_calls.load(Ordering::SeqCst), 0);
    assert!(store.load_most_recent().unwrap().is_none());
    assert!(drain(&mut rx).is_empty());
}

#[tokio::test]
#[should_panic(expected = "precondition violated")]
async fn test_authorized_connection_on_static_target_panics() {
    let dir = tempdir().unwrap();
    let oauth = oauth_server().await;
    let (authorization, _browser) = coordinator(true);
    let orchestrator = ConnectionOrchestrator::new(
        deps(
            static_target(dir.path()),
            MockTunnel::new(),
            MockFetcher::new(&oauth, profiles(1)),
            authorization,
            Arc::new(MemoryAttemptStore::new()),
        ),
        None,
    );
    let _ = orchestrator.begin_authorized_connection(true).await;
}

#[tokio::test]
#[should_panic(expected = "precondition violated")]
async fn test_connecting_while_enabled_panics() {
    let oauth = oauth_server().await;
    let (authorization, _browser) = coordinator(true);
    let orchestrator = ConnectionOrchestrator::new(
        deps(
            remote_target(),
            MockTunnel::already_enabled(None),
            MockFetcher::new(&oauth, profiles(1)),
            authorization,
            Arc::new(MemoryAttemptStore::new()),
        ),
        None,
    );
    let _ = orchestrator.begin_authorized_connection(true).await;
}

#[tokio::test]
#[should_panic(expected = "precondition violated")]
async fn test_uninitialized_tunnel_panics() {
    let oauth = oauth_server().await;
    let tunnel = MockTunnel::new();
    tunnel.set_initialized(false);
    let (authorization, _browser) = coordinator(true);
    let orchestrator = ConnectionOrchestrator::new(
        deps(
            remote_target(),
            tunnel,
            MockFetcher::new(&oauth, profiles(1)),
            authorization,
            Arc::new(MemoryAttemptStore::new()),
        ),
        None,
    );
    let _ = orchestrator.begin_authorized_connection(true).await;
}

#[tokio::test]
#[should_panic(expected = "precondition violated")]
async fn test_unknown_profile_panics() {
    let oauth = oauth_server().await;
    let (authorization, _browser) = coordinator(true);
    let orchestrator = ConnectionOrchestrator::new(
        deps(
            remote_target(),
            MockTunnel::new(),
            MockFetcher::new(&oauth, profiles(2)),
            authorization,
            Arc::new(MemoryAttemptStore::new()),
        ),
        None,
    );
    let _ = orchestrator.begin_authorized_connection(false).await.unwrap();
    let stranger = eduvpn_core::types::Profile::new("not-offered", "Not offered");
    let _ = orchestrator.continue_with_profile(&stranger).await;
}
