//! Integration tests for the session lifecycle controller.
//!
//! These tests drive the controller through its public operations against
//! the harness doubles:
//! - Add validation, persistence and start
//! - Resume decisions for every stored state
//! - Revoke, list and startup reload
//! - Idempotent shutdown

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Utc};
use tcs_core::{
    credentials::encode_basic_auth,
    errors::{ErrorCategory, SessionRpcError, ValidationError},
    harness::{FailingBaker, FlakyStore, RecordingTunnel, StaticBaker, TestRig, TEST_PASSWORD},
    keys::{generate_session_keys, parse_public_key, serialize_compressed},
    marshal::session_from_wire,
    store::{SessionStore, StoreError},
    ControllerConfig, ResumeOutcome, ResumeReport, SessionController, SessionState, SessionType,
};
use tcs_proto::v1::{AddSessionRequestV1, RevokeSessionRequestV1, SessionStateV1, SessionTypeV1};

fn in_an_hour() -> u64 {
    (Utc::now() + ChronoDuration::hours(1)).timestamp() as u64
}

async fn wait_for_watchers(controller: &SessionController, expected: usize) {
    for _ in 0..1000 {
        if controller.active_watchers() == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!(
        "expected {expected} watchers, still have {}",
        controller.active_watchers()
    );
}

// ---------------------------------------------------------------------------
// Add
// ---------------------------------------------------------------------------

#[tokio::test]
async fn add_ui_password_session_starts_watcher() {
    let rig = TestRig::new();

    let wire = rig
        .controller
        .add_session("laptop", SessionType::UiPassword, in_an_hour(), "mailbox.test:443", false)
        .await
        .expect("add should succeed");

    assert_eq!(wire.label, "laptop");
    assert_eq!(wire.session_state, SessionStateV1::Created as i32);
    assert_eq!(wire.session_type, SessionTypeV1::UiPassword as i32);
    assert_eq!(wire.mailbox_server_addr, "mailbox.test:443");
    assert_eq!(wire.pairing_secret_mnemonic.split(' ').count(), 10);

    assert_eq!(rig.tunnel.start_calls(), 1);
    assert_eq!(rig.controller.active_watchers(), 1);
    assert_eq!(rig.baker.bake_count(), 0);

    let key = parse_public_key(&wire.local_public_key).unwrap();
    let auth = rig.tunnel.inner.auth_data(&key).expect("tunnel should be live");
    let expected = format!("Authorization: Basic {}", encode_basic_auth(TEST_PASSWORD));
    assert_eq!(auth.as_bytes(), expected.as_bytes());

    rig.controller.shutdown().await;
    assert_eq!(rig.controller.active_watchers(), 0);
    assert_eq!(rig.stored_state(&key).await, Some(SessionState::Created));
}

#[tokio::test]
async fn add_macaroon_session_bakes_credential() {
    let rig = TestRig::new();

    let wire = rig
        .controller
        .add_session("admin", SessionType::MacaroonAdmin, in_an_hour(), "", false)
        .await
        .unwrap();

    assert_eq!(rig.baker.bake_count(), 1);
    let key = parse_public_key(&wire.local_public_key).unwrap();
    let stored = rig.store.get_session(&key).await.unwrap().unwrap();
    let expected = format!(
        "Macaroon: {}",
        StaticBaker::token_for(stored.macaroon_root_key, false)
    );
    let auth = rig.tunnel.inner.auth_data(&key).unwrap();
    assert_eq!(auth.as_bytes(), expected.as_bytes());

    rig.controller.shutdown().await;
}

#[tokio::test]
async fn add_past_expiry_rejected_before_persistence() {
    let rig = TestRig::new();
    let past = (Utc::now() - ChronoDuration::seconds(10)).timestamp() as u64;

    let err = rig
        .controller
        .add_session("late", SessionType::UiPassword, past, "", false)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        SessionRpcError::Validation(ValidationError::ExpiryNotInFuture)
    ));
    assert_eq!(rig.store.store_calls(), 0);
    assert_eq!(rig.tunnel.start_calls(), 0);
    assert!(rig.controller.list_sessions().await.unwrap().is_empty());
}

#[tokio::test]
async fn add_custom_type_rejected() {
    let rig = TestRig::new();

    let err = rig
        .controller
        .add_session("custom", SessionType::MacaroonCustom, in_an_hour(), "", false)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        SessionRpcError::Validation(ValidationError::UnsupportedType(SessionType::MacaroonCustom))
    ));
    assert_eq!(rig.store.store_calls(), 0);
}

#[tokio::test]
async fn add_rpc_unknown_type_is_translation_error() {
    let rig = TestRig::new();

    let err = rig
        .controller
        .add_session_rpc(AddSessionRequestV1 {
            label: "x".into(),
            session_type: 42,
            expiry_timestamp_seconds: in_an_hour(),
            mailbox_server_addr: String::new(),
            dev_server: false,
        })
        .await
        .unwrap_err();

    assert_eq!(err.category(), ErrorCategory::Translation);
    assert_eq!(rig.store.store_calls(), 0);
}

#[tokio::test]
async fn add_rpc_checks_expiry_before_type() {
    let rig = TestRig::new();

    let err = rig
        .controller
        .add_session_rpc(AddSessionRequestV1 {
            label: "x".into(),
            session_type: 42,
            expiry_timestamp_seconds: 1,
            mailbox_server_addr: String::new(),
            dev_server: false,
        })
        .await
        .unwrap_err();

    assert_eq!(err.category(), ErrorCategory::Validation);
}

#[tokio::test]
async fn add_rpc_returns_session() {
    let rig = TestRig::new();

    let resp = rig
        .controller
        .add_session_rpc(AddSessionRequestV1 {
            label: "phone".into(),
            session_type: SessionTypeV1::MacaroonReadonly as i32,
            expiry_timestamp_seconds: in_an_hour(),
            mailbox_server_addr: "mb:443".into(),
            dev_server: true,
        })
        .await
        .unwrap();

    let info = session_from_wire(&resp.session.expect("session in response")).unwrap();
    assert_eq!(info.label, "phone");
    assert_eq!(info.session_type, SessionType::MacaroonReadonly);
    assert!(info.dev_server);

    rig.controller.shutdown().await;
}

#[tokio::test]
async fn add_store_failure_is_fatal() {
    let rig = TestRig::new();
    rig.store.fail_store.store(true, Ordering::SeqCst);

    let err = rig
        .controller
        .add_session("x", SessionType::UiPassword, in_an_hour(), "", false)
        .await
        .unwrap_err();

    assert_eq!(err.category(), ErrorCategory::Storage);
    assert_eq!(rig.store.store_calls(), 1);
    assert_eq!(rig.tunnel.start_calls(), 0);
}

#[tokio::test]
async fn add_tunnel_failure_propagates_but_keeps_record() {
    let rig = TestRig::new();
    rig.tunnel.fail_start.store(true, Ordering::SeqCst);

    let err = rig
        .controller
        .add_session("x", SessionType::UiPassword, in_an_hour(), "", false)
        .await
        .unwrap_err();

    assert_eq!(err.category(), ErrorCategory::Collaborator);
    assert_eq!(rig.controller.active_watchers(), 0);
    assert_eq!(rig.controller.list_sessions().await.unwrap().len(), 1);
}

#[tokio::test]
async fn add_with_failing_baker_skips_start() {
    let store = Arc::new(FlakyStore::new());
    let tunnel = Arc::new(RecordingTunnel::new());
    let controller = SessionController::new(
        ControllerConfig::default(),
        store.clone(),
        tunnel.clone(),
        Arc::new(FailingBaker),
    );

    let wire = controller
        .add_session("x", SessionType::MacaroonAdmin, in_an_hour(), "", false)
        .await
        .expect("credential failure is not an error");

    assert_eq!(wire.session_state, SessionStateV1::Created as i32);
    assert_eq!(tunnel.start_calls(), 0);
    assert_eq!(controller.active_watchers(), 0);
}

#[tokio::test]
async fn one_watcher_per_started_session() {
    let rig = TestRig::new();

    for label in ["a", "b", "c"] {
        rig.controller
            .add_session(label, SessionType::UiPassword, in_an_hour(), "", false)
            .await
            .unwrap();
    }

    assert_eq!(rig.controller.active_watchers(), 3);
    assert_eq!(rig.tunnel.inner.live_count(), 3);

    rig.controller.shutdown().await;
    assert_eq!(rig.controller.active_watchers(), 0);
}

// ---------------------------------------------------------------------------
// Resume
// ---------------------------------------------------------------------------

#[tokio::test]
async fn resume_expired_session_revokes_without_watcher() {
    let rig = TestRig::new();
    let sess = rig
        .seed(
            SessionType::UiPassword,
            SessionState::Created,
            Utc::now() - ChronoDuration::seconds(5),
        )
        .await
        .unwrap();

    let outcome = rig.controller.resume_session(&sess).await.unwrap();

    assert_eq!(outcome, ResumeOutcome::Expired);
    assert_eq!(
        rig.stored_state(&sess.local_public_key).await,
        Some(SessionState::Revoked)
    );
    assert_eq!(rig.tunnel.start_calls(), 0);
    assert_eq!(rig.controller.active_watchers(), 0);
}

#[tokio::test]
async fn resume_expired_store_failure_is_error() {
    let rig = TestRig::new();
    let sess = rig
        .seed(
            SessionType::UiPassword,
            SessionState::InUse,
            Utc::now() - ChronoDuration::seconds(5),
        )
        .await
        .unwrap();
    rig.store.fail_revoke.store(true, Ordering::SeqCst);

    let err = rig.controller.resume_session(&sess).await.unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Storage);
}

#[tokio::test]
async fn resume_terminal_states_do_nothing() {
    let rig = TestRig::new();

    for state in [SessionState::Revoked, SessionState::Expired] {
        let sess = rig
            .seed(
                SessionType::UiPassword,
                state,
                Utc::now() - ChronoDuration::seconds(5),
            )
            .await
            .unwrap();
        let store_calls = rig.store.store_calls();

        let outcome = rig.controller.resume_session(&sess).await.unwrap();

        assert_eq!(outcome, ResumeOutcome::NotResumable(state));
        assert_eq!(rig.store.store_calls(), store_calls);
        assert_eq!(rig.stored_state(&sess.local_public_key).await, Some(state));
    }

    assert_eq!(rig.store.revoke_calls(), 0);
    assert_eq!(rig.tunnel.start_calls(), 0);
    assert_eq!(rig.controller.active_watchers(), 0);
}

#[tokio::test]
async fn resume_custom_session_is_skipped() {
    let rig = TestRig::new();
    let sess = rig
        .seed(
            SessionType::MacaroonCustom,
            SessionState::Created,
            Utc::now() + ChronoDuration::hours(1),
        )
        .await
        .unwrap();

    let outcome = rig.controller.resume_session(&sess).await.unwrap();

    assert_eq!(outcome, ResumeOutcome::CredentialUnavailable);
    assert_eq!(rig.tunnel.start_calls(), 0);
    assert_eq!(rig.baker.bake_count(), 0);
}

#[tokio::test]
async fn resume_in_use_session_starts() {
    let rig = TestRig::new();
    let sess = rig
        .seed(
            SessionType::MacaroonReadonly,
            SessionState::InUse,
            Utc::now() + ChronoDuration::hours(1),
        )
        .await
        .unwrap();

    let outcome = rig.controller.resume_session(&sess).await.unwrap();

    assert_eq!(outcome, ResumeOutcome::Started);
    assert_eq!(rig.controller.active_watchers(), 1);
    rig.controller.shutdown().await;
}

#[tokio::test]
async fn resume_all_reports_each_outcome() {
    let rig = TestRig::new();
    let future = Utc::now() + ChronoDuration::hours(1);
    let past = Utc::now() - ChronoDuration::minutes(1);

    rig.seed(SessionType::UiPassword, SessionState::Created, future).await.unwrap();
    rig.seed(SessionType::MacaroonAdmin, SessionState::InUse, future).await.unwrap();
    rig.seed(SessionType::UiPassword, SessionState::Created, past).await.unwrap();
    rig.seed(SessionType::UiPassword, SessionState::Revoked, future).await.unwrap();
    rig.seed(SessionType::MacaroonCustom, SessionState::Created, future).await.unwrap();

    let report = rig.controller.resume_all().await.unwrap();

    assert_eq!(
        report,
        ResumeReport {
            started: 2,
            skipped: 2,
            expired: 1,
            failed: 0,
        }
    );
    assert_eq!(rig.controller.active_watchers(), 2);
    rig.controller.shutdown().await;
}

#[tokio::test]
async fn resume_all_continues_past_failures() {
    let rig = TestRig::new();
    let future = Utc::now() + ChronoDuration::hours(1);
    rig.seed(SessionType::UiPassword, SessionState::Created, future).await.unwrap();
    rig.seed(SessionType::UiPassword, SessionState::Created, future).await.unwrap();
    rig.tunnel.fail_start.store(true, Ordering::SeqCst);

    let report = rig.controller.resume_all().await.unwrap();

    assert_eq!(report.failed, 2);
    assert_eq!(rig.tunnel.start_calls(), 2);
}

#[tokio::test]
async fn resume_all_list_failure_is_error() {
    let rig = TestRig::new();
    rig.store.fail_list.store(true, Ordering::SeqCst);

    let err = rig.controller.resume_all().await.unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Storage);
}

// ---------------------------------------------------------------------------
// Revoke and list
// ---------------------------------------------------------------------------

#[tokio::test]
async fn revoke_unknown_key_is_storage_error_without_stop() {
    let rig = TestRig::new();
    let (_, unknown) = generate_session_keys();

    let err = rig
        .controller
        .revoke_session(&serialize_compressed(&unknown))
        .await
        .unwrap_err();

    assert!(err.is_not_found());
    assert!(matches!(err, SessionRpcError::Storage(StoreError::NotFound(_))));
    assert_eq!(rig.tunnel.stop_calls(), 0);
}

#[tokio::test]
async fn revoke_malformed_key_is_validation_error() {
    let rig = TestRig::new();

    let err = rig
        .controller
        .revoke_session_rpc(RevokeSessionRequestV1 {
            local_public_key: vec![1, 2, 3],
        })
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        SessionRpcError::Validation(ValidationError::InvalidPublicKey(_))
    ));
    assert_eq!(rig.store.revoke_calls(), 0);
}

#[tokio::test]
async fn revoke_live_session_stops_tunnel_and_watcher() {
    let rig = TestRig::new();
    let wire = rig
        .controller
        .add_session("x", SessionType::UiPassword, in_an_hour(), "", false)
        .await
        .unwrap();
    let key = parse_public_key(&wire.local_public_key).unwrap();

    rig.controller.revoke_session(&wire.local_public_key).await.unwrap();

    assert_eq!(rig.tunnel.stop_calls(), 1);
    assert!(!rig.tunnel.inner.is_live(&key));
    assert_eq!(rig.stored_state(&key).await, Some(SessionState::Revoked));
    wait_for_watchers(&rig.controller, 0).await;
}

#[tokio::test]
async fn revoke_twice_is_not_an_error() {
    let rig = TestRig::new();
    let wire = rig
        .controller
        .add_session("x", SessionType::UiPassword, in_an_hour(), "", false)
        .await
        .unwrap();

    rig.controller.revoke_session(&wire.local_public_key).await.unwrap();
    rig.controller.revoke_session(&wire.local_public_key).await.unwrap();

    assert_eq!(rig.tunnel.stop_calls(), 2);
}

#[tokio::test]
async fn revoke_store_failure_skips_stop() {
    let rig = TestRig::new();
    let wire = rig
        .controller
        .add_session("x", SessionType::UiPassword, in_an_hour(), "", false)
        .await
        .unwrap();
    rig.store.fail_revoke.store(true, Ordering::SeqCst);

    let err = rig
        .controller
        .revoke_session(&wire.local_public_key)
        .await
        .unwrap_err();

    assert_eq!(err.category(), ErrorCategory::Storage);
    assert_eq!(rig.tunnel.stop_calls(), 0);
    assert_eq!(rig.controller.active_watchers(), 1);
    rig.controller.shutdown().await;
}

#[tokio::test]
async fn list_returns_store_order() {
    let rig = TestRig::new();
    for label in ["first", "second", "third"] {
        rig.controller
            .add_session(label, SessionType::UiPassword, in_an_hour(), "", false)
            .await
            .unwrap();
    }

    let labels: Vec<_> = rig
        .controller
        .list_sessions()
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.label)
        .collect();
    assert_eq!(labels, vec!["first", "second", "third"]);

    rig.controller.shutdown().await;
}

#[tokio::test]
async fn list_reflects_pairing() {
    let rig = TestRig::new();
    let wire = rig
        .controller
        .add_session("x", SessionType::UiPassword, in_an_hour(), "", false)
        .await
        .unwrap();
    let key = parse_public_key(&wire.local_public_key).unwrap();
    let (_, remote) = generate_session_keys();

    rig.tunnel.inner.mark_paired(&key, remote).await.unwrap();

    let listed = rig.controller.list_sessions().await.unwrap();
    assert_eq!(listed[0].session_state, SessionStateV1::InUse as i32);
    assert_eq!(listed[0].remote_public_key, serialize_compressed(&remote));

    rig.controller.shutdown().await;
}

#[tokio::test]
async fn revoke_during_pairing_stays_revoked() {
    let rig = TestRig::new();
    let wire = rig
        .controller
        .add_session("x", SessionType::MacaroonAdmin, in_an_hour(), "", false)
        .await
        .unwrap();
    let key = parse_public_key(&wire.local_public_key).unwrap();
    let (_, remote) = generate_session_keys();

    // Park the pairing write inside the store, then revoke underneath it.
    let gate = rig.store.pairing_gate.lock().await;
    let pairing = {
        let tunnel = rig.tunnel.inner.clone();
        tokio::spawn(async move { tunnel.mark_paired(&key, remote).await })
    };
    while rig.store.pairing_calls() == 0 {
        tokio::task::yield_now().await;
    }

    rig.controller.revoke_session(&wire.local_public_key).await.unwrap();
    drop(gate);
    pairing.await.unwrap().unwrap();

    assert_eq!(rig.stored_state(&key).await, Some(SessionState::Revoked));
    wait_for_watchers(&rig.controller, 0).await;

    let tunnel = Arc::new(RecordingTunnel::new());
    let restarted = SessionController::new(
        ControllerConfig::default(),
        rig.store.clone(),
        tunnel.clone(),
        Arc::new(StaticBaker::new()),
    );
    let report = restarted.resume_all().await.unwrap();
    assert_eq!(report.started, 0);
    assert_eq!(report.skipped, 1);
    assert_eq!(tunnel.start_calls(), 0);
}

#[tokio::test]
async fn list_failure_is_storage_error() {
    let rig = TestRig::new();
    rig.store.fail_list.store(true, Ordering::SeqCst);

    let err = rig.controller.list_sessions().await.unwrap_err();
    assert_eq!(err.category(), ErrorCategory::Storage);
}

// ---------------------------------------------------------------------------
// Shutdown
// ---------------------------------------------------------------------------

#[tokio::test]
async fn shutdown_twice_is_same_as_once() {
    let rig = TestRig::new();
    rig.controller
        .add_session("x", SessionType::UiPassword, in_an_hour(), "", false)
        .await
        .unwrap();

    rig.controller.shutdown().await;
    assert!(rig.controller.is_shutting_down());
    assert_eq!(rig.controller.active_watchers(), 0);

    rig.controller.shutdown().await;
    assert_eq!(rig.controller.active_watchers(), 0);
}

#[tokio::test]
async fn concurrent_shutdowns_all_wait_for_drain() {
    let rig = TestRig::new();
    for _ in 0..4 {
        rig.controller
            .add_session("x", SessionType::UiPassword, in_an_hour(), "", false)
            .await
            .unwrap();
    }

    tokio::join!(
        rig.controller.shutdown(),
        rig.controller.shutdown(),
        rig.controller.shutdown()
    );

    assert_eq!(rig.controller.active_watchers(), 0);
}

#[tokio::test]
async fn shutdown_with_no_sessions_returns() {
    let rig = TestRig::new();
    rig.controller.shutdown().await;
    assert_eq!(rig.controller.active_watchers(), 0);
}
