//! Orchestrator lifecycle tests: exclusivity, expiry, idempotent
//! termination and settlement accounting on the in-memory store.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use booth_controller::errors::BoothError;
use booth_controller::models::CallOption;
use booth_controller::orchestrator::TerminateOutcome;
use booth_controller::relay::protocol::SignalFrame;
use booth_controller::relay::rooms::ConnectionId;
use booth_controller::store::BoothStore;
use booth_test_utils::{expired_voucher, receiver, voucher, TestBooth};
use common::types::TerminatedBy;
use std::time::Duration;
use tokio::sync::mpsc;

#[tokio::test(start_paused = true)]
async fn scenario_expiry_terminates_and_drains_voucher() {
    let booth = TestBooth::start();
    let code = booth.seed_voucher(&voucher(900)).await;
    booth.seed_receiver(&receiver("+628123")).await;

    let session = booth
        .orchestrator
        .start(
            code.clone(),
            "+628123".to_string(),
            CallOption::PeerVideo,
            "op-1".to_string(),
        )
        .await
        .unwrap();

    assert!(session.active);
    assert_eq!(session.remaining_duration, 900);
    assert_eq!(
        session.call_type,
        common::types::CallType::PeerVideo
    );
    assert_eq!(booth.orchestrator.clock().armed(), 1);

    // No human termination: the deadline fires.
    tokio::time::advance(Duration::from_secs(901)).await;

    // Let the clock task and expiry driver run to completion.
    let mut settled = false;
    for _ in 0..200 {
        if !booth.session(session.id).await.active {
            settled = true;
            break;
        }
        tokio::time::advance(Duration::from_millis(50)).await;
        tokio::task::yield_now().await;
    }
    assert!(settled, "expiry never landed in the store");

    let expired = booth.session(session.id).await;
    assert_eq!(expired.terminated_by, Some(TerminatedBy::SystemExpiry));
    assert_eq!(expired.remaining_duration, 0);
    assert!(expired.end_time.is_some());

    let drained = booth.voucher(&code).await;
    assert_eq!(drained.remaining_duration, 0);
    assert!(drained.used);
}

#[tokio::test]
async fn scenario_concurrent_starts_one_winner() {
    let booth = TestBooth::start();
    let code = booth.seed_voucher(&voucher(900)).await;

    let (first, second) = tokio::join!(
        booth.orchestrator.start(
            code.clone(),
            "+628111".to_string(),
            CallOption::Gsm,
            "op-1".to_string(),
        ),
        booth.orchestrator.start(
            code.clone(),
            "+628222".to_string(),
            CallOption::Gsm,
            "op-2".to_string(),
        ),
    );

    let outcomes = [first, second];
    let winners = outcomes.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1, "exactly one concurrent start may win");

    for result in &outcomes {
        if let Err(e) = result {
            assert!(matches!(e, BoothError::AlreadyActive(_)), "loser got {e}");
        }
    }

    let active: Vec<_> = booth
        .store
        .list_sessions()
        .await
        .unwrap()
        .into_iter()
        .filter(|s| s.active)
        .collect();
    assert_eq!(active.len(), 1);
}

#[tokio::test]
async fn fifty_concurrent_starts_exactly_one_succeeds() {
    let booth = TestBooth::start();
    let code = booth.seed_voucher(&voucher(900)).await;

    let mut handles = Vec::new();
    for i in 0..50 {
        let orchestrator = booth.orchestrator.clone();
        let code = code.clone();
        handles.push(tokio::spawn(async move {
            orchestrator
                .start(
                    code,
                    format!("+62812{i:04}"),
                    CallOption::Gsm,
                    format!("op-{i}"),
                )
                .await
        }));
    }

    let mut ok = 0;
    let mut already_active = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => ok += 1,
            Err(BoothError::AlreadyActive(_)) => already_active += 1,
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    assert_eq!(ok, 1);
    assert_eq!(already_active, 49);

    let active = booth
        .store
        .list_sessions()
        .await
        .unwrap()
        .into_iter()
        .filter(|s| s.active)
        .count();
    assert_eq!(active, 1);
}

#[tokio::test]
async fn scenario_staff_override_preserves_balance_and_notifies_room() {
    let booth = TestBooth::start();
    let code = booth.seed_voucher(&voucher(900)).await;

    let session = booth
        .orchestrator
        .start(
            code.clone(),
            "+628123".to_string(),
            CallOption::Gsm,
            "op-1".to_string(),
        )
        .await
        .unwrap();

    // A booth socket sits in the session's room.
    let (tx, mut rx) = mpsc::channel(8);
    booth
        .relay
        .join(&session.id.to_string(), ConnectionId::new(), tx)
        .unwrap();

    let outcome = booth
        .orchestrator
        .terminate(session.id, TerminatedBy::Staff, Some(300), None)
        .await
        .unwrap();
    assert!(matches!(outcome, TerminateOutcome::Terminated(_)));

    let terminated = booth.session(session.id).await;
    assert!(!terminated.active);
    assert_eq!(terminated.terminated_by, Some(TerminatedBy::Staff));
    assert_eq!(terminated.remaining_duration, 300);

    // The unused time survives on the voucher for a later call.
    let settled = booth.voucher(&code).await;
    assert_eq!(settled.remaining_duration, 300);
    assert!(settled.remaining_duration <= settled.total_duration);

    // And the room heard about it.
    match rx.recv().await.unwrap() {
        SignalFrame::Terminate { session_id } => {
            assert_eq!(session_id, session.id.to_string());
        }
        other => panic!("expected terminate frame, got {other:?}"),
    }

    // Exclusivity released: the voucher can start a fresh session.
    let again = booth
        .orchestrator
        .start(
            code,
            "+628123".to_string(),
            CallOption::Gsm,
            "op-1".to_string(),
        )
        .await
        .unwrap();
    assert_eq!(again.remaining_duration, 300);
}

#[tokio::test]
async fn scenario_unregistered_receiver_rolls_back_cleanly() {
    let booth = TestBooth::start();
    let code = booth.seed_voucher(&voucher(900)).await;

    let err = booth
        .orchestrator
        .start(
            code.clone(),
            "+620000".to_string(),
            CallOption::PeerVideo,
            "op-1".to_string(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, BoothError::ReceiverNotRegistered(_)));

    // No session document, voucher untouched.
    assert!(booth.store.list_sessions().await.unwrap().is_empty());
    let untouched = booth.voucher(&code).await;
    assert!(!untouched.used);
    assert_eq!(untouched.remaining_duration, 900);

    // The reservation was rolled back, so GSM (no registration needed)
    // starts immediately.
    booth
        .orchestrator
        .start(code, "+620000".to_string(), CallOption::Gsm, "op-1".to_string())
        .await
        .unwrap();
}

#[tokio::test]
async fn terminate_is_idempotent_and_settles_once() {
    let booth = TestBooth::start();
    let code = booth.seed_voucher(&voucher(900)).await;

    let session = booth
        .orchestrator
        .start(
            code.clone(),
            "+628123".to_string(),
            CallOption::Gsm,
            "op-1".to_string(),
        )
        .await
        .unwrap();

    // Simulates the expiry-vs-hangup race: two terminations, different
    // actors and observations.
    let first = booth
        .orchestrator
        .terminate(session.id, TerminatedBy::User, Some(300), None)
        .await
        .unwrap();
    let second = booth
        .orchestrator
        .terminate(session.id, TerminatedBy::SystemExpiry, Some(0), None)
        .await
        .unwrap();

    assert!(matches!(first, TerminateOutcome::Terminated(_)));
    assert!(matches!(second, TerminateOutcome::AlreadyTerminated(_)));

    // First termination's attribution and settlement stand; no
    // double-settlement lowered the balance afterwards.
    let terminal = booth.session(session.id).await;
    assert_eq!(terminal.terminated_by, Some(TerminatedBy::User));
    assert_eq!(terminal.remaining_duration, 300);
    assert_eq!(booth.voucher(&code).await.remaining_duration, 300);
}

#[tokio::test]
async fn skewed_client_observation_is_clamped_to_seed() {
    let booth = TestBooth::start();
    let code = booth.seed_voucher(&voucher(900)).await;

    let session = booth
        .orchestrator
        .start(
            code.clone(),
            "+628123".to_string(),
            CallOption::Gsm,
            "op-1".to_string(),
        )
        .await
        .unwrap();

    // A client with a skewed clock claims more time than was seeded.
    booth
        .orchestrator
        .terminate(session.id, TerminatedBy::User, Some(5000), None)
        .await
        .unwrap();

    let settled = booth.voucher(&code).await;
    assert_eq!(settled.remaining_duration, 900);
    assert!(settled.remaining_duration <= settled.total_duration);
}

#[tokio::test]
async fn start_rejects_terminal_vouchers() {
    let booth = TestBooth::start();

    let expired = booth.seed_voucher(&expired_voucher(900)).await;
    let err = booth
        .orchestrator
        .start(expired, "+628123".to_string(), CallOption::Gsm, "op".to_string())
        .await
        .unwrap_err();
    assert!(matches!(err, BoothError::VoucherExpired(_)));

    let depleted = booth
        .seed_voucher(&booth_test_utils::depleted_voucher())
        .await;
    let err = booth
        .orchestrator
        .start(depleted, "+628123".to_string(), CallOption::Gsm, "op".to_string())
        .await
        .unwrap_err();
    assert!(matches!(err, BoothError::VoucherDepleted(_)));
}

#[tokio::test]
async fn terminate_unknown_session_is_not_found() {
    let booth = TestBooth::start();
    let err = booth
        .orchestrator
        .terminate(
            common::types::SessionId::new(),
            TerminatedBy::User,
            None,
            None,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, BoothError::SessionNotFound(_)));
}

#[tokio::test(start_paused = true)]
async fn explicit_termination_cancels_the_expiry_timer() {
    let booth = TestBooth::start();
    let code = booth.seed_voucher(&voucher(600)).await;

    let session = booth
        .orchestrator
        .start(
            code.clone(),
            "+628123".to_string(),
            CallOption::Gsm,
            "op-1".to_string(),
        )
        .await
        .unwrap();
    assert_eq!(booth.orchestrator.clock().armed(), 1);

    booth
        .orchestrator
        .terminate(session.id, TerminatedBy::User, Some(100), None)
        .await
        .unwrap();
    assert_eq!(booth.orchestrator.clock().armed(), 0);

    // Long after the would-be deadline, the user's settlement still stands:
    // no late expiry fired over it.
    tokio::time::advance(Duration::from_secs(700)).await;
    tokio::task::yield_now().await;
    tokio::task::yield_now().await;

    let terminal = booth.session(session.id).await;
    assert_eq!(terminal.terminated_by, Some(TerminatedBy::User));
    assert_eq!(booth.voucher(&code).await.remaining_duration, 100);
}
