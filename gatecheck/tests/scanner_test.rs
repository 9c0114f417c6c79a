//! Scanner reducer transitions and full session runs.
//!
//! Reducer tests inspect effects without executing them. Session tests run
//! on a paused clock, so poll intervals and the 30 second timeout elapse
//! instantly while keeping their order.

#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)] // Test code can panic

use gatecheck::capture::{CaptureSlot, StillImageDevice};
use gatecheck::config::ValidationConfig;
use gatecheck::engine::{Rejection, ValidationOutcome};
use gatecheck::reducer::{Effect, Reducer};
use gatecheck::scanner::{
    ScanAction, ScanPhase, ScanResult, ScannerEnvironment, ScannerReducer, ScannerSession,
    ScannerState, SessionError,
};
use gatecheck::store::{MemoryTicketStore, TicketStore};
use gatecheck::types::TicketStatus;
use gatecheck_testing::assertions::{
    assert_effects_count, assert_has_delay, assert_has_future_effect, assert_no_effects,
    run_futures,
};
use gatecheck_testing::camera::{ScriptedCamera, blank_frame, frame_with_payload};
use gatecheck_testing::fixtures::{
    self, engine, engine_over, face_pair, references, scanner_environment,
};
use gatecheck_testing::stores::{FlakyReferenceImages, FlakyTicketStore, GatedTicketStore};
use gatecheck_testing::{ReducerTest, init_tracing};
use std::sync::Arc;
use std::time::Duration;

fn environment(camera: &ScriptedCamera) -> ScannerEnvironment {
    let engine = engine(Arc::new(MemoryTicketStore::new()), &references());
    scanner_environment(Arc::new(engine), camera)
}

fn state(phase: ScanPhase, scan_id: u64) -> ScannerState {
    ScannerState {
        phase,
        scan_id,
        ..ScannerState::default()
    }
}

fn session(store: Arc<dyn TicketStore>, camera: &ScriptedCamera) -> ScannerSession {
    session_with_references(store, &references(), camera)
}

fn session_with_references(
    store: Arc<dyn TicketStore>,
    refs: &gatecheck::biometric::MemoryReferenceImages,
    camera: &ScriptedCamera,
) -> ScannerSession {
    let engine = Arc::new(engine(store, refs));
    ScannerSession::spawn(scanner_environment(engine, camera))
}

fn validated(result: ScanResult) -> ValidationOutcome {
    match result {
        ScanResult::Validated(outcome) => outcome,
        other => panic!("expected a validation result, got {other:?}"),
    }
}

// ============================================================================
// Reducer
// ============================================================================

#[test]
fn start_opens_camera_and_arms_timeout() {
    ReducerTest::new(ScannerReducer::new())
        .with_env(environment(&ScriptedCamera::default()))
        .given_state(ScannerState::default())
        .when_action(ScanAction::Start)
        .then_state(|state| {
            assert_eq!(state.phase, ScanPhase::Capturing);
            assert_eq!(state.scan_id, 1);
            assert!(!state.already_scanned);
            assert!(state.started_at.is_some());
        })
        .then_effects(|effects| {
            assert_effects_count(effects, 2);
            assert_has_future_effect(effects);
            let timeout =
                assert_has_delay(effects, |a| matches!(a, ScanAction::TimedOut { scan_id: 1 }));
            assert_eq!(timeout, Duration::from_secs(30));
        })
        .run();
}

#[test]
fn start_is_ignored_outside_idle() {
    for phase in [ScanPhase::Capturing, ScanPhase::Processing, ScanPhase::ResultShown] {
        ReducerTest::new(ScannerReducer::new())
            .with_env(environment(&ScriptedCamera::default()))
            .given_state(state(phase, 4))
            .when_action(ScanAction::Start)
            .then_state(move |state| {
                assert_eq!(state.phase, phase);
                assert_eq!(state.scan_id, 4);
            })
            .then_effects(assert_no_effects)
            .run();
    }
}

#[test]
fn missing_code_schedules_next_poll() {
    ReducerTest::new(ScannerReducer::new())
        .with_env(environment(&ScriptedCamera::default()))
        .given_state(state(ScanPhase::Capturing, 1))
        .when_action(ScanAction::NoCodeFound { scan_id: 1 })
        .then_state(|state| assert_eq!(state.phase, ScanPhase::Capturing))
        .then_effects(|effects| {
            let interval =
                assert_has_delay(effects, |a| matches!(a, ScanAction::Poll { scan_id: 1 }));
            assert_eq!(interval, Duration::from_secs(1));
        })
        .run();
}

#[test]
fn decoded_frame_moves_to_processing_once() {
    ReducerTest::new(ScannerReducer::new())
        .with_env(environment(&ScriptedCamera::default()))
        .given_state(state(ScanPhase::Capturing, 1))
        .when_action(ScanAction::FrameDecoded {
            scan_id: 1,
            payload: b"{}".to_vec(),
        })
        .then_state(|state| {
            assert_eq!(state.phase, ScanPhase::Processing);
            assert!(state.already_scanned);
        })
        .then_effects(|effects| {
            assert_effects_count(effects, 1);
            assert_has_future_effect(effects);
        })
        .run();

    let mut processing = state(ScanPhase::Processing, 1);
    processing.already_scanned = true;
    ReducerTest::new(ScannerReducer::new())
        .with_env(environment(&ScriptedCamera::default()))
        .given_state(processing)
        .when_action(ScanAction::FrameDecoded {
            scan_id: 1,
            payload: b"{}".to_vec(),
        })
        .then_state(|state| assert_eq!(state.phase, ScanPhase::Processing))
        .then_effects(assert_no_effects)
        .run();
}

#[test]
fn feedback_from_an_earlier_scan_is_ignored() {
    let stale = [
        ScanAction::TimedOut { scan_id: 1 },
        ScanAction::Poll { scan_id: 1 },
        ScanAction::NoCodeFound { scan_id: 1 },
        ScanAction::CaptureFailed {
            scan_id: 1,
            message: "gone".to_string(),
        },
        ScanAction::FrameDecoded {
            scan_id: 1,
            payload: b"{}".to_vec(),
        },
    ];
    for action in stale {
        ReducerTest::new(ScannerReducer::new())
            .with_env(environment(&ScriptedCamera::default()))
            .given_state(state(ScanPhase::Capturing, 2))
            .when_action(action)
            .then_state(|state| {
                assert_eq!(state.phase, ScanPhase::Capturing);
                assert!(state.last_result.is_none());
            })
            .then_effects(assert_no_effects)
            .run();
    }
}

#[test]
fn timeout_shows_result_and_releases_camera() {
    ReducerTest::new(ScannerReducer::new())
        .with_env(environment(&ScriptedCamera::default()))
        .given_state(state(ScanPhase::Capturing, 1))
        .when_action(ScanAction::TimedOut { scan_id: 1 })
        .then_state(|state| {
            assert_eq!(state.phase, ScanPhase::ResultShown);
            assert_eq!(state.last_result, Some(ScanResult::TimedOut));
        })
        .then_effects(|effects| {
            assert_effects_count(effects, 1);
            assert_has_future_effect(effects);
        })
        .run();
}

#[test]
fn reset_returns_to_idle_and_forgets_the_photo() {
    let (_, photo) = face_pair(1.0);
    let mut shown = state(ScanPhase::ResultShown, 3);
    shown.comparison_image = Some(photo);
    shown.already_scanned = true;
    shown.last_result = Some(ScanResult::TimedOut);

    ReducerTest::new(ScannerReducer::new())
        .with_env(environment(&ScriptedCamera::default()))
        .given_state(shown)
        .when_action(ScanAction::Reset)
        .then_state(|state| {
            assert_eq!(state.phase, ScanPhase::Idle);
            assert_eq!(state.scan_id, 4);
            assert!(!state.already_scanned);
            assert!(state.comparison_image.is_none());
            assert!(state.last_result.is_none());
        })
        .then_effects(assert_no_effects)
        .run();
}

#[test]
fn comparison_photo_is_frozen_while_processing() {
    let (_, photo) = face_pair(1.0);
    ReducerTest::new(ScannerReducer::new())
        .with_env(environment(&ScriptedCamera::default()))
        .given_state(state(ScanPhase::Processing, 1))
        .when_action(ScanAction::AttachComparisonImage(photo))
        .then_state(|state| assert!(state.comparison_image.is_none()))
        .then_effects(assert_no_effects)
        .run();
}

#[test]
fn stop_is_terminal() {
    for phase in [
        ScanPhase::Idle,
        ScanPhase::Capturing,
        ScanPhase::Processing,
        ScanPhase::ResultShown,
    ] {
        ReducerTest::new(ScannerReducer::new())
            .with_env(environment(&ScriptedCamera::default()))
            .given_state(state(phase, 1))
            .when_action(ScanAction::Stop)
            .then_state(|state| {
                assert_eq!(state.phase, ScanPhase::Stopped);
                assert_eq!(state.scan_id, 2);
            })
            .then_effects(assert_has_future_effect)
            .run();
    }

    ReducerTest::new(ScannerReducer::new())
        .with_env(environment(&ScriptedCamera::default()))
        .given_state(state(ScanPhase::Stopped, 2))
        .when_action(ScanAction::Start)
        .then_state(|state| assert_eq!(state.phase, ScanPhase::Stopped))
        .then_effects(assert_no_effects)
        .run();
}

#[tokio::test]
async fn start_effects_acquire_the_camera() {
    let camera = ScriptedCamera::default();
    let env = environment(&camera);
    let mut state = ScannerState::default();

    let effects = ScannerReducer::new().reduce(&mut state, ScanAction::Start, &env);
    let actions = run_futures(effects.into_iter().collect()).await;

    assert_eq!(actions, vec![ScanAction::CaptureOpened { scan_id: 1 }]);
    assert_eq!(camera.open_streams(), 1);

    let effects = ScannerReducer::new().reduce(&mut state, ScanAction::Stop, &env);
    assert!(effects.iter().all(|e| !matches!(e, Effect::Delay { .. })));
    run_futures(effects.into_iter().collect()).await;
    assert_eq!(camera.open_streams(), 0);
}

// ============================================================================
// Session
// ============================================================================

#[tokio::test(start_paused = true)]
async fn session_polls_until_a_code_is_read() {
    init_tracing();
    let ticket = fixtures::regular_ticket("T1");
    let store = MemoryTicketStore::new();
    store.create_ticket(ticket.clone()).await.unwrap();
    let camera = ScriptedCamera::new([blank_frame(), blank_frame()]);
    camera.push_frame(frame_with_payload(&ticket.qr_payload()));

    let mut session = session(Arc::new(store.clone()), &camera);
    session.start().unwrap();
    let outcome = validated(session.wait_for_result().await.unwrap());

    assert!(outcome.is_valid());
    assert_eq!(session.state().polls, 3);
    assert_eq!(camera.open_streams(), 1);
    let stored = store.get_ticket(&ticket.id).await.unwrap().unwrap();
    assert_eq!(stored.status, TicketStatus::Used);

    session.shutdown().await;
    assert_eq!(camera.open_streams(), 0);
}

#[tokio::test(start_paused = true)]
async fn held_code_is_validated_once_per_scan() {
    let ticket = fixtures::regular_ticket("T1");
    let store = MemoryTicketStore::new();
    store.create_ticket(ticket.clone()).await.unwrap();
    let camera = ScriptedCamera::default();
    camera.repeat_frame(frame_with_payload(&ticket.qr_payload()));

    let mut session = session(Arc::new(store.clone()), &camera);
    session.start().unwrap();
    assert!(validated(session.wait_for_result().await.unwrap()).is_valid());

    // Outlive the poll interval and the timeout: nothing else happens.
    tokio::time::sleep(Duration::from_secs(45)).await;
    assert_eq!(session.state().phase, ScanPhase::ResultShown);
    let stored = store.get_ticket(&ticket.id).await.unwrap().unwrap();
    assert_eq!(stored.validation_history.len(), 1);

    session.reset().unwrap();
    session.start().unwrap();
    let second = validated(session.wait_for_result().await.unwrap());
    assert_eq!(second.rejection(), Some(&Rejection::AlreadyUsed));
    assert_eq!(camera.times_opened(), 1);

    session.shutdown().await;
    assert_eq!(camera.open_streams(), 0);
}

#[tokio::test(start_paused = true)]
async fn session_times_out_and_releases_the_camera() {
    let camera = ScriptedCamera::default();
    camera.repeat_frame(blank_frame());
    let mut session = session(Arc::new(MemoryTicketStore::new()), &camera);

    let started = tokio::time::Instant::now();
    session.start().unwrap();
    let result = session.wait_for_result().await.unwrap();

    assert_eq!(result, ScanResult::TimedOut);
    assert_eq!(result.message(), "no ticket detected, scan timed out");
    assert!(started.elapsed() >= Duration::from_secs(30));

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(camera.open_streams(), 0);
    assert_eq!(session.state().phase, ScanPhase::ResultShown);
}

#[tokio::test(start_paused = true)]
async fn stopping_mid_validation_releases_the_camera() {
    let ticket = fixtures::regular_ticket("T1");
    let inner = MemoryTicketStore::new();
    inner.create_ticket(ticket.clone()).await.unwrap();
    // Two parties, one reader: the lookup never completes.
    let stuck = GatedTicketStore::new(inner.clone(), 2);
    let camera = ScriptedCamera::new([frame_with_payload(&ticket.qr_payload())]);

    let session = session(Arc::new(stuck), &camera);
    let mut states = session.subscribe();
    session.start().unwrap();
    states
        .wait_for(|state| state.phase == ScanPhase::Processing)
        .await
        .unwrap();
    assert_eq!(camera.open_streams(), 1);

    session.shutdown().await;
    assert_eq!(camera.open_streams(), 0);
    let stored = inner.get_ticket(&ticket.id).await.unwrap().unwrap();
    assert_eq!(stored.status, TicketStatus::Active);
    assert!(stored.validation_history.is_empty());
}

#[tokio::test(start_paused = true)]
async fn waiting_on_a_stopped_session_reports_stop() {
    let camera = ScriptedCamera::default();
    let mut session = session(Arc::new(MemoryTicketStore::new()), &camera);
    session.start().unwrap();
    session.send(ScanAction::Stop).unwrap();

    assert_eq!(session.wait_for_result().await, Err(SessionError::Stopped));
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(camera.open_streams(), 0);
    assert_eq!(session.start(), Err(SessionError::Closed));
}

#[tokio::test(start_paused = true)]
async fn dropping_the_session_releases_the_camera() {
    let camera = ScriptedCamera::default();
    let session = session(Arc::new(MemoryTicketStore::new()), &camera);
    let mut states = session.subscribe();
    session.start().unwrap();
    states
        .wait_for(|state| state.polls > 0)
        .await
        .unwrap();
    assert_eq!(camera.open_streams(), 1);

    drop(session);
    assert_eq!(camera.open_streams(), 0);
}

#[tokio::test(start_paused = true)]
async fn store_outage_prompts_a_retry() {
    let store = FlakyTicketStore::new();
    let ticket = fixtures::regular_ticket("T1");
    store.inner().create_ticket(ticket.clone()).await.unwrap();
    store.set_unavailable(true);
    let camera = ScriptedCamera::new([frame_with_payload(&ticket.qr_payload())]);

    let mut session = session(Arc::new(store.clone()), &camera);
    session.start().unwrap();
    let result = session.wait_for_result().await.unwrap();

    let ScanResult::RetryPrompt(message) = &result else {
        panic!("expected a retry prompt, got {result:?}");
    };
    assert!(message.contains("connection refused"));
    assert!(result.message().starts_with("please try again"));

    // The ticket was never judged; a rescan once the store is back admits it.
    store.set_unavailable(false);
    camera.push_frame(frame_with_payload(&ticket.qr_payload()));
    session.reset().unwrap();
    session.start().unwrap();
    assert!(validated(session.wait_for_result().await.unwrap()).is_valid());
    session.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn reference_outage_prompts_a_retry() {
    let ticket = fixtures::secure_ticket("T2");
    let store = MemoryTicketStore::new();
    store.create_ticket(ticket.clone()).await.unwrap();
    let refs = references();
    let (reference, holder) = face_pair(0.9);
    refs.insert("photos/T2.png", reference).unwrap();
    let photos = FlakyReferenceImages::new(refs);
    photos.set_unavailable(true);
    let engine = engine_over(
        Arc::new(store.clone()),
        Arc::new(photos),
        ValidationConfig::default(),
    );
    let camera = ScriptedCamera::new([frame_with_payload(&ticket.qr_payload())]);

    let mut session = ScannerSession::spawn(scanner_environment(Arc::new(engine), &camera));
    session.attach_comparison_image(holder).unwrap();
    session.start().unwrap();
    let result = session.wait_for_result().await.unwrap();

    let ScanResult::RetryPrompt(message) = &result else {
        panic!("expected a retry prompt, got {result:?}");
    };
    assert!(message.contains("photo storage timed out"));
    let stored = store.get_ticket(&ticket.id).await.unwrap().unwrap();
    assert_eq!(stored.status, TicketStatus::Active);
    assert!(stored.validation_history.is_empty());
    session.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn unavailable_camera_prompts_a_retry() {
    let camera = ScriptedCamera::unavailable();
    let mut session = session(Arc::new(MemoryTicketStore::new()), &camera);
    session.start().unwrap();

    let result = session.wait_for_result().await.unwrap();
    assert_eq!(
        result,
        ScanResult::RetryPrompt("Camera unavailable: permission denied".to_string())
    );
    assert_eq!(camera.times_opened(), 0);
}

#[tokio::test(start_paused = true)]
async fn camera_failing_mid_scan_prompts_a_retry_and_releases() {
    let camera = ScriptedCamera::default();
    camera.fail_frames(true);
    let mut session = session(Arc::new(MemoryTicketStore::new()), &camera);
    session.start().unwrap();

    let result = session.wait_for_result().await.unwrap();
    assert!(matches!(result, ScanResult::RetryPrompt(_)));
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(camera.open_streams(), 0);
}

#[tokio::test(start_paused = true)]
async fn attached_photo_is_used_for_secure_tickets() {
    let ticket = fixtures::secure_ticket("T2");
    let store = MemoryTicketStore::new();
    store.create_ticket(ticket.clone()).await.unwrap();
    let refs = references();
    let (reference, holder) = face_pair(0.9);
    refs.insert("photos/T2.png", reference).unwrap();
    let camera = ScriptedCamera::new([frame_with_payload(&ticket.qr_payload())]);

    let mut session = session_with_references(Arc::new(store), &refs, &camera);
    session.attach_comparison_image(holder).unwrap();
    session.start().unwrap();

    let outcome = validated(session.wait_for_result().await.unwrap());
    assert!(outcome.is_valid());
    assert!(outcome.record().unwrap().similarity.unwrap() > 0.85);
    session.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn uploaded_image_is_scanned_like_a_camera_frame() {
    let ticket = fixtures::regular_ticket("T1");
    let store = MemoryTicketStore::new();
    store.create_ticket(ticket.clone()).await.unwrap();
    let engine = Arc::new(engine(Arc::new(store), &references()));

    let upload = StillImageDevice::new(frame_with_payload(&ticket.qr_payload()));
    let env = ScannerEnvironment {
        capture: CaptureSlot::new(Arc::new(upload)),
        ..scanner_environment(engine, &ScriptedCamera::default())
    };

    let mut session = ScannerSession::spawn(env);
    session.start().unwrap();
    assert!(validated(session.wait_for_result().await.unwrap()).is_valid());
    session.shutdown().await;
}
