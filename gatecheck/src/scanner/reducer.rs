//! Scanner state machine.

use super::{ScanAction, ScanPhase, ScanResult, ScannerEnvironment, ScannerState};
use crate::reducer::{Effect, Effects, Reducer};
use smallvec::{smallvec, SmallVec};
use std::sync::Arc;

/// Pure transition rules for a scanner session.
#[derive(Clone, Copy, Debug, Default)]
pub struct ScannerReducer;

impl ScannerReducer {
    /// Creates a new `ScannerReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn open_camera(scan_id: u64, env: &ScannerEnvironment) -> Effect<ScanAction> {
        let capture = env.capture.clone();
        Effect::future(async move {
            Some(match capture.open() {
                Ok(()) => ScanAction::CaptureOpened { scan_id },
                Err(error) => ScanAction::CaptureFailed {
                    scan_id,
                    message: error.to_string(),
                },
            })
        })
    }

    fn release_camera(env: &ScannerEnvironment) -> Effect<ScanAction> {
        let capture = env.capture.clone();
        Effect::future(async move {
            capture.release();
            None
        })
    }

    fn poll_frame(scan_id: u64, env: &ScannerEnvironment) -> Effect<ScanAction> {
        let capture = env.capture.clone();
        let detector = Arc::clone(&env.detector);
        Effect::future(async move {
            Some(match capture.grab() {
                Ok(Some(frame)) => match detector.detect(&frame) {
                    Some(payload) => ScanAction::FrameDecoded { scan_id, payload },
                    None => ScanAction::NoCodeFound { scan_id },
                },
                Ok(None) => ScanAction::NoCodeFound { scan_id },
                Err(error) => ScanAction::CaptureFailed {
                    scan_id,
                    message: error.to_string(),
                },
            })
        })
    }

    fn validate(
        scan_id: u64,
        payload: Vec<u8>,
        state: &ScannerState,
        env: &ScannerEnvironment,
    ) -> Effect<ScanAction> {
        let engine = Arc::clone(&env.engine);
        let context = env.context.clone();
        let comparison = state.comparison_image.clone();
        Effect::future(async move {
            Some(
                match engine.validate(&payload, comparison.as_ref(), &context).await {
                    Ok(outcome) => ScanAction::ValidationFinished {
                        scan_id,
                        outcome: Box::new(outcome),
                    },
                    Err(error) => ScanAction::ValidationFailed {
                        scan_id,
                        message: error.to_string(),
                    },
                },
            )
        })
    }

    fn show(state: &mut ScannerState, result: ScanResult) {
        tracing::info!(scan_id = state.scan_id, result = result.kind(), "Scan finished");
        state.phase = ScanPhase::ResultShown;
        state.last_result = Some(result);
    }

    /// Feedback for the current scan while in `phase`
    fn is_current(state: &ScannerState, scan_id: u64, phase: ScanPhase) -> bool {
        state.scan_id == scan_id && state.phase == phase
    }
}

impl Reducer for ScannerReducer {
    type State = ScannerState;
    type Action = ScanAction;
    type Environment = ScannerEnvironment;

    #[allow(clippy::too_many_lines)]
    fn reduce(
        &self,
        state: &mut ScannerState,
        action: ScanAction,
        env: &ScannerEnvironment,
    ) -> Effects<ScanAction> {
        match action {
            ScanAction::Start => {
                if state.phase != ScanPhase::Idle {
                    tracing::debug!(phase = ?state.phase, "Start ignored outside idle");
                    return SmallVec::new();
                }
                state.scan_id += 1;
                state.phase = ScanPhase::Capturing;
                state.already_scanned = false;
                state.last_result = None;
                state.started_at = Some(env.clock.now());
                state.polls = 0;
                tracing::debug!(scan_id = state.scan_id, "Scan started");

                smallvec![
                    Self::open_camera(state.scan_id, env),
                    Effect::Delay {
                        duration: env.config.session_timeout(),
                        action: Box::new(ScanAction::TimedOut {
                            scan_id: state.scan_id,
                        }),
                    },
                ]
            }

            ScanAction::CaptureOpened { scan_id } | ScanAction::Poll { scan_id } => {
                if !Self::is_current(state, scan_id, ScanPhase::Capturing) || state.already_scanned {
                    return SmallVec::new();
                }
                state.polls += 1;
                smallvec![Self::poll_frame(scan_id, env)]
            }

            ScanAction::NoCodeFound { scan_id } => {
                if !Self::is_current(state, scan_id, ScanPhase::Capturing) {
                    return SmallVec::new();
                }
                smallvec![Effect::Delay {
                    duration: env.config.poll_interval(),
                    action: Box::new(ScanAction::Poll { scan_id }),
                }]
            }

            ScanAction::FrameDecoded { scan_id, payload } => {
                if !Self::is_current(state, scan_id, ScanPhase::Capturing) || state.already_scanned {
                    tracing::debug!(scan_id, "Duplicate decode suppressed");
                    return SmallVec::new();
                }
                state.already_scanned = true;
                state.phase = ScanPhase::Processing;
                tracing::debug!(scan_id, "Code read, validating");
                smallvec![Self::validate(scan_id, payload, state, env)]
            }

            ScanAction::ValidationFinished { scan_id, outcome } => {
                if Self::is_current(state, scan_id, ScanPhase::Processing) {
                    Self::show(state, ScanResult::Validated(*outcome));
                }
                SmallVec::new()
            }

            ScanAction::ValidationFailed { scan_id, message } => {
                if Self::is_current(state, scan_id, ScanPhase::Processing) {
                    tracing::warn!(scan_id, message = %message, "Validation could not complete");
                    Self::show(state, ScanResult::RetryPrompt(message));
                }
                SmallVec::new()
            }

            ScanAction::CaptureFailed { scan_id, message } => {
                if !Self::is_current(state, scan_id, ScanPhase::Capturing) {
                    return SmallVec::new();
                }
                tracing::warn!(scan_id, message = %message, "Camera failed");
                Self::show(state, ScanResult::RetryPrompt(message));
                smallvec![Self::release_camera(env)]
            }

            ScanAction::TimedOut { scan_id } => {
                if !Self::is_current(state, scan_id, ScanPhase::Capturing) {
                    return SmallVec::new();
                }
                Self::show(state, ScanResult::TimedOut);
                smallvec![Self::release_camera(env)]
            }

            ScanAction::AttachComparisonImage(image) => {
                if matches!(state.phase, ScanPhase::Processing | ScanPhase::Stopped) {
                    tracing::debug!(phase = ?state.phase, "Comparison image ignored");
                } else {
                    state.comparison_image = Some(image);
                }
                SmallVec::new()
            }

            ScanAction::Reset => {
                if state.phase != ScanPhase::ResultShown {
                    return SmallVec::new();
                }
                state.scan_id += 1;
                state.phase = ScanPhase::Idle;
                state.already_scanned = false;
                state.comparison_image = None;
                state.last_result = None;
                state.started_at = None;
                state.polls = 0;
                SmallVec::new()
            }

            ScanAction::Stop => {
                if state.phase == ScanPhase::Stopped {
                    return SmallVec::new();
                }
                state.scan_id += 1;
                state.phase = ScanPhase::Stopped;
                state.comparison_image = None;
                tracing::debug!("Scanner stopped");
                smallvec![Self::release_camera(env)]
            }
        }
    }
}
