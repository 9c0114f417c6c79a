//! Scanner session runtime.
//!
//! One tokio task owns the state, runs the reducer and executes its effects.
//! Effects run on a `JoinSet` owned by that task, so stopping the session
//! aborts every in-flight poll, timer and validation with it.

use super::{ScanAction, ScanPhase, ScanResult, ScannerEnvironment, ScannerReducer, ScannerState};
use crate::capture::{CaptureSlot, Image};
use crate::metrics::SCANS_TOTAL;
use crate::reducer::{Effect, Reducer};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};

/// Errors from driving a scanner session.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionError {
    /// The session task has exited.
    #[error("Scanner session is closed")]
    Closed,

    /// The session was stopped before producing a result.
    #[error("Scanner session was stopped")]
    Stopped,
}

/// Handle to a running scanner session.
///
/// Dropping the handle aborts the session and releases the camera.
pub struct ScannerSession {
    actions: mpsc::UnboundedSender<ScanAction>,
    state: watch::Receiver<ScannerState>,
    task: Option<JoinHandle<()>>,
    capture: CaptureSlot,
    last_reported: u64,
}

impl ScannerSession {
    /// Spawn a session on the current tokio runtime.
    #[must_use]
    pub fn spawn(env: ScannerEnvironment) -> Self {
        let (actions, inbox) = mpsc::unbounded_channel();
        let (publisher, state) = watch::channel(ScannerState::default());
        let capture = env.capture.clone();

        let task = tokio::spawn(run(ScannerReducer::new(), env, inbox, publisher));

        Self {
            actions,
            state,
            task: Some(task),
            capture,
            last_reported: 0,
        }
    }

    /// Dispatch an action.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] if the session has exited.
    pub fn send(&self, action: ScanAction) -> Result<(), SessionError> {
        self.actions.send(action).map_err(|_| SessionError::Closed)
    }

    /// Begin a scan.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] if the session has exited.
    pub fn start(&self) -> Result<(), SessionError> {
        self.send(ScanAction::Start)
    }

    /// Supply the face photo for secure tickets.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] if the session has exited.
    pub fn attach_comparison_image(&self, image: Image) -> Result<(), SessionError> {
        self.send(ScanAction::AttachComparisonImage(image))
    }

    /// Return to idle after a result.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Closed`] if the session has exited.
    pub fn reset(&self) -> Result<(), SessionError> {
        self.send(ScanAction::Reset)
    }

    /// Latest state snapshot
    #[must_use]
    pub fn state(&self) -> ScannerState {
        self.state.borrow().clone()
    }

    /// Receiver for state snapshots, for rendering
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ScannerState> {
        self.state.clone()
    }

    /// Wait for the next scan result not yet returned by this method.
    ///
    /// # Errors
    ///
    /// - [`SessionError::Stopped`] if the session stops first
    /// - [`SessionError::Closed`] if the session task has exited
    pub async fn wait_for_result(&mut self) -> Result<ScanResult, SessionError> {
        let last_reported = self.last_reported;
        let snapshot = self
            .state
            .wait_for(|state| {
                state.phase == ScanPhase::Stopped
                    || (state.phase == ScanPhase::ResultShown && state.scan_id > last_reported)
            })
            .await
            .map_err(|_| SessionError::Closed)?
            .clone();

        if snapshot.phase == ScanPhase::Stopped {
            return Err(SessionError::Stopped);
        }
        self.last_reported = snapshot.scan_id;
        snapshot.last_result.ok_or(SessionError::Closed)
    }

    /// Stop the session and wait for it to release the camera.
    pub async fn shutdown(mut self) {
        // The task may already be gone; release below covers that case.
        let _ = self.send(ScanAction::Stop);
        if let Some(task) = self.task.take() {
            if let Err(error) = task.await {
                tracing::warn!(%error, "Scanner task ended abnormally");
            }
        }
        self.capture.release();
    }
}

impl Drop for ScannerSession {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.capture.release();
    }
}

impl std::fmt::Debug for ScannerSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScannerSession")
            .field("phase", &self.state.borrow().phase)
            .field("capture", &self.capture)
            .finish_non_exhaustive()
    }
}

fn spawn_effect(effects: &mut JoinSet<Option<ScanAction>>, effect: Effect<ScanAction>) {
    match effect {
        Effect::Delay { duration, action } => {
            effects.spawn(async move {
                tokio::time::sleep(duration).await;
                Some(*action)
            });
        }
        Effect::Future(future) => {
            effects.spawn(future);
        }
    }
}

async fn run(
    reducer: ScannerReducer,
    env: ScannerEnvironment,
    mut inbox: mpsc::UnboundedReceiver<ScanAction>,
    publisher: watch::Sender<ScannerState>,
) {
    let mut state = ScannerState::default();
    let mut effects: JoinSet<Option<ScanAction>> = JoinSet::new();

    loop {
        let action = tokio::select! {
            Some(action) = inbox.recv() => action,
            Some(joined) = effects.join_next(), if !effects.is_empty() => match joined {
                Ok(Some(action)) => action,
                Ok(None) => continue,
                Err(error) => {
                    if !error.is_cancelled() {
                        tracing::error!(%error, "Scanner effect panicked");
                    }
                    continue;
                }
            },
            else => break,
        };

        let previous = state.phase;
        let produced = reducer.reduce(&mut state, action, &env);

        if previous != ScanPhase::ResultShown && state.phase == ScanPhase::ResultShown {
            if let Some(result) = &state.last_result {
                metrics::counter!(SCANS_TOTAL, "result" => result.kind()).increment(1);
            }
        }
        publisher.send_replace(state.clone());

        if state.phase == ScanPhase::Stopped {
            effects.abort_all();
            for effect in produced {
                spawn_effect(&mut effects, effect);
            }
            while effects.join_next().await.is_some() {}
            break;
        }

        for effect in produced {
            spawn_effect(&mut effects, effect);
        }
    }

    env.capture.release();
    tracing::debug!("Scanner session exited");
}
