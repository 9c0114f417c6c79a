//! Scanner session: the capture loop in front of the validation engine.
//!
//! ```text
//! Idle ──Start──▶ Capturing ──FrameDecoded──▶ Processing ──▶ ResultShown
//!                    │  ▲                                        │
//!                    │  └──Poll (every poll interval)            ├──Reset──▶ Idle
//!                    └──TimedOut / CaptureFailed ──▶ ResultShown └──Stop───▶ Stopped
//! ```
//!
//! [`ScannerReducer`] holds the transition rules and never touches the
//! camera itself; [`ScannerSession`] runs the reducer on one task, executes
//! its effects, and guarantees the camera is released when the session stops
//! or is dropped.
//!
//! Each scan gets a fresh `scan_id`. Feedback actions carry the id of the
//! scan that produced them, so a poll or timer left over from an abandoned
//! scan cannot affect the next one.

use crate::capture::{CaptureSlot, Image, QrDetector};
use crate::config::ScannerConfig;
use crate::engine::{ValidationEngine, ValidationOutcome};
use crate::environment::Clock;
use crate::types::ScanContext;
use chrono::{DateTime, Utc};
use std::sync::Arc;

pub mod reducer;
pub mod session;

pub use reducer::ScannerReducer;
pub use session::{ScannerSession, SessionError};

/// Where the session is in its scan cycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ScanPhase {
    /// Waiting for the operator to start a scan
    #[default]
    Idle,
    /// Polling the camera for a QR code
    Capturing,
    /// A code was read; waiting for the engine
    Processing,
    /// Showing the outcome until reset or stop
    ResultShown,
    /// Terminated; the camera has been released
    Stopped,
}

/// What the operator sees at the end of a scan.
#[derive(Clone, Debug, PartialEq)]
pub enum ScanResult {
    /// The engine decided: admitted or rejected with a reason
    Validated(ValidationOutcome),
    /// Infrastructure failure; scan again
    RetryPrompt(String),
    /// No readable code within the session timeout
    TimedOut,
}

impl ScanResult {
    /// Text for the result screen
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::Validated(outcome) => outcome.message(),
            Self::RetryPrompt(message) => format!("please try again: {message}"),
            Self::TimedOut => "no ticket detected, scan timed out".to_string(),
        }
    }

    /// Metric label
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Validated(_) => "validated",
            Self::RetryPrompt(_) => "retry",
            Self::TimedOut => "timed_out",
        }
    }
}

/// Scanner session state.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ScannerState {
    /// Current phase
    pub phase: ScanPhase,
    /// Generation of the current scan; bumped by `Start`, `Reset` and `Stop`
    pub scan_id: u64,
    /// Set once a payload is handed to the engine for this scan
    pub already_scanned: bool,
    /// Live face photo used for secure tickets
    pub comparison_image: Option<Image>,
    /// Outcome of the most recent scan
    pub last_result: Option<ScanResult>,
    /// When the current scan started
    pub started_at: Option<DateTime<Utc>>,
    /// Frames polled in the current scan
    pub polls: u32,
}

/// Everything the scanner accepts: operator commands and effect feedback.
#[derive(Clone, Debug, PartialEq)]
pub enum ScanAction {
    /// Operator: open the camera and start looking for a code
    Start,
    /// Operator: supply the face photo for secure tickets
    AttachComparisonImage(Image),
    /// Operator: clear the result and return to idle
    Reset,
    /// Operator: end the session and release the camera
    Stop,

    /// Camera opened for `scan_id`
    CaptureOpened {
        /// Scan this belongs to
        scan_id: u64,
    },
    /// Camera failed for `scan_id`
    CaptureFailed {
        /// Scan this belongs to
        scan_id: u64,
        /// Device error text
        message: String,
    },
    /// Time to grab the next frame
    Poll {
        /// Scan this belongs to
        scan_id: u64,
    },
    /// A frame contained a QR code
    FrameDecoded {
        /// Scan this belongs to
        scan_id: u64,
        /// Raw payload bytes
        payload: Vec<u8>,
    },
    /// The frame held no readable code
    NoCodeFound {
        /// Scan this belongs to
        scan_id: u64,
    },
    /// Engine returned a decision
    ValidationFinished {
        /// Scan this belongs to
        scan_id: u64,
        /// The decision
        outcome: Box<ValidationOutcome>,
    },
    /// Engine hit an infrastructure failure
    ValidationFailed {
        /// Scan this belongs to
        scan_id: u64,
        /// Error text
        message: String,
    },
    /// Session timeout for `scan_id` elapsed
    TimedOut {
        /// Scan this belongs to
        scan_id: u64,
    },
}

/// Dependencies captured by scanner effects.
#[derive(Clone)]
pub struct ScannerEnvironment {
    /// Decides each scanned payload
    pub engine: Arc<ValidationEngine>,
    /// Camera held for the session
    pub capture: CaptureSlot,
    /// Finds QR codes in frames
    pub detector: Arc<dyn QrDetector>,
    /// Time source
    pub clock: Arc<dyn Clock>,
    /// Poll interval and timeout
    pub config: ScannerConfig,
    /// Operator and location recorded on each attempt
    pub context: ScanContext,
}

impl std::fmt::Debug for ScannerEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScannerEnvironment")
            .field("capture", &self.capture)
            .field("config", &self.config)
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}
