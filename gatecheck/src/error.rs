//! Error taxonomy shared by every module.
//!
//! Callers route on [`ErrorCategory`], not on concrete variants: a scanner
//! UI shows a reason for input, lookup and identity failures, and a
//! "try again" prompt for infrastructure failures. An infrastructure failure
//! must never be presented as a rejected ticket.
//!
//! Retryability is a property of the concrete error, not the category. Only
//! infrastructure failures are ever retryable, and of those only the
//! transient ones: an unreachable backend is, a corrupt stored document is
//! not.

use crate::biometric::BiometricError;
use crate::capture::CaptureError;
use crate::codec::CodecError;
use crate::store::StoreError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Coarse classification of every failure and rejection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Client-correctable: bad QR payload, no face, poor framing
    Input,
    /// Business-rule rejection: not found, not active, mismatch, used
    Lookup,
    /// Face did not match the purchase-time photo
    Identity,
    /// Store, camera or photo storage unreachable
    Infrastructure,
}

impl ErrorCategory {
    /// Label value for metrics and logs
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Input => "input",
            Self::Lookup => "lookup",
            Self::Identity => "identity",
            Self::Infrastructure => "infrastructure",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl CodecError {
    /// Always [`ErrorCategory::Input`]
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        ErrorCategory::Input
    }
}

impl CaptureError {
    /// Device failures are infrastructure; a malformed raster is input.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidImage { .. } => ErrorCategory::Input,
            Self::Unavailable(_) | Self::NotOpen => ErrorCategory::Infrastructure,
        }
    }

    /// Device failures may clear up
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::NotOpen)
    }
}

impl BiometricError {
    /// Photo quality problems are input; camera and storage are infrastructure.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::NoFaceDetected | Self::LowConfidence { .. } | Self::PoorFraming(_) => {
                ErrorCategory::Input
            }
            Self::Camera(_) | Self::ReferenceUnavailable(_) => ErrorCategory::Infrastructure,
        }
    }

    /// Returns `true` for camera and photo storage outages
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Camera(error) => error.is_retryable(),
            Self::ReferenceUnavailable(_) => true,
            _ => false,
        }
    }
}

impl StoreError {
    /// Classify a store failure
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::NotFound(_) | Self::PreconditionFailed { .. } | Self::AlreadyAdmitted(_) => {
                ErrorCategory::Lookup
            }
            Self::AlreadyExists(_) => ErrorCategory::Input,
            Self::Unavailable(_) | Self::Serialization(_) => ErrorCategory::Infrastructure,
        }
    }
}
