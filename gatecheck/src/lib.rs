//! # Gatecheck
//!
//! Event-ticket issuance and entrance validation.
//!
//! A ticket is a bearer credential that admits exactly once. Its QR code
//! carries the ticket's identity triple; at the door a scanner reads the
//! code, the validation engine checks it against the stored ticket and, for
//! secure tickets, compares a live photo of the holder with the photo taken
//! at purchase.
//!
//! ## Components
//!
//! - [`codec`]: QR payload encoding and decoding
//! - [`biometric`]: face fingerprints and similarity scoring
//! - [`engine`]: the validation state machine, sole writer of ticket status
//! - [`scanner`]: the capture loop, a reducer plus a session runtime
//! - [`store`]: ticket persistence with conditional updates
//! - [`issuance`]: ticket creation and administrative revocation
//!
//! ## Example
//!
//! ```no_run
//! use gatecheck::biometric::{BiometricMatcher, MemoryReferenceImages, PreCroppedDetector};
//! use gatecheck::config::GateConfig;
//! use gatecheck::engine::ValidationEngine;
//! use gatecheck::environment::SystemClock;
//! use gatecheck::issuance::{IssueRequest, TicketIssuer};
//! use gatecheck::store::MemoryTicketStore;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = GateConfig::from_env()?;
//! let store = Arc::new(MemoryTicketStore::new());
//! let issuer = TicketIssuer::new(store.clone(), Arc::new(SystemClock));
//! let ticket = issuer.issue(IssueRequest::regular("E1", "B1")).await?;
//!
//! let engine = ValidationEngine::new(
//!     store,
//!     BiometricMatcher::new(Arc::new(PreCroppedDetector), config.biometric),
//!     Arc::new(MemoryReferenceImages::new()),
//!     Arc::new(SystemClock),
//!     config.validation,
//! );
//! let outcome = engine
//!     .validate(&ticket.qr_payload(), None, &engine.context_for("staff-1"))
//!     .await?;
//! assert!(outcome.is_valid());
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod biometric;
pub mod capture;
pub mod codec;
pub mod config;
pub mod engine;
pub mod environment;
pub mod error;
pub mod issuance;
pub mod metrics;
pub mod reducer;
pub mod scanner;
pub mod store;
pub mod types;

pub use biometric::{BiometricError, BiometricMatcher, Fingerprint};
pub use capture::{CaptureError, Image};
pub use codec::{CodecError, QrPayload};
pub use config::{ConfigError, GateConfig};
pub use engine::{Rejection, ValidationEngine, ValidationError, ValidationOutcome};
pub use environment::{Clock, SystemClock};
pub use error::ErrorCategory;
pub use issuance::{IssueError, IssueRequest, TicketIssuer};
pub use scanner::{ScanAction, ScanPhase, ScanResult, ScannerSession, ScannerState};
pub use store::{StoreError, TicketStore, TicketUpdate};
pub use types::{
    BuyerId, EventId, OperatorId, ScanContext, Ticket, TicketId, TicketStatus, TicketType,
    ValidationId, ValidationRecord, ValidationType,
};
