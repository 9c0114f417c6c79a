//! Ticket validation engine.
//!
//! The engine is the sole writer of ticket status and validation history.
//! It is stateless: everything it knows about a ticket comes from the store
//! on each call, and everything it decides goes back through one
//! conditional write.
//!
//! # Decision order
//!
//! Checks run cheapest first and the first failing check decides:
//!
//! 1. **parse**: decode the payload. Failures are not audited.
//! 2. **lookup**: fetch the ticket. Unknown ids are not audited.
//! 3. **status**: the ticket must be `active`.
//! 4. **match**: event and buyer must equal the stored ticket's.
//! 5. **replay**: no earlier record may be `isValid`.
//! 6. **biometric**: secure tickets with a comparison image must match the
//!    purchase-time photo.
//! 7. **accept**: append the successful record and flip `active → used` in
//!    one conditional update.
//!
//! Steps 3 to 6, and a lost race at step 7, append an `isValid = false`
//! record and leave the status untouched.

use crate::biometric::{BiometricError, BiometricMatcher, Fingerprint, ReferenceImages};
use crate::capture::Image;
use crate::codec::{self, CodecError};
use crate::config::ValidationConfig;
use crate::environment::Clock;
use crate::error::ErrorCategory;
use crate::metrics::{VALIDATIONS_TOTAL, VALIDATION_DURATION_SECONDS, VALIDATION_ERRORS_TOTAL};
use crate::store::{StoreError, TicketStore, TicketUpdate};
use crate::types::{OperatorId, ScanContext, Ticket, TicketStatus, ValidationRecord};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

/// Why a scan was refused.
///
/// The `Display` text is the reason shown to the operator and stored on the
/// audit record.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Rejection {
    /// Payload did not decode.
    #[error("invalid ticket data")]
    InvalidTicketData(CodecError),

    /// No ticket with the scanned id.
    #[error("ticket not found in database")]
    NotFound,

    /// Ticket is revoked or expired.
    #[error("ticket is {0}")]
    NotActive(TicketStatus),

    /// Scanned event or buyer differs from the stored ticket.
    #[error("ticket data mismatch")]
    DataMismatch,

    /// Ticket was admitted before.
    #[error("ticket has already been used")]
    AlreadyUsed,

    /// Live face does not match the purchase-time photo.
    #[error("identity mismatch")]
    IdentityMismatch {
        /// Similarity score that fell below the threshold
        similarity: f64,
    },

    /// Secure ticket scanned without a face photo while one is required.
    #[error("identity check required")]
    IdentityCheckRequired,

    /// Secure ticket has no usable reference photo.
    #[error("reference photo unavailable")]
    ReferenceUnavailable,

    /// The comparison photo could not be enrolled.
    #[error("comparison photo unusable: {0}")]
    UnusableCapture(BiometricError),
}

impl Rejection {
    /// Classify the rejection.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidTicketData(_) | Self::UnusableCapture(_) => ErrorCategory::Input,
            Self::NotFound | Self::NotActive(_) | Self::DataMismatch | Self::AlreadyUsed => {
                ErrorCategory::Lookup
            }
            Self::IdentityMismatch { .. }
            | Self::IdentityCheckRequired
            | Self::ReferenceUnavailable => ErrorCategory::Identity,
        }
    }

    /// Stable label for metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::InvalidTicketData(_) => "invalid_ticket_data",
            Self::NotFound => "not_found",
            Self::NotActive(_) => "not_active",
            Self::DataMismatch => "data_mismatch",
            Self::AlreadyUsed => "already_used",
            Self::IdentityMismatch { .. } => "identity_mismatch",
            Self::IdentityCheckRequired => "identity_check_required",
            Self::ReferenceUnavailable => "reference_unavailable",
            Self::UnusableCapture(_) => "unusable_capture",
        }
    }

    /// Rejection for a ticket found in a non-active status.
    #[must_use]
    pub const fn for_status(status: TicketStatus) -> Self {
        match status {
            TicketStatus::Used => Self::AlreadyUsed,
            other => Self::NotActive(other),
        }
    }
}

/// Infrastructure failure during validation.
///
/// Never a verdict on the ticket. Whether a rescan can help is
/// [`ValidationError::is_retryable`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Ticket store unreachable or returned unreadable data.
    #[error("Ticket store unavailable: {0}")]
    Store(#[from] StoreError),

    /// Reference photo storage unreachable.
    #[error("Reference photo storage unavailable: {0}")]
    Reference(String),
}

impl ValidationError {
    /// Always [`ErrorCategory::Infrastructure`]
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        ErrorCategory::Infrastructure
    }

    /// Defers to the wrapped failure; photo storage outages are transient.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Store(error) => error.is_retryable(),
            Self::Reference(_) => true,
        }
    }

    /// Stable label for metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Store(_) => "store",
            Self::Reference(_) => "reference",
        }
    }
}

/// Result of one validation attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationOutcome {
    /// Entry granted; the ticket is now `used`.
    Admitted {
        /// Ticket as persisted after the update
        ticket: Ticket,
        /// The successful record
        record: ValidationRecord,
    },
    /// Entry refused; the ticket's status is unchanged.
    Rejected {
        /// Why
        rejection: Rejection,
        /// Audit record, `None` for parse and lookup failures
        record: Option<ValidationRecord>,
    },
}

impl ValidationOutcome {
    /// Returns `true` if entry was granted
    #[must_use]
    pub const fn is_valid(&self) -> bool {
        matches!(self, Self::Admitted { .. })
    }

    /// Human-readable result for the operator
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::Admitted { .. } => "ticket validated".to_string(),
            Self::Rejected { rejection, .. } => rejection.to_string(),
        }
    }

    /// Updated ticket, on success
    #[must_use]
    pub const fn ticket(&self) -> Option<&Ticket> {
        match self {
            Self::Admitted { ticket, .. } => Some(ticket),
            Self::Rejected { .. } => None,
        }
    }

    /// The rejection, if entry was refused
    #[must_use]
    pub const fn rejection(&self) -> Option<&Rejection> {
        match self {
            Self::Admitted { .. } => None,
            Self::Rejected { rejection, .. } => Some(rejection),
        }
    }

    /// The audit record written for this attempt, if any
    #[must_use]
    pub const fn record(&self) -> Option<&ValidationRecord> {
        match self {
            Self::Admitted { record, .. } => Some(record),
            Self::Rejected { record, .. } => record.as_ref(),
        }
    }

    const fn label(&self) -> &'static str {
        match self {
            Self::Admitted { .. } => "admitted",
            Self::Rejected { .. } => "rejected",
        }
    }
}

/// Outcome of the biometric step.
enum IdentityCheck {
    Skipped,
    Matched(f64),
    Failed(Rejection, Option<f64>),
}

/// Decides whether scanned credentials grant entry.
///
/// Constructed once per process and shared behind an `Arc`.
#[derive(Clone)]
pub struct ValidationEngine {
    store: Arc<dyn TicketStore>,
    matcher: BiometricMatcher,
    references: Arc<dyn ReferenceImages>,
    clock: Arc<dyn Clock>,
    config: ValidationConfig,
}

impl ValidationEngine {
    /// Creates an engine over its collaborators
    #[must_use]
    pub fn new(
        store: Arc<dyn TicketStore>,
        matcher: BiometricMatcher,
        references: Arc<dyn ReferenceImages>,
        clock: Arc<dyn Clock>,
        config: ValidationConfig,
    ) -> Self {
        Self {
            store,
            matcher,
            references,
            clock,
            config,
        }
    }

    /// Active configuration
    #[must_use]
    pub const fn config(&self) -> &ValidationConfig {
        &self.config
    }

    /// Scan context at the configured default location
    #[must_use]
    pub fn context_for(&self, operator: impl Into<OperatorId>) -> ScanContext {
        ScanContext::new(operator, self.config.location.clone())
    }

    /// Derive a fingerprint from a face photo.
    ///
    /// # Errors
    ///
    /// See [`BiometricMatcher::enroll`].
    pub fn enroll_biometric(&self, image: &Image) -> Result<Fingerprint, BiometricError> {
        self.matcher.enroll(image)
    }

    /// Validate a scanned payload.
    ///
    /// `comparison` is the live face photo for secure tickets.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] only for infrastructure failures. Every
    /// business-rule refusal is `Ok(ValidationOutcome::Rejected { .. })`.
    #[tracing::instrument(
        skip(self, payload, comparison, context),
        fields(operator = %context.operator, location = %context.location)
    )]
    pub async fn validate(
        &self,
        payload: &[u8],
        comparison: Option<&Image>,
        context: &ScanContext,
    ) -> Result<ValidationOutcome, ValidationError> {
        let started = Instant::now();
        let result = self.decide(payload, comparison, context).await;
        metrics::histogram!(VALIDATION_DURATION_SECONDS).record(started.elapsed().as_secs_f64());

        match &result {
            Ok(outcome) => {
                let reason = outcome.rejection().map_or("none", Rejection::kind);
                metrics::counter!(VALIDATIONS_TOTAL, "outcome" => outcome.label(), "reason" => reason)
                    .increment(1);
                tracing::info!(
                    outcome = outcome.label(),
                    message = %outcome.message(),
                    "Validation decided"
                );
            }
            Err(error) => {
                metrics::counter!(VALIDATION_ERRORS_TOTAL, "kind" => error.kind()).increment(1);
                tracing::warn!(%error, "Validation aborted by infrastructure failure");
            }
        }

        result
    }

    async fn decide(
        &self,
        payload: &[u8],
        comparison: Option<&Image>,
        context: &ScanContext,
    ) -> Result<ValidationOutcome, ValidationError> {
        let scanned = match codec::decode(payload) {
            Ok(scanned) => scanned,
            Err(error) => {
                tracing::debug!(%error, "Payload did not decode");
                return Ok(ValidationOutcome::Rejected {
                    rejection: Rejection::InvalidTicketData(error),
                    record: None,
                });
            }
        };

        let Some(ticket) = self.store.get_ticket(&scanned.ticket_id).await? else {
            tracing::debug!(ticket_id = %scanned.ticket_id, "Ticket not found");
            return Ok(ValidationOutcome::Rejected {
                rejection: Rejection::NotFound,
                record: None,
            });
        };

        let attempt = ValidationRecord::attempt(&ticket, context, self.clock.now());

        if !ticket.is_active() {
            return Ok(self
                .reject(&ticket, attempt, Rejection::for_status(ticket.status))
                .await);
        }
        if !ticket.matches_identity(&scanned.event_id, &scanned.buyer_id) {
            return Ok(self.reject(&ticket, attempt, Rejection::DataMismatch).await);
        }
        if ticket.has_been_admitted() {
            // Status says active but history disagrees: trust the history.
            tracing::warn!(ticket_id = %ticket.id, "Active ticket has an admitted record");
            return Ok(self.reject(&ticket, attempt, Rejection::AlreadyUsed).await);
        }

        let attempt = if ticket.ticket_type.requires_biometric() {
            match self.verify_identity(&ticket, comparison).await? {
                IdentityCheck::Skipped => attempt,
                IdentityCheck::Matched(similarity) => attempt.with_similarity(similarity),
                IdentityCheck::Failed(rejection, similarity) => {
                    let attempt = match similarity {
                        Some(similarity) => attempt.with_similarity(similarity),
                        None => attempt,
                    };
                    return Ok(self.reject(&ticket, attempt, rejection).await);
                }
            }
        } else {
            attempt
        };

        self.commit(&ticket, attempt.admitted()).await
    }

    async fn verify_identity(
        &self,
        ticket: &Ticket,
        comparison: Option<&Image>,
    ) -> Result<IdentityCheck, ValidationError> {
        let Some(image) = comparison else {
            return Ok(if self.config.require_face_for_secure {
                IdentityCheck::Failed(Rejection::IdentityCheckRequired, None)
            } else {
                IdentityCheck::Skipped
            });
        };

        let live = match self.matcher.enroll(image) {
            Ok(fingerprint) => fingerprint,
            Err(error) => {
                return Ok(IdentityCheck::Failed(Rejection::UnusableCapture(error), None));
            }
        };

        let Some(reference) = self.reference_fingerprint(ticket).await? else {
            return Ok(IdentityCheck::Failed(Rejection::ReferenceUnavailable, None));
        };

        let similarity = BiometricMatcher::compare(&live, &reference);
        tracing::debug!(ticket_id = %ticket.id, similarity, "Compared faces");

        Ok(if self.matcher.is_match(similarity) {
            IdentityCheck::Matched(similarity)
        } else {
            IdentityCheck::Failed(Rejection::IdentityMismatch { similarity }, Some(similarity))
        })
    }

    /// Resolve and enroll the ticket's reference photo.
    ///
    /// `Ok(None)` when there is no usable photo; `Err` only when photo
    /// storage is unreachable.
    async fn reference_fingerprint(
        &self,
        ticket: &Ticket,
    ) -> Result<Option<Fingerprint>, ValidationError> {
        let Some(url) = ticket.buyer_image_url.as_deref() else {
            tracing::warn!(ticket_id = %ticket.id, "Secure ticket has no reference photo");
            return Ok(None);
        };

        let image = match self.references.fetch(url).await {
            Ok(Some(image)) => image,
            Ok(None) => {
                tracing::warn!(ticket_id = %ticket.id, url, "Reference photo missing");
                return Ok(None);
            }
            Err(error) if error.is_retryable() => {
                return Err(ValidationError::Reference(error.to_string()));
            }
            Err(error) => {
                tracing::warn!(ticket_id = %ticket.id, %error, "Reference photo unreadable");
                return Ok(None);
            }
        };

        match self.matcher.enroll(&image) {
            Ok(fingerprint) => Ok(Some(fingerprint)),
            Err(error) => {
                tracing::warn!(ticket_id = %ticket.id, %error, "Reference photo not enrollable");
                Ok(None)
            }
        }
    }

    /// Record a failed attempt. A failed append is logged, not raised.
    async fn reject(
        &self,
        ticket: &Ticket,
        attempt: ValidationRecord,
        rejection: Rejection,
    ) -> ValidationOutcome {
        let record = attempt.rejected(rejection.to_string());

        if let Err(error) = self
            .store
            .update_ticket(&ticket.id, TicketUpdate::audit(record.clone()))
            .await
        {
            tracing::warn!(ticket_id = %ticket.id, %error, "Failed to append audit record");
        }

        ValidationOutcome::Rejected {
            rejection,
            record: Some(record),
        }
    }

    async fn commit(
        &self,
        ticket: &Ticket,
        record: ValidationRecord,
    ) -> Result<ValidationOutcome, ValidationError> {
        match self
            .store
            .update_ticket(&ticket.id, TicketUpdate::admit(record.clone()))
            .await
        {
            Ok(updated) => Ok(ValidationOutcome::Admitted {
                ticket: updated,
                record,
            }),
            Err(StoreError::PreconditionFailed { actual, .. }) => {
                tracing::info!(ticket_id = %ticket.id, status = %actual, "Lost admission race");
                Ok(self.reject(ticket, record, Rejection::for_status(actual)).await)
            }
            Err(StoreError::AlreadyAdmitted(_)) => {
                tracing::warn!(ticket_id = %ticket.id, "Admission refused by recorded history");
                Ok(self.reject(ticket, record, Rejection::AlreadyUsed).await)
            }
            Err(error) => Err(error.into()),
        }
    }
}

impl std::fmt::Debug for ValidationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidationEngine")
            .field("matcher", &self.matcher)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::biometric::{MemoryReferenceImages, PreCroppedDetector};
    use crate::config::BiometricConfig;
    use crate::environment::SystemClock;
    use crate::store::MemoryTicketStore;
    use crate::types::{BuyerId, EventId, TicketId, TicketType};
    use chrono::Utc;

    fn ticket(id: &str, ticket_type: TicketType) -> Ticket {
        let buyer_image_url = ticket_type
            .requires_biometric()
            .then(|| format!("photos/{id}.png"));
        Ticket {
            id: TicketId::from(id),
            event_id: EventId::from("E1"),
            buyer_id: BuyerId::from("B1"),
            ticket_type,
            quantity: 1,
            status: TicketStatus::Active,
            buyer_image_url,
            validation_history: Vec::new(),
            purchase_date: Utc::now(),
        }
    }

    /// Horizontal bands, period in rows.
    fn banded(period: u32) -> Image {
        let pixels = (0..64 * 64)
            .map(|i| if (i / 64 / period) % 2 == 0 { 30 } else { 220 })
            .collect();
        Image::from_luma(64, 64, pixels).unwrap()
    }

    fn engine(store: &MemoryTicketStore, references: &MemoryReferenceImages) -> ValidationEngine {
        ValidationEngine::new(
            Arc::new(store.clone()),
            BiometricMatcher::new(Arc::new(PreCroppedDetector), BiometricConfig::default()),
            Arc::new(references.clone()),
            Arc::new(SystemClock),
            ValidationConfig::default(),
        )
    }

    fn context() -> ScanContext {
        ScanContext::new("staff-1", "Event Entrance")
    }

    #[tokio::test]
    async fn admits_once_then_reports_already_used() {
        let store = MemoryTicketStore::new();
        let original = ticket("T1", TicketType::Regular);
        store.create_ticket(original.clone()).await.unwrap();
        let engine = engine(&store, &MemoryReferenceImages::new());

        let first = engine
            .validate(&original.qr_payload(), None, &context())
            .await
            .unwrap();
        assert!(first.is_valid());
        assert_eq!(first.ticket().unwrap().status, TicketStatus::Used);

        let second = engine
            .validate(&original.qr_payload(), None, &context())
            .await
            .unwrap();
        assert_eq!(second.rejection(), Some(&Rejection::AlreadyUsed));
        assert_eq!(second.message(), "ticket has already been used");

        let stored = store.get_ticket(&original.id).await.unwrap().unwrap();
        assert_eq!(stored.validation_history.len(), 2);
        assert_eq!(
            stored.validation_history.iter().filter(|r| r.is_valid).count(),
            1
        );
    }

    #[tokio::test]
    async fn unknown_ticket_is_not_audited() {
        let store = MemoryTicketStore::new();
        let engine = engine(&store, &MemoryReferenceImages::new());
        let payload = codec::encode(&"T404".into(), &"E1".into(), &"B1".into());

        let outcome = engine.validate(&payload, None, &context()).await.unwrap();
        assert_eq!(outcome.rejection(), Some(&Rejection::NotFound));
        assert!(outcome.record().is_none());
    }

    #[tokio::test]
    async fn history_wins_over_active_status() {
        let store = MemoryTicketStore::new();
        let mut diverged = ticket("T1", TicketType::Regular);
        let earlier = ValidationRecord::attempt(&diverged, &context(), Utc::now()).admitted();
        diverged.validation_history.push(earlier);
        store.create_ticket(diverged.clone()).await.unwrap();

        let outcome = engine(&store, &MemoryReferenceImages::new())
            .validate(&diverged.qr_payload(), None, &context())
            .await
            .unwrap();
        assert_eq!(outcome.rejection(), Some(&Rejection::AlreadyUsed));
    }

    #[tokio::test]
    async fn secure_ticket_without_photo_is_admitted_qr_only_by_default() {
        let store = MemoryTicketStore::new();
        let secure = ticket("T2", TicketType::Secure);
        store.create_ticket(secure.clone()).await.unwrap();

        let outcome = engine(&store, &MemoryReferenceImages::new())
            .validate(&secure.qr_payload(), None, &context())
            .await
            .unwrap();
        assert!(outcome.is_valid());
        assert_eq!(outcome.record().unwrap().similarity, None);
    }

    #[tokio::test]
    async fn required_face_check_does_not_burn_ticket() {
        let store = MemoryTicketStore::new();
        let secure = ticket("T2", TicketType::Secure);
        store.create_ticket(secure.clone()).await.unwrap();
        let mut engine = engine(&store, &MemoryReferenceImages::new());
        engine.config = engine.config.with_require_face_for_secure(true);

        let outcome = engine
            .validate(&secure.qr_payload(), None, &context())
            .await
            .unwrap();
        assert_eq!(outcome.rejection(), Some(&Rejection::IdentityCheckRequired));
        assert_eq!(
            outcome.rejection().unwrap().category(),
            ErrorCategory::Identity
        );

        let stored = store.get_ticket(&secure.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TicketStatus::Active);
    }

    #[tokio::test]
    async fn matching_face_is_admitted_with_similarity() {
        let store = MemoryTicketStore::new();
        let references = MemoryReferenceImages::new();
        let secure = ticket("T2", TicketType::Secure);
        references.insert("photos/T2.png", banded(4)).unwrap();
        store.create_ticket(secure.clone()).await.unwrap();

        let outcome = engine(&store, &references)
            .validate(&secure.qr_payload(), Some(&banded(4)), &context())
            .await
            .unwrap();
        assert!(outcome.is_valid());
        let similarity = outcome.record().unwrap().similarity.unwrap();
        assert!(similarity > 0.99);
    }

    #[tokio::test]
    async fn missing_reference_is_identity_rejection() {
        let store = MemoryTicketStore::new();
        let secure = ticket("T2", TicketType::Secure);
        store.create_ticket(secure.clone()).await.unwrap();

        let outcome = engine(&store, &MemoryReferenceImages::new())
            .validate(&secure.qr_payload(), Some(&banded(4)), &context())
            .await
            .unwrap();
        assert_eq!(outcome.rejection(), Some(&Rejection::ReferenceUnavailable));
        assert_eq!(
            outcome.record().unwrap().reason.as_deref(),
            Some("reference photo unavailable")
        );
    }

    #[tokio::test]
    async fn faceless_comparison_is_input_rejection() {
        let store = MemoryTicketStore::new();
        let references = MemoryReferenceImages::new();
        let secure = ticket("T2", TicketType::Secure);
        references.insert("photos/T2.png", banded(4)).unwrap();
        store.create_ticket(secure.clone()).await.unwrap();

        let tiny = Image::from_luma(8, 8, vec![100; 64]).unwrap();
        let outcome = engine(&store, &references)
            .validate(&secure.qr_payload(), Some(&tiny), &context())
            .await
            .unwrap();
        let rejection = outcome.rejection().unwrap();
        assert!(matches!(
            rejection,
            Rejection::UnusableCapture(BiometricError::PoorFraming(_))
        ));
        assert_eq!(rejection.category(), ErrorCategory::Input);
    }

    #[test]
    fn rejection_messages() {
        assert_eq!(
            Rejection::NotActive(TicketStatus::Revoked).to_string(),
            "ticket is revoked"
        );
        assert_eq!(Rejection::for_status(TicketStatus::Used), Rejection::AlreadyUsed);
        assert_eq!(
            Rejection::for_status(TicketStatus::Expired),
            Rejection::NotActive(TicketStatus::Expired)
        );
        assert_eq!(
            Rejection::IdentityMismatch { similarity: 0.4 }.to_string(),
            "identity mismatch"
        );
    }

    #[tokio::test]
    async fn enrolled_reference_matches_live_capture() {
        let references = MemoryReferenceImages::new();
        references.insert("photos/B1.png", banded(4)).unwrap();
        let engine = engine(&MemoryTicketStore::new(), &references);

        let stored = references.fetch("photos/B1.png").await.unwrap().unwrap();
        let reference = engine.enroll_biometric(&stored).unwrap();
        let live = engine.enroll_biometric(&banded(4)).unwrap();
        let other = engine.enroll_biometric(&banded(7)).unwrap();

        assert!(BiometricMatcher::compare(&reference, &live) > 0.99);
        assert!(BiometricMatcher::compare(&reference, &other) < 0.99);

        let blank = Image::from_luma(8, 8, vec![100; 64]).unwrap();
        assert!(matches!(
            engine.enroll_biometric(&blank),
            Err(BiometricError::PoorFraming(_))
        ));
    }

    #[test]
    fn validation_error_retryability_follows_the_cause() {
        assert!(ValidationError::Store(StoreError::Unavailable("down".to_string())).is_retryable());
        assert!(!ValidationError::Store(StoreError::Serialization("bad".to_string())).is_retryable());
        assert!(ValidationError::Reference("timeout".to_string()).is_retryable());
        assert_eq!(
            ValidationError::Reference("timeout".to_string()).category(),
            ErrorCategory::Infrastructure
        );
    }
}
