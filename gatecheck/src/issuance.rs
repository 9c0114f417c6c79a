//! Ticket issuance and administrative status changes.

use crate::codec::{self, MAX_PAYLOAD_BYTES};
use crate::environment::Clock;
use crate::error::ErrorCategory;
use crate::metrics::TICKETS_ISSUED_TOTAL;
use crate::store::{StoreError, TicketStore, TicketUpdate};
use crate::types::{BuyerId, EventId, Ticket, TicketId, TicketStatus, TicketType};
use std::sync::Arc;
use thiserror::Error;

/// Errors from issuing or administering tickets.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IssueError {
    /// A ticket must admit at least one person.
    #[error("Ticket quantity must be at least 1")]
    ZeroQuantity,

    /// Event and buyer ids end up in the QR payload and must be non-blank.
    #[error("Ticket {field} must not be blank")]
    BlankId {
        /// Payload key of the blank id
        field: &'static str,
    },

    /// The QR payload would be larger than scanners accept.
    #[error("QR payload would be {bytes} bytes, limit is {}", MAX_PAYLOAD_BYTES)]
    PayloadTooLarge {
        /// Encoded payload size
        bytes: usize,
    },

    /// Secure tickets are bound to a buyer photo.
    #[error("Secure tickets require a buyer image")]
    MissingBuyerImage,

    /// Only secure tickets carry a buyer photo.
    #[error("Only secure tickets may carry a buyer image (got {0})")]
    UnexpectedBuyerImage(TicketType),

    /// No such ticket.
    #[error("Ticket not found: {0}")]
    NotFound(TicketId),

    /// Administrative transitions only apply to active tickets.
    #[error("Ticket {ticket_id} is {status}, not active")]
    NotActive {
        /// Ticket
        ticket_id: TicketId,
        /// Current status
        status: TicketStatus,
    },

    /// Store failure.
    #[error(transparent)]
    Store(StoreError),
}

impl IssueError {
    /// Classify the failure
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::ZeroQuantity
            | Self::BlankId { .. }
            | Self::PayloadTooLarge { .. }
            | Self::MissingBuyerImage
            | Self::UnexpectedBuyerImage(_) => ErrorCategory::Input,
            Self::NotFound(_) | Self::NotActive { .. } => ErrorCategory::Lookup,
            Self::Store(error) => error.category(),
        }
    }

    /// Returns `true` if the same call may succeed later
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Store(error) => error.is_retryable(),
            _ => false,
        }
    }
}

impl From<StoreError> for IssueError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::NotFound(id) => Self::NotFound(id),
            StoreError::PreconditionFailed {
                ticket_id, actual, ..
            } => Self::NotActive {
                ticket_id,
                status: actual,
            },
            other => Self::Store(other),
        }
    }
}

/// Purchase details for a new ticket.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IssueRequest {
    /// Event the ticket admits to
    pub event_id: EventId,
    /// Purchasing account
    pub buyer_id: BuyerId,
    /// Tier
    pub ticket_type: TicketType,
    /// Admissions granted
    pub quantity: u32,
    /// Reference photo, required for secure tickets
    pub buyer_image_url: Option<String>,
}

impl IssueRequest {
    /// Single regular admission
    #[must_use]
    pub fn regular(event_id: impl Into<EventId>, buyer_id: impl Into<BuyerId>) -> Self {
        Self {
            event_id: event_id.into(),
            buyer_id: buyer_id.into(),
            ticket_type: TicketType::Regular,
            quantity: 1,
            buyer_image_url: None,
        }
    }

    /// Single secure admission bound to a buyer photo
    #[must_use]
    pub fn secure(
        event_id: impl Into<EventId>,
        buyer_id: impl Into<BuyerId>,
        buyer_image_url: impl Into<String>,
    ) -> Self {
        Self {
            event_id: event_id.into(),
            buyer_id: buyer_id.into(),
            ticket_type: TicketType::Secure,
            quantity: 1,
            buyer_image_url: Some(buyer_image_url.into()),
        }
    }

    /// Set the tier
    #[must_use]
    pub fn with_ticket_type(mut self, ticket_type: TicketType) -> Self {
        self.ticket_type = ticket_type.canonical();
        self
    }

    /// Set the quantity
    #[must_use]
    pub const fn with_quantity(mut self, quantity: u32) -> Self {
        self.quantity = quantity;
        self
    }

    /// Refuse requests whose ticket could never be admitted by its own QR code.
    fn check(&self, id: &TicketId) -> Result<(), IssueError> {
        if self.quantity == 0 {
            return Err(IssueError::ZeroQuantity);
        }
        if self.event_id.as_str().trim().is_empty() {
            return Err(IssueError::BlankId {
                field: codec::EVENT_ID_KEY,
            });
        }
        if self.buyer_id.as_str().trim().is_empty() {
            return Err(IssueError::BlankId {
                field: codec::BUYER_ID_KEY,
            });
        }
        let bytes = codec::encode(id, &self.event_id, &self.buyer_id).len();
        if bytes > MAX_PAYLOAD_BYTES {
            return Err(IssueError::PayloadTooLarge { bytes });
        }
        match (self.ticket_type.requires_biometric(), &self.buyer_image_url) {
            (true, None) => Err(IssueError::MissingBuyerImage),
            (true, Some(url)) if url.trim().is_empty() => Err(IssueError::MissingBuyerImage),
            (false, Some(_)) => Err(IssueError::UnexpectedBuyerImage(self.ticket_type.clone())),
            _ => Ok(()),
        }
    }
}

/// Creates tickets and applies administrative status changes.
#[derive(Clone)]
pub struct TicketIssuer {
    store: Arc<dyn TicketStore>,
    clock: Arc<dyn Clock>,
}

impl TicketIssuer {
    /// Creates an issuer over a store
    #[must_use]
    pub fn new(store: Arc<dyn TicketStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Issue a new active ticket.
    ///
    /// # Errors
    ///
    /// - [`IssueError::ZeroQuantity`], [`IssueError::BlankId`],
    ///   [`IssueError::PayloadTooLarge`], [`IssueError::MissingBuyerImage`],
    ///   [`IssueError::UnexpectedBuyerImage`] for invalid requests
    /// - [`IssueError::Store`] if the ticket cannot be persisted
    pub async fn issue(&self, request: IssueRequest) -> Result<Ticket, IssueError> {
        let request = IssueRequest {
            ticket_type: request.ticket_type.canonical(),
            ..request
        };
        let id = TicketId::new();
        request.check(&id)?;

        let ticket = Ticket {
            id,
            event_id: request.event_id,
            buyer_id: request.buyer_id,
            ticket_type: request.ticket_type,
            quantity: request.quantity,
            status: TicketStatus::Active,
            buyer_image_url: request.buyer_image_url,
            validation_history: Vec::new(),
            purchase_date: self.clock.now(),
        };

        self.store
            .create_ticket(ticket.clone())
            .await
            .map_err(IssueError::Store)?;

        metrics::counter!(TICKETS_ISSUED_TOTAL, "ticket_type" => ticket.ticket_type.to_string())
            .increment(1);
        tracing::info!(
            ticket_id = %ticket.id,
            event_id = %ticket.event_id,
            ticket_type = %ticket.ticket_type,
            "Issued ticket"
        );

        Ok(ticket)
    }

    /// Revoke an active ticket.
    ///
    /// # Errors
    ///
    /// - [`IssueError::NotFound`] if there is no such ticket
    /// - [`IssueError::NotActive`] if it is not active
    /// - [`IssueError::Store`] on store failure
    pub async fn revoke(&self, id: &TicketId) -> Result<Ticket, IssueError> {
        self.transition(id, TicketStatus::Revoked).await
    }

    /// Expire an active ticket.
    ///
    /// # Errors
    ///
    /// Same as [`TicketIssuer::revoke`].
    pub async fn expire(&self, id: &TicketId) -> Result<Ticket, IssueError> {
        self.transition(id, TicketStatus::Expired).await
    }

    async fn transition(&self, id: &TicketId, to: TicketStatus) -> Result<Ticket, IssueError> {
        let ticket = self
            .store
            .update_ticket(id, TicketUpdate::transition(TicketStatus::Active, to))
            .await?;
        tracing::info!(ticket_id = %id, status = %to, "Ticket status changed");
        Ok(ticket)
    }
}

impl std::fmt::Debug for TicketIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TicketIssuer").finish_non_exhaustive()
    }
}
