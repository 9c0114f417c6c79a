//! Ticket persistence.
//!
//! The store is the only shared state between scanners. Everything the
//! validation engine decides is written back through [`TicketStore::update_ticket`],
//! whose optional status precondition turns "check active, append record,
//! flip to used" into one conditional write.
//!
//! # Implementations
//!
//! - [`MemoryTicketStore`]: mutex-guarded map, for tests and single-process use
//! - [`RedisTicketStore`]: shared store for multiple scanners; conditional
//!   updates run as a Lua script

use crate::config::StoreConfig;
use crate::types::{Ticket, TicketId, TicketStatus, ValidationRecord};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;

pub mod memory;
pub mod redis;

pub use memory::MemoryTicketStore;
pub use redis::RedisTicketStore;

/// Errors that can occur during ticket store operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// No ticket with this id.
    #[error("Ticket not found: {0}")]
    NotFound(TicketId),

    /// `create_ticket` with an id that is already taken.
    #[error("Ticket already exists: {0}")]
    AlreadyExists(TicketId),

    /// Conditional update lost: the ticket's status changed since it was read.
    #[error("Precondition failed for {ticket_id}: expected {expected}, found {actual}")]
    PreconditionFailed {
        /// Ticket being updated
        ticket_id: TicketId,
        /// Status the caller required
        expected: TicketStatus,
        /// Status found at write time
        actual: TicketStatus,
    },

    /// Conditional admit lost: the history already holds a successful record.
    #[error("Ticket already admitted: {0}")]
    AlreadyAdmitted(TicketId),

    /// Backend unreachable or failed.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Stored document could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl StoreError {
    /// Returns `true` if the same call may succeed later.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// Partial update applied atomically by [`TicketStore::update_ticket`].
///
/// All parts are optional. If `expected_status` is set and does not match the
/// stored status, or `require_unadmitted` is set and the history already has
/// an `isValid` record, nothing is written.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TicketUpdate {
    /// Required current status
    pub expected_status: Option<TicketStatus>,
    /// Refuse if any earlier attempt was admitted
    pub require_unadmitted: bool,
    /// New status
    pub status: Option<TicketStatus>,
    /// Record appended to the validation history
    pub append: Option<ValidationRecord>,
}

impl TicketUpdate {
    /// Admit: `active → used` plus the successful record, or nothing.
    ///
    /// Requires both an `active` status and a history without a successful
    /// record.
    #[must_use]
    pub const fn admit(record: ValidationRecord) -> Self {
        Self {
            expected_status: Some(TicketStatus::Active),
            require_unadmitted: true,
            status: Some(TicketStatus::Used),
            append: Some(record),
        }
    }

    /// Audit a failed attempt. Unconditional, status untouched.
    #[must_use]
    pub const fn audit(record: ValidationRecord) -> Self {
        Self {
            expected_status: None,
            require_unadmitted: false,
            status: None,
            append: Some(record),
        }
    }

    /// Conditional status change without a record.
    #[must_use]
    pub const fn transition(from: TicketStatus, to: TicketStatus) -> Self {
        Self {
            expected_status: Some(from),
            require_unadmitted: false,
            status: Some(to),
            append: None,
        }
    }

    /// Apply to an in-memory ticket, checking the precondition first.
    ///
    /// # Errors
    ///
    /// - [`StoreError::PreconditionFailed`] if `expected_status` does not match
    /// - [`StoreError::AlreadyAdmitted`] if `require_unadmitted` does not hold
    ///
    /// Either way `ticket` is left unchanged.
    pub fn apply_to(self, ticket: &mut Ticket) -> Result<(), StoreError> {
        if let Some(expected) = self.expected_status {
            if ticket.status != expected {
                return Err(StoreError::PreconditionFailed {
                    ticket_id: ticket.id.clone(),
                    expected,
                    actual: ticket.status,
                });
            }
        }
        if self.require_unadmitted && ticket.has_been_admitted() {
            return Err(StoreError::AlreadyAdmitted(ticket.id.clone()));
        }
        if let Some(status) = self.status {
            ticket.status = status;
        }
        if let Some(record) = self.append {
            ticket.validation_history.push(record);
        }
        Ok(())
    }
}

/// Ticket persistence interface.
///
/// # Dyn Compatibility
///
/// Uses explicit `Pin<Box<dyn Future>>` returns so the engine and issuer can
/// hold an `Arc<dyn TicketStore>`.
pub trait TicketStore: Send + Sync {
    /// Persist a new ticket.
    ///
    /// # Errors
    ///
    /// - `AlreadyExists`: the id is taken
    /// - `Unavailable`/`Serialization`: backend failure
    fn create_ticket(
        &self,
        ticket: Ticket,
    ) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + '_>>;

    /// Fetch a ticket by id, `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// - `Unavailable`/`Serialization`: backend failure
    fn get_ticket(
        &self,
        id: &TicketId,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Ticket>, StoreError>> + Send + '_>>;

    /// Apply a partial update atomically and return the updated ticket.
    ///
    /// The precondition check, status change and history append happen as
    /// one step: concurrent callers expecting `active` cannot both succeed.
    ///
    /// # Errors
    ///
    /// - `NotFound`: no such ticket
    /// - `PreconditionFailed`: `expected_status` did not hold; nothing written
    /// - `AlreadyAdmitted`: `require_unadmitted` did not hold; nothing written
    /// - `Unavailable`/`Serialization`: backend failure
    fn update_ticket(
        &self,
        id: &TicketId,
        update: TicketUpdate,
    ) -> Pin<Box<dyn Future<Output = Result<Ticket, StoreError>> + Send + '_>>;
}

/// Open the store selected by `config`.
///
/// A configured `redis_url` selects [`RedisTicketStore`]; otherwise tickets
/// live in a fresh [`MemoryTicketStore`].
///
/// # Errors
///
/// Returns [`StoreError::Unavailable`] if Redis cannot be reached.
pub async fn connect(config: &StoreConfig) -> Result<Arc<dyn TicketStore>, StoreError> {
    if config.redis_url.is_some() {
        let store = RedisTicketStore::from_config(config).await?;
        return Ok(Arc::new(store));
    }
    tracing::info!("No Redis URL configured, using in-memory ticket store");
    Ok(Arc::new(MemoryTicketStore::new()))
}
