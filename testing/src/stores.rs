//! Ticket and photo stores with injectable failures and synchronisation points.

use gatecheck::biometric::{BiometricError, MemoryReferenceImages, ReferenceImages};
use gatecheck::capture::Image;
use gatecheck::store::{MemoryTicketStore, StoreError, TicketStore, TicketUpdate};
use gatecheck::types::{Ticket, TicketId};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::Barrier;

/// Memory store that can be switched offline and counts reads.
#[derive(Debug, Clone, Default)]
pub struct FlakyTicketStore {
    inner: MemoryTicketStore,
    unavailable: Arc<AtomicBool>,
    fail_audits: Arc<AtomicBool>,
    reads: Arc<AtomicUsize>,
}

impl FlakyTicketStore {
    /// Creates an empty, healthy store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Underlying store, for seeding and inspection
    #[must_use]
    pub const fn inner(&self) -> &MemoryTicketStore {
        &self.inner
    }

    /// Fail every call with `Unavailable`
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Fail unconditional updates (audit appends) only
    pub fn fail_audits(&self, fail: bool) {
        self.fail_audits.store(fail, Ordering::SeqCst);
    }

    /// `get_ticket` calls so far
    #[must_use]
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("connection refused".to_string()));
        }
        Ok(())
    }
}

impl TicketStore for FlakyTicketStore {
    fn create_ticket(
        &self,
        ticket: Ticket,
    ) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + '_>> {
        Box::pin(async move {
            self.check()?;
            self.inner.create_ticket(ticket).await
        })
    }

    fn get_ticket(
        &self,
        id: &TicketId,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Ticket>, StoreError>> + Send + '_>> {
        let id = id.clone();
        Box::pin(async move {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.check()?;
            self.inner.get_ticket(&id).await
        })
    }

    fn update_ticket(
        &self,
        id: &TicketId,
        update: TicketUpdate,
    ) -> Pin<Box<dyn Future<Output = Result<Ticket, StoreError>> + Send + '_>> {
        let id = id.clone();
        Box::pin(async move {
            self.check()?;
            if update.expected_status.is_none() && self.fail_audits.load(Ordering::SeqCst) {
                return Err(StoreError::Unavailable("audit write timed out".to_string()));
            }
            self.inner.update_ticket(&id, update).await
        })
    }
}

/// Store whose reads wait until `parties` readers have arrived.
///
/// Forces concurrent validations to all observe the same pre-write state,
/// so only the conditional write can separate them.
#[derive(Debug, Clone)]
pub struct GatedTicketStore {
    inner: MemoryTicketStore,
    barrier: Arc<Barrier>,
}

impl GatedTicketStore {
    /// Gate reads of `inner` behind a barrier of `parties`
    #[must_use]
    pub fn new(inner: MemoryTicketStore, parties: usize) -> Self {
        Self {
            inner,
            barrier: Arc::new(Barrier::new(parties)),
        }
    }
}

impl TicketStore for GatedTicketStore {
    fn create_ticket(
        &self,
        ticket: Ticket,
    ) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + '_>> {
        self.inner.create_ticket(ticket)
    }

    fn get_ticket(
        &self,
        id: &TicketId,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Ticket>, StoreError>> + Send + '_>> {
        let id = id.clone();
        Box::pin(async move {
            let ticket = self.inner.get_ticket(&id).await?;
            self.barrier.wait().await;
            Ok(ticket)
        })
    }

    fn update_ticket(
        &self,
        id: &TicketId,
        update: TicketUpdate,
    ) -> Pin<Box<dyn Future<Output = Result<Ticket, StoreError>> + Send + '_>> {
        self.inner.update_ticket(id, update)
    }
}

/// Reference photo store that can be switched offline.
#[derive(Debug, Clone, Default)]
pub struct FlakyReferenceImages {
    inner: MemoryReferenceImages,
    unavailable: Arc<AtomicBool>,
    fetches: Arc<AtomicUsize>,
}

impl FlakyReferenceImages {
    /// Wrap `inner`, initially reachable
    #[must_use]
    pub fn new(inner: MemoryReferenceImages) -> Self {
        Self {
            inner,
            ..Self::default()
        }
    }

    /// Fail every fetch with `ReferenceUnavailable`
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// `fetch` calls so far
    #[must_use]
    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl ReferenceImages for FlakyReferenceImages {
    fn fetch(
        &self,
        url: &str,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Image>, BiometricError>> + Send + '_>> {
        let url = url.to_string();
        Box::pin(async move {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if self.unavailable.load(Ordering::SeqCst) {
                return Err(BiometricError::ReferenceUnavailable(
                    "photo storage timed out".to_string(),
                ));
            }
            self.inner.fetch(&url).await
        })
    }
}
