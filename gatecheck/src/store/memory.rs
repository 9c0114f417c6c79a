//! In-memory ticket store.

use super::{StoreError, TicketStore, TicketUpdate};
use crate::types::{Ticket, TicketId};
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};

/// Mutex-guarded map of tickets.
///
/// Each operation holds the lock for its whole read-modify-write, so
/// conditional updates are atomic across tasks. Clones share the map.
#[derive(Debug, Clone, Default)]
pub struct MemoryTicketStore {
    tickets: Arc<Mutex<HashMap<TicketId, Ticket>>>,
}

impl MemoryTicketStore {
    /// Creates an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored tickets
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().map(|tickets| tickets.len()).unwrap_or(0)
    }

    /// Returns `true` if no tickets are stored
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<TicketId, Ticket>>, StoreError> {
        self.tickets
            .lock()
            .map_err(|_| StoreError::Unavailable("ticket map lock poisoned".to_string()))
    }
}

impl TicketStore for MemoryTicketStore {
    fn create_ticket(
        &self,
        ticket: Ticket,
    ) -> Pin<Box<dyn Future<Output = Result<(), StoreError>> + Send + '_>> {
        Box::pin(async move {
            let mut tickets = self.lock()?;
            if tickets.contains_key(&ticket.id) {
                return Err(StoreError::AlreadyExists(ticket.id));
            }
            tickets.insert(ticket.id.clone(), ticket);
            Ok(())
        })
    }

    fn get_ticket(
        &self,
        id: &TicketId,
    ) -> Pin<Box<dyn Future<Output = Result<Option<Ticket>, StoreError>> + Send + '_>> {
        let id = id.clone();
        Box::pin(async move { Ok(self.lock()?.get(&id).cloned()) })
    }

    fn update_ticket(
        &self,
        id: &TicketId,
        update: TicketUpdate,
    ) -> Pin<Box<dyn Future<Output = Result<Ticket, StoreError>> + Send + '_>> {
        let id = id.clone();
        Box::pin(async move {
            let mut tickets = self.lock()?;
            let ticket = tickets
                .get_mut(&id)
                .ok_or_else(|| StoreError::NotFound(id.clone()))?;
            update.apply_to(ticket)?;
            Ok(ticket.clone())
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::{BuyerId, EventId, ScanContext, TicketStatus, TicketType, ValidationRecord};
    use chrono::Utc;

    fn ticket(id: &str) -> Ticket {
        Ticket {
            id: TicketId::from(id),
            event_id: EventId::from("E1"),
            buyer_id: BuyerId::from("B1"),
            ticket_type: TicketType::Regular,
            quantity: 1,
            status: TicketStatus::Active,
            buyer_image_url: None,
            validation_history: Vec::new(),
            purchase_date: Utc::now(),
        }
    }

    #[tokio::test]
    async fn create_get_and_duplicate() {
        let store = MemoryTicketStore::new();
        store.create_ticket(ticket("T1")).await.unwrap();

        assert_eq!(store.len(), 1);
        assert!(store.get_ticket(&"T1".into()).await.unwrap().is_some());
        assert!(store.get_ticket(&"T2".into()).await.unwrap().is_none());

        let err = store.create_ticket(ticket("T1")).await.unwrap_err();
        assert_eq!(err, StoreError::AlreadyExists(TicketId::from("T1")));
    }

    #[tokio::test]
    async fn update_missing_ticket_is_not_found() {
        let store = MemoryTicketStore::new();
        let err = store
            .update_ticket(
                &"T9".into(),
                TicketUpdate::transition(TicketStatus::Active, TicketStatus::Revoked),
            )
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::NotFound(TicketId::from("T9")));
    }

    #[tokio::test]
    async fn concurrent_admits_succeed_once() {
        let store = MemoryTicketStore::new();
        let original = ticket("T1");
        store.create_ticket(original.clone()).await.unwrap();

        let mut handles = Vec::new();
        for n in 0..8 {
            let store = store.clone();
            let context = ScanContext::new(format!("scanner-{n}"), "Door");
            let record = ValidationRecord::attempt(&original, &context, Utc::now()).admitted();
            handles.push(tokio::spawn(async move {
                store
                    .update_ticket(&"T1".into(), TicketUpdate::admit(record))
                    .await
            }));
        }

        let mut admitted = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 1);

        let stored = store.get_ticket(&"T1".into()).await.unwrap().unwrap();
        assert_eq!(stored.status, TicketStatus::Used);
        assert_eq!(stored.validation_history.len(), 1);
    }
}
