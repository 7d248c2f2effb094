use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Mutex;
use storefront_shared::NotificationEvent;
use uuid::Uuid;

use crate::{CoreError, CoreResult};

/// Recipient feed store. Every write is idempotent by event id.
#[async_trait]
pub trait NotificationRepository: Send + Sync {
    /// Store the event unless a record with the same id exists.
    /// Returns `true` when a new record was created.
    async fn insert_if_absent(&self, event: &NotificationEvent) -> CoreResult<bool>;

    async fn find(&self, id: Uuid) -> CoreResult<Option<NotificationEvent>>;

    async fn is_delivered(&self, id: Uuid) -> CoreResult<bool>;

    async fn mark_delivered(&self, id: Uuid) -> CoreResult<()>;

    /// Newest first.
    async fn list_for(&self, recipient: &str) -> CoreResult<Vec<NotificationEvent>>;

    async fn unread_count_for(&self, recipient: &str) -> CoreResult<u64>;

    /// Returns `true` if the record flipped from unread to read.
    async fn mark_read(&self, id: Uuid) -> CoreResult<bool>;

    /// Returns the number of records that flipped.
    async fn mark_all_read(&self, recipient: &str) -> CoreResult<u64>;
}

/// A notification written in the same unit of work as the order change it
/// describes, waiting to be relayed to the publisher.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboxRecord {
    pub event: NotificationEvent,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl OutboxRecord {
    pub fn new(event: NotificationEvent) -> Self {
        Self {
            created_at: event.created_at,
            event,
            attempts: 0,
            last_error: None,
        }
    }
}

/// Read side of the outbox. Records are appended by the order repository
/// inside its own transaction, so there is no `insert` here.
#[async_trait]
pub trait OutboxRepository: Send + Sync {
    /// Oldest first, at most `limit` undispatched records.
    async fn pending(&self, limit: usize) -> CoreResult<Vec<OutboxRecord>>;

    async fn mark_dispatched(&self, event_id: Uuid) -> CoreResult<()>;

    async fn record_failure(&self, event_id: Uuid, error: &str) -> CoreResult<()>;
}

#[derive(Debug, Clone)]
struct StoredNotification {
    event: NotificationEvent,
    delivered_at: Option<DateTime<Utc>>,
}

#[derive(Default)]
pub struct InMemoryNotificationRepository {
    records: Mutex<Vec<StoredNotification>>,
}

impl InMemoryNotificationRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn records(&self) -> CoreResult<std::sync::MutexGuard<'_, Vec<StoredNotification>>> {
        self.records
            .lock()
            .map_err(|_| CoreError::Storage("notification store lock poisoned".to_string()))
    }
}

#[async_trait]
impl NotificationRepository for InMemoryNotificationRepository {
    async fn insert_if_absent(&self, event: &NotificationEvent) -> CoreResult<bool> {
        let mut records = self.records()?;
        if records.iter().any(|r| r.event.id == event.id) {
            return Ok(false);
        }
        records.push(StoredNotification {
            event: event.clone(),
            delivered_at: None,
        });
        Ok(true)
    }

    async fn find(&self, id: Uuid) -> CoreResult<Option<NotificationEvent>> {
        let records = self.records()?;
        Ok(records.iter().find(|r| r.event.id == id).map(|r| r.event.clone()))
    }

    async fn is_delivered(&self, id: Uuid) -> CoreResult<bool> {
        let records = self.records()?;
        Ok(records
            .iter()
            .any(|r| r.event.id == id && r.delivered_at.is_some()))
    }

    async fn mark_delivered(&self, id: Uuid) -> CoreResult<()> {
        let mut records = self.records()?;
        let record = records
            .iter_mut()
            .find(|r| r.event.id == id)
            .ok_or_else(|| CoreError::NotFound(format!("notification {}", id)))?;
        if record.delivered_at.is_none() {
            record.delivered_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn list_for(&self, recipient: &str) -> CoreResult<Vec<NotificationEvent>> {
        let records = self.records()?;
        let mut events: Vec<NotificationEvent> = records
            .iter()
            .filter(|r| r.event.recipient == recipient)
            .map(|r| r.event.clone())
            .collect();
        events.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(events)
    }

    async fn unread_count_for(&self, recipient: &str) -> CoreResult<u64> {
        let records = self.records()?;
        Ok(records
            .iter()
            .filter(|r| r.event.recipient == recipient && !r.event.read)
            .count() as u64)
    }

    async fn mark_read(&self, id: Uuid) -> CoreResult<bool> {
        let mut records = self.records()?;
        let record = records
            .iter_mut()
            .find(|r| r.event.id == id)
            .ok_or_else(|| CoreError::NotFound(format!("notification {}", id)))?;
        let flipped = !record.event.read;
        record.event.read = true;
        Ok(flipped)
    }

    async fn mark_all_read(&self, recipient: &str) -> CoreResult<u64> {
        let mut records = self.records()?;
        let mut flipped = 0;
        for record in records
            .iter_mut()
            .filter(|r| r.event.recipient == recipient && !r.event.read)
        {
            record.event.read = true;
            flipped += 1;
        }
        Ok(flipped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn insert_is_idempotent_by_id() {
        let repo = InMemoryNotificationRepository::new();
        let event = NotificationEvent::order_created(1, "a@b.com");

        assert!(repo.insert_if_absent(&event).await.unwrap());
        assert!(!repo.insert_if_absent(&event).await.unwrap());
        assert_eq!(repo.list_for("a@b.com").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn read_flags_only_flip_once() {
        let repo = InMemoryNotificationRepository::new();
        let first = NotificationEvent::order_created(1, "a@b.com");
        let second = NotificationEvent::order_status_changed(1, "SHIPPED", "a@b.com");
        let foreign = NotificationEvent::order_created(2, "c@d.com");
        for event in [&first, &second, &foreign] {
            repo.insert_if_absent(event).await.unwrap();
        }

        assert_eq!(repo.unread_count_for("a@b.com").await.unwrap(), 2);
        assert!(repo.mark_read(first.id).await.unwrap());
        assert!(!repo.mark_read(first.id).await.unwrap());
        assert_eq!(repo.mark_all_read("a@b.com").await.unwrap(), 1);
        assert_eq!(repo.mark_all_read("a@b.com").await.unwrap(), 0);
        assert_eq!(repo.unread_count_for("c@d.com").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn delivery_marker() {
        let repo = InMemoryNotificationRepository::new();
        let event = NotificationEvent::order_created(1, "a@b.com");
        repo.insert_if_absent(&event).await.unwrap();

        assert!(!repo.is_delivered(event.id).await.unwrap());
        repo.mark_delivered(event.id).await.unwrap();
        assert!(repo.is_delivered(event.id).await.unwrap());
        assert!(matches!(
            repo.mark_delivered(Uuid::new_v4()).await,
            Err(CoreError::NotFound(_))
        ));
    }
}
