use std::sync::Arc;
use std::time::Duration;
use storefront_core::OutboxRepository;
use tracing::{debug, error, warn};

use crate::publisher::Publisher;
use crate::NotifyError;

/// Moves committed outbox records to the publisher.
///
/// Records are relayed oldest first and marked dispatched only once the
/// publisher has confirmed them. A publish failure stops the batch so a later
/// event for the same order is never published ahead of an earlier one; the
/// failed record stays pending and is retried on the next pass.
pub struct OutboxRelay {
    outbox: Arc<dyn OutboxRepository>,
    publisher: Arc<dyn Publisher>,
    batch_size: usize,
}

impl OutboxRelay {
    pub fn new(outbox: Arc<dyn OutboxRepository>, publisher: Arc<dyn Publisher>, batch_size: usize) -> Self {
        Self {
            outbox,
            publisher,
            batch_size: batch_size.max(1),
        }
    }

    /// One pass over the pending records. Returns how many were published.
    pub async fn relay_once(&self) -> Result<usize, NotifyError> {
        let pending = self.outbox.pending(self.batch_size).await?;
        let mut published = 0;

        for record in pending {
            let event_id = record.event.id;
            match self.publisher.publish(&record.event).await {
                Ok(()) => {
                    self.outbox.mark_dispatched(event_id).await?;
                    published += 1;
                }
                Err(e) => {
                    warn!(%event_id, attempts = record.attempts + 1, "Failed to publish notification: {}", e);
                    self.outbox.record_failure(event_id, &e.to_string()).await?;
                    break;
                }
            }
        }

        if published > 0 {
            debug!(published, "Outbox relay pass complete");
        }
        Ok(published)
    }

    pub async fn run(self, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if let Err(e) = self.relay_once().await {
                error!("Outbox relay pass failed: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::publisher::{ChannelPublisher, PublishError};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use storefront_core::{CoreResult, OutboxRecord};
    use storefront_shared::NotificationEvent;
    use uuid::Uuid;

    #[derive(Default)]
    struct VecOutbox {
        records: Mutex<Vec<(OutboxRecord, bool)>>,
    }

    impl VecOutbox {
        fn push(&self, event: NotificationEvent) {
            self.records.lock().unwrap().push((OutboxRecord::new(event), false));
        }
    }

    #[async_trait]
    impl OutboxRepository for VecOutbox {
        async fn pending(&self, limit: usize) -> CoreResult<Vec<OutboxRecord>> {
            let records = self.records.lock().unwrap();
            Ok(records.iter().filter(|(_, done)| !done).take(limit).map(|(r, _)| r.clone()).collect())
        }

        async fn mark_dispatched(&self, event_id: Uuid) -> CoreResult<()> {
            let mut records = self.records.lock().unwrap();
            for (record, done) in records.iter_mut() {
                if record.event.id == event_id {
                    *done = true;
                }
            }
            Ok(())
        }

        async fn record_failure(&self, event_id: Uuid, error: &str) -> CoreResult<()> {
            let mut records = self.records.lock().unwrap();
            for (record, _) in records.iter_mut() {
                if record.event.id == event_id {
                    record.attempts += 1;
                    record.last_error = Some(error.to_string());
                }
            }
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingPublisher {
        fail_on: Option<Uuid>,
        published: Mutex<Vec<Uuid>>,
    }

    #[async_trait]
    impl Publisher for RecordingPublisher {
        async fn publish(&self, event: &NotificationEvent) -> Result<(), PublishError> {
            if self.fail_on == Some(event.id) {
                return Err(PublishError::Transport("broker unavailable".to_string()));
            }
            self.published.lock().unwrap().push(event.id);
            Ok(())
        }
    }

    #[tokio::test]
    async fn relays_pending_records_in_order() {
        let outbox = Arc::new(VecOutbox::default());
        let publisher = Arc::new(RecordingPublisher::default());
        let events: Vec<NotificationEvent> =
            (1..=3).map(|id| NotificationEvent::order_created(id, "a@example.com")).collect();
        for event in &events {
            outbox.push(event.clone());
        }

        let relay = OutboxRelay::new(outbox.clone(), publisher.clone(), 2);
        assert_eq!(relay.relay_once().await.unwrap(), 2);
        assert_eq!(relay.relay_once().await.unwrap(), 1);
        assert_eq!(relay.relay_once().await.unwrap(), 0);

        let ids: Vec<Uuid> = events.iter().map(|e| e.id).collect();
        assert_eq!(*publisher.published.lock().unwrap(), ids);
    }

    #[tokio::test]
    async fn failure_stops_batch_and_keeps_record_pending() {
        let outbox = Arc::new(VecOutbox::default());
        let first = NotificationEvent::order_created(1, "a@example.com");
        let second = NotificationEvent::order_created(2, "a@example.com");
        outbox.push(first.clone());
        outbox.push(second.clone());

        let publisher = Arc::new(RecordingPublisher {
            fail_on: Some(first.id),
            ..Default::default()
        });
        let relay = OutboxRelay::new(outbox.clone(), publisher.clone(), 10);

        assert_eq!(relay.relay_once().await.unwrap(), 0);
        assert!(publisher.published.lock().unwrap().is_empty());

        let pending = outbox.pending(10).await.unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].attempts, 1);
        assert!(pending[0].last_error.as_deref().unwrap().contains("broker unavailable"));
    }

    #[tokio::test]
    async fn nacked_event_stays_pending_until_acked() {
        let outbox = Arc::new(VecOutbox::default());
        let event = NotificationEvent::order_created(1, "a@example.com");
        outbox.push(event.clone());

        let (publisher, mut rx) = ChannelPublisher::channel();
        let consumer = tokio::spawn(async move {
            let mut answers = vec![Err("provider timeout".to_string()), Ok(())].into_iter();
            while let Some(envelope) = rx.recv().await {
                envelope.settle(answers.next().unwrap_or(Ok(())));
            }
        });

        let relay = OutboxRelay::new(outbox.clone(), Arc::new(publisher), 10);
        assert_eq!(relay.relay_once().await.unwrap(), 0);
        let pending = outbox.pending(10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert!(pending[0].last_error.as_deref().unwrap().contains("provider timeout"));

        assert_eq!(relay.relay_once().await.unwrap(), 1);
        assert!(outbox.pending(10).await.unwrap().is_empty());

        drop(relay);
        consumer.await.unwrap();
    }
}
