use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use std::sync::Arc;
use std::time::Duration;
use storefront_core::NotificationRepository;
use storefront_shared::NotificationEvent;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::publisher::Envelope;
use crate::NotifyError;

/// Out-of-band delivery channel (email, push, SMS).
#[async_trait]
pub trait DeliverySink: Send + Sync {
    async fn deliver(&self, event: &NotificationEvent) -> Result<(), NotifyError>;
}

/// Writes each alert to the log. Stands in for a real delivery provider.
pub struct LogSink;

#[async_trait]
impl DeliverySink for LogSink {
    async fn deliver(&self, event: &NotificationEvent) -> Result<(), NotifyError> {
        info!(
            event_id = %event.id,
            kind = event.kind.as_str(),
            recipient = %mask_recipient(&event.recipient),
            reference_id = event.reference_id,
            "ALERT: {}",
            event.message
        );
        Ok(())
    }
}

/// `jane.doe@example.com` -> `j***@example.com`
fn mask_recipient(recipient: &str) -> String {
    match recipient.split_once('@') {
        Some((local, domain)) => {
            let first = local.chars().next().map(String::from).unwrap_or_default();
            format!("{}***@{}", first, domain)
        }
        None => "***".to_string(),
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.initial_backoff)
            .with_max_delay(self.max_backoff)
            .with_max_times(self.max_attempts.saturating_sub(1))
            .with_jitter()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    /// The event id was already delivered; nothing was sent again.
    Duplicate,
}

/// Consumes published events: records each one in the recipient's feed and
/// hands it to the delivery sink exactly once per event id, however many
/// times the event is received.
pub struct NotificationDispatcher {
    notifications: Arc<dyn NotificationRepository>,
    sink: Arc<dyn DeliverySink>,
    retry: RetryPolicy,
}

impl NotificationDispatcher {
    pub fn new(
        notifications: Arc<dyn NotificationRepository>,
        sink: Arc<dyn DeliverySink>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            notifications,
            sink,
            retry,
        }
    }

    pub async fn handle(&self, event: &NotificationEvent) -> Result<DeliveryOutcome, NotifyError> {
        // 1. Feed record first, so the in-app feed has it whatever happens to delivery
        let created = (|| async { self.notifications.insert_if_absent(event).await })
            .retry(self.retry.backoff())
            .notify(|e, delay| warn!(event_id = %event.id, ?delay, "Retrying feed write: {}", e))
            .await?;

        // 2. Redelivered event: skip the sink if it already went out
        if !created && self.notifications.is_delivered(event.id).await? {
            debug!(event_id = %event.id, "Duplicate notification ignored");
            return Ok(DeliveryOutcome::Duplicate);
        }

        // 3. Deliver with backoff
        (|| async { self.sink.deliver(event).await })
            .retry(self.retry.backoff())
            .notify(|e, delay| warn!(event_id = %event.id, ?delay, "Retrying delivery: {}", e))
            .await?;

        // 4. Remember it went out
        self.notifications.mark_delivered(event.id).await?;
        Ok(DeliveryOutcome::Delivered)
    }

    /// Drain an in-process channel until every sender is gone. Each envelope
    /// is acked with the outcome of `handle`; a failed event is nacked so the
    /// publisher keeps it pending.
    pub async fn run(self: Arc<Self>, mut rx: mpsc::UnboundedReceiver<Envelope>) {
        info!("Notification dispatcher started");
        while let Some(envelope) = rx.recv().await {
            let outcome = match self.handle(&envelope.event).await {
                Ok(_) => Ok(()),
                Err(e) => {
                    error!(event_id = %envelope.event.id, "Notification delivery failed: {}", e);
                    Err(e.to_string())
                }
            };
            envelope.settle(outcome);
        }
        info!("Notification dispatcher stopped");
    }
}
