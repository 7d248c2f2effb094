use async_trait::async_trait;
use storefront_shared::NotificationEvent;
use tokio::sync::{mpsc, oneshot};

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum PublishError {
    #[error("Publisher channel closed")]
    Closed,

    #[error("Failed to encode event: {0}")]
    Encode(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Consumer rejected event: {0}")]
    Rejected(String),
}

/// Hands committed notification events to whatever delivers them.
///
/// `Ok` means the event is durably someone else's problem; only then may the
/// caller forget about it.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, event: &NotificationEvent) -> Result<(), PublishError>;
}

/// One event in flight on the in-process channel. The consumer answers on
/// `ack` once it has handled the event, or with the reason it could not.
#[derive(Debug)]
pub struct Envelope {
    pub event: NotificationEvent,
    pub ack: oneshot::Sender<Result<(), String>>,
}

impl Envelope {
    /// The receiver may already be gone; the publisher then reports `Closed`.
    pub fn settle(self, outcome: Result<(), String>) {
        let _ = self.ack.send(outcome);
    }
}

/// In-process publisher feeding a dispatcher running in the same binary.
/// `publish` resolves only after the dispatcher has acked the event.
#[derive(Clone)]
pub struct ChannelPublisher {
    tx: mpsc::UnboundedSender<Envelope>,
}

impl ChannelPublisher {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Envelope>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl Publisher for ChannelPublisher {
    async fn publish(&self, event: &NotificationEvent) -> Result<(), PublishError> {
        let (ack, acked) = oneshot::channel();
        self.tx
            .send(Envelope {
                event: event.clone(),
                ack,
            })
            .map_err(|_| PublishError::Closed)?;

        match acked.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(reason)) => Err(PublishError::Rejected(reason)),
            Err(_) => Err(PublishError::Closed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_waits_for_ack_and_keeps_order() {
        let (publisher, mut rx) = ChannelPublisher::channel();
        let first = NotificationEvent::order_created(1, "a@example.com");
        let second = NotificationEvent::order_status_changed(1, "PROCESSING", "a@example.com");

        let consumer = tokio::spawn(async move {
            let mut seen = Vec::new();
            while let Some(envelope) = rx.recv().await {
                seen.push(envelope.event.id);
                envelope.settle(Ok(()));
            }
            seen
        });

        publisher.publish(&first).await.unwrap();
        publisher.publish(&second).await.unwrap();
        drop(publisher);

        assert_eq!(consumer.await.unwrap(), vec![first.id, second.id]);
    }

    #[tokio::test]
    async fn rejected_event_is_reported() {
        let (publisher, mut rx) = ChannelPublisher::channel();
        tokio::spawn(async move {
            if let Some(envelope) = rx.recv().await {
                envelope.settle(Err("provider timeout".to_string()));
            }
        });

        let event = NotificationEvent::order_created(1, "a@example.com");
        assert_eq!(
            publisher.publish(&event).await,
            Err(PublishError::Rejected("provider timeout".to_string()))
        );
    }

    #[tokio::test]
    async fn dropped_envelope_or_receiver_is_closed() {
        let (publisher, mut rx) = ChannelPublisher::channel();
        let event = NotificationEvent::order_created(1, "a@example.com");

        let consumer = tokio::spawn(async move {
            // Dropped unanswered.
            let envelope = rx.recv().await;
            drop(envelope);
            rx
        });
        assert_eq!(publisher.publish(&event).await, Err(PublishError::Closed));

        drop(consumer.await.unwrap());
        assert_eq!(publisher.publish(&event).await, Err(PublishError::Closed));
    }
}
