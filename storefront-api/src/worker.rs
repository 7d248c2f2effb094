use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::{BorrowedMessage, Message};
use std::sync::Arc;
use std::time::Duration;
use storefront_notify::NotificationDispatcher;
use storefront_shared::NotificationEvent;
use tracing::{error, info, warn};

const MAX_REDELIVERY_BACKOFF: Duration = Duration::from_secs(30);

/// Consumes notification events from Kafka and hands them to the dispatcher.
///
/// Offsets are committed by hand, only after `handle` succeeds. A failing
/// event is retried in place, so nothing behind it in the partition is
/// consumed out of order and nothing is lost if the worker dies. Redelivered
/// messages are harmless: the dispatcher is idempotent by event id.
pub async fn start_notification_worker(
    brokers: String,
    group_id: String,
    topic: String,
    dispatcher: Arc<NotificationDispatcher>,
) -> anyhow::Result<()> {
    let consumer: StreamConsumer = ClientConfig::new()
        .set("bootstrap.servers", &brokers)
        .set("group.id", &group_id)
        .set("enable.auto.commit", "false")
        .set("auto.offset.reset", "earliest")
        .create()?;

    consumer.subscribe(&[topic.as_str()])?;

    info!("Notification worker started, listening to {}...", topic);

    loop {
        match consumer.recv().await {
            Err(e) => error!("Kafka error: {}", e),
            Ok(m) => {
                let Some(payload) = m.payload() else {
                    warn!("Skipping empty message at offset {}", m.offset());
                    commit(&consumer, &m);
                    continue;
                };

                let event = match serde_json::from_slice::<NotificationEvent>(payload) {
                    Ok(event) => event,
                    Err(e) => {
                        // Unreadable now means unreadable forever.
                        error!(offset = m.offset(), "Error decoding notification payload: {}", e);
                        commit(&consumer, &m);
                        continue;
                    }
                };

                let mut backoff = Duration::from_millis(500);
                while let Err(e) = dispatcher.handle(&event).await {
                    error!(event_id = %event.id, ?backoff, "Notification delivery failed, retrying: {}", e);
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(MAX_REDELIVERY_BACKOFF);
                }
                commit(&consumer, &m);
            }
        }
    }
}

fn commit(consumer: &StreamConsumer, message: &BorrowedMessage<'_>) {
    if let Err(e) = consumer.commit_message(message, CommitMode::Async) {
        error!(offset = message.offset(), "Failed to commit offset: {}", e);
    }
}
