use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use std::time::Duration;
use storefront_notify::{PublishError, Publisher};
use storefront_shared::NotificationEvent;
use tracing::{debug, error};

/// Publishes notification events to a Kafka topic, keyed by recipient so
/// one recipient's events stay in one partition and keep their order.
#[derive(Clone)]
pub struct EventProducer {
    producer: FutureProducer,
    topic: String,
}

impl EventProducer {
    pub fn new(brokers: &str, topic: &str) -> Result<Self, rdkafka::error::KafkaError> {
        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("message.timeout.ms", "5000")
            .create()?;

        Ok(Self {
            producer,
            topic: topic.to_string(),
        })
    }
}

#[async_trait]
impl Publisher for EventProducer {
    async fn publish(&self, event: &NotificationEvent) -> Result<(), PublishError> {
        let payload = serde_json::to_string(event).map_err(|e| PublishError::Encode(e.to_string()))?;
        let record = FutureRecord::to(&self.topic).key(&event.recipient).payload(&payload);

        match self.producer.send(record, Timeout::After(Duration::from_secs(0))).await {
            Ok(delivery) => {
                debug!(
                    event_id = %event.id,
                    "Sent notification to {}: partition {} offset {}",
                    self.topic, delivery.partition, delivery.offset
                );
                Ok(())
            }
            Err((e, _msg)) => {
                error!("Failed to send notification to {}: {}", self.topic, e);
                Err(PublishError::Transport(e.to_string()))
            }
        }
    }
}
