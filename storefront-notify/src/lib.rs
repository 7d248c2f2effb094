pub mod dispatcher;
pub mod feed;
pub mod publisher;
pub mod relay;

pub use dispatcher::{DeliveryOutcome, DeliverySink, LogSink, NotificationDispatcher, RetryPolicy};
pub use feed::NotificationFeed;
pub use publisher::{ChannelPublisher, Envelope, PublishError, Publisher};
pub use relay::OutboxRelay;

use storefront_core::CoreError;
use uuid::Uuid;

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Notification not found: {0}")]
    NotFound(Uuid),

    #[error("Delivery failed: {0}")]
    Delivery(String),

    #[error(transparent)]
    Storage(#[from] CoreError),
}
