use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationType {
    OrderCreated,
    OrderStatusChanged,
}

impl NotificationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationType::OrderCreated => "ORDER_CREATED",
            NotificationType::OrderStatusChanged => "ORDER_STATUS_CHANGED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ORDER_CREATED" => Some(NotificationType::OrderCreated),
            "ORDER_STATUS_CHANGED" => Some(NotificationType::OrderStatusChanged),
            _ => None,
        }
    }
}

/// A user-facing alert about one of the recipient's orders.
///
/// Created once by the producing step (order commit or status change) and
/// afterwards only mutated to flip `read`. The `id` is the idempotency key for
/// every consumer-side effect.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NotificationEvent {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub message: String,
    pub recipient: String,
    pub reference_id: i64,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub read: bool,
}

/// Recipients are email addresses compared without regard to case or
/// surrounding whitespace. Every stored event and every feed lookup goes
/// through this.
pub fn canonical_recipient(recipient: &str) -> String {
    recipient.trim().to_lowercase()
}

impl NotificationEvent {
    pub fn new(kind: NotificationType, message: String, recipient: String, reference_id: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            message,
            recipient: canonical_recipient(&recipient),
            reference_id,
            created_at: Utc::now(),
            read: false,
        }
    }

    pub fn order_created(order_id: i64, recipient: &str) -> Self {
        Self::new(
            NotificationType::OrderCreated,
            format!("Order #{} created successfully.", order_id),
            recipient.to_string(),
            order_id,
        )
    }

    pub fn order_status_changed(order_id: i64, status: &str, recipient: &str) -> Self {
        Self::new(
            NotificationType::OrderStatusChanged,
            format!("Your order #{} is now {}", order_id, status),
            recipient.to_string(),
            order_id,
        )
    }
}
