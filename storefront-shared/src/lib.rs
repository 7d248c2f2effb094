pub mod models;
pub mod pii;

pub use models::events::{canonical_recipient, NotificationEvent, NotificationType};
pub use pii::Masked;
