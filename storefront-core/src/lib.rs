pub mod identity;
pub mod repository;

pub use identity::{IdentityDirectory, InMemoryIdentityDirectory, Role, UserAccount};
pub use repository::{
    InMemoryNotificationRepository, NotificationRepository, OutboxRecord, OutboxRepository,
};

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum CoreError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Conflicting concurrent update: {0}")]
    Conflict(String),
    #[error("Storage failure: {0}")]
    Storage(String),
    #[error("Identity lookup failed: {0}")]
    IdentityError(String),
}

pub type CoreResult<T> = Result<T, CoreError>;
