use storefront_catalog::InventoryError;
use storefront_core::CoreError;

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum OrderError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Product not found: {0}")]
    ProductNotFound(i64),

    #[error("Order not found: {0}")]
    OrderNotFound(i64),

    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("Insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: i64,
        requested: u32,
        available: i64,
    },

    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition {
        from: String,
        to: String,
    },

    #[error("Concurrent modification: {0}")]
    ConcurrencyConflict(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<InventoryError> for OrderError {
    fn from(err: InventoryError) -> Self {
        match err {
            InventoryError::NotFound(product_id) => OrderError::ProductNotFound(product_id),
            InventoryError::InsufficientStock { product_id, requested, available } => {
                OrderError::InsufficientStock { product_id, requested, available }
            }
            InventoryError::ConcurrencyConflict { .. } => OrderError::ConcurrencyConflict(err.to_string()),
            InventoryError::InvalidQuantity(_) => OrderError::Validation(err.to_string()),
            InventoryError::Backend(msg) => OrderError::Internal(msg),
        }
    }
}

impl From<CoreError> for OrderError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Conflict(msg) => OrderError::ConcurrencyConflict(msg),
            other => OrderError::Internal(other.to_string()),
        }
    }
}
