use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use storefront_notify::NotifyError;
use storefront_order::OrderError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    AuthenticationError(String),
    #[error("{0}")]
    AuthorizationError(String),
    #[error("{0}")]
    ValidationError(String),
    #[error("{0}")]
    NotFoundError(String),
    #[error("{0}")]
    ConflictError(String),
    #[error("{0}")]
    UnprocessableError(String),
    #[error("{0}")]
    InternalServerError(String),
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::AuthenticationError(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::AuthorizationError(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFoundError(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::ConflictError(msg) => (StatusCode::CONFLICT, msg),
            AppError::UnprocessableError(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg),
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
            }
            AppError::Anyhow(err) => {
                tracing::error!("Internal Server Error: {}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

impl From<OrderError> for AppError {
    fn from(err: OrderError) -> Self {
        let message = err.to_string();
        match err {
            OrderError::Validation(_) => AppError::ValidationError(message),
            OrderError::ProductNotFound(_) | OrderError::OrderNotFound(_) | OrderError::UserNotFound(_) => {
                AppError::NotFoundError(message)
            }
            OrderError::InsufficientStock { .. } | OrderError::ConcurrencyConflict(_) => {
                AppError::ConflictError(message)
            }
            OrderError::InvalidStateTransition { .. } => AppError::UnprocessableError(message),
            OrderError::Internal(_) => AppError::InternalServerError(message),
        }
    }
}

impl From<NotifyError> for AppError {
    fn from(err: NotifyError) -> Self {
        match err {
            NotifyError::NotFound(_) => AppError::NotFoundError(err.to_string()),
            other => AppError::InternalServerError(other.to_string()),
        }
    }
}

impl AppError {
    /// Label for the order rejection counter.
    pub fn reason(&self) -> &'static str {
        match self {
            AppError::AuthenticationError(_) | AppError::AuthorizationError(_) => "unauthorized",
            AppError::ValidationError(_) => "validation",
            AppError::NotFoundError(_) => "not_found",
            AppError::ConflictError(_) => "conflict",
            AppError::UnprocessableError(_) => "invalid_transition",
            AppError::InternalServerError(_) | AppError::Anyhow(_) => "internal",
        }
    }
}
