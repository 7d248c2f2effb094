use axum::{
    extract::{Path, State},
    http::StatusCode,
    middleware::from_fn_with_state,
    routing::{get, put},
    Extension, Json, Router,
};
use serde_json::{json, Value};
use storefront_shared::NotificationEvent;
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::{customer_auth_middleware, Claims};
use crate::state::AppState;

/// Every route is scoped to the caller's own feed (the token subject).
pub fn routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/notifications", get(list_notifications))
        .route("/notifications/unread-count", get(unread_count))
        .route("/notifications/read-all", put(mark_all_read))
        .route("/notifications/{id}/read", put(mark_read))
        .route_layer(from_fn_with_state(state, customer_auth_middleware))
}

/// GET /notifications
pub async fn list_notifications(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<NotificationEvent>>, AppError> {
    Ok(Json(state.feed.list_for(&claims.sub).await?))
}

/// GET /notifications/unread-count
pub async fn unread_count(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Value>, AppError> {
    let count = state.feed.unread_count_for(&claims.sub).await?;
    Ok(Json(json!({ "count": count })))
}

/// PUT /notifications/{id}/read
pub async fn mark_read(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.feed.mark_read(&claims.sub, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// PUT /notifications/read-all
pub async fn mark_all_read(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Value>, AppError> {
    let updated = state.feed.mark_all_read(&claims.sub).await?;
    Ok(Json(json!({ "updated": updated })))
}
