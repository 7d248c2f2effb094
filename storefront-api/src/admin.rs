use axum::{
    extract::{Path, State},
    middleware::from_fn_with_state,
    routing::{get, put},
    Extension, Json, Router,
};
use serde::Deserialize;
use storefront_order::OrderStatus;
use tracing::info;

use crate::error::AppError;
use crate::middleware::{admin_auth_middleware, Claims};
use crate::orders::OrderResponse;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

pub fn routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/orders/{id}/status", put(update_order_status))
        .route("/admin/orders", get(list_all_orders))
        .route_layer(from_fn_with_state(state, admin_auth_middleware))
}

/// PUT /orders/{id}/status
pub async fn update_order_status(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(order_id): Path<i64>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<Json<OrderResponse>, AppError> {
    let next: OrderStatus = req.status.parse()?;

    let order = state.orders.transition(order_id, next, &claims.sub).await?;
    state
        .metrics
        .status_transitions
        .with_label_values(&[next.as_str()])
        .inc();

    info!(order_id, status = %next, "Admin updated order status");
    Ok(Json(OrderResponse::from(&order)))
}

/// GET /admin/orders
pub async fn list_all_orders(State(state): State<AppState>) -> Result<Json<Vec<OrderResponse>>, AppError> {
    let orders = state.orders.all_orders().await?;
    Ok(Json(orders.iter().map(OrderResponse::from).collect()))
}
