use axum::{
    extract::{rejection::JsonRejection, State},
    handler::Handler,
    middleware::from_fn_with_state,
    routing::post,
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use storefront_order::{CustomerRef, GuestContact, LineRequest, OrderAggregate, OrderStatus};

use crate::error::AppError;
use crate::middleware::{customer_auth_middleware, optional_auth_middleware, Caller, Claims};
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub items: Vec<LineRequest>,
    pub guest_info: Option<GuestContact>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemResponse {
    pub product_id: i64,
    pub quantity: u32,
    pub unit_price: Decimal,
    pub line_total: Decimal,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub id: i64,
    pub status: OrderStatus,
    pub total_amount: Decimal,
    pub items: Vec<OrderItemResponse>,
    /// Email of the account or guest the order belongs to.
    pub customer_ref: String,
    pub user_id: Option<i64>,
    pub guest: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&OrderAggregate> for OrderResponse {
    fn from(order: &OrderAggregate) -> Self {
        Self {
            id: order.id(),
            status: order.status(),
            total_amount: order.total_amount(),
            items: order
                .lines()
                .iter()
                .map(|line| OrderItemResponse {
                    product_id: line.product_id(),
                    quantity: line.quantity(),
                    unit_price: line.unit_price(),
                    line_total: line.line_total(),
                })
                .collect(),
            customer_ref: order.customer().recipient().to_string(),
            user_id: order.customer().user_id(),
            guest: matches!(order.customer(), CustomerRef::Guest(_)),
            created_at: order.created_at(),
            updated_at: order.updated_at(),
        }
    }
}

// ============================================================================
// Routes
// ============================================================================

pub fn routes(state: AppState) -> Router<AppState> {
    Router::new().route(
        "/orders",
        post(create_order.layer(from_fn_with_state(state.clone(), optional_auth_middleware)))
            .get(list_orders.layer(from_fn_with_state(state, customer_auth_middleware))),
    )
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /orders
///
/// Authenticated callers order for their own account; anonymous callers must
/// supply `guestInfo`.
pub async fn create_order(
    State(state): State<AppState>,
    Extension(Caller(caller)): Extension<Caller>,
    payload: Result<Json<CreateOrderRequest>, JsonRejection>,
) -> Result<Json<OrderResponse>, AppError> {
    let result = place_order(&state, caller, payload).await;

    match &result {
        Ok(_) => state.metrics.orders_created.inc(),
        Err(err) => state
            .metrics
            .order_rejections
            .with_label_values(&[err.reason()])
            .inc(),
    }

    result.map(Json)
}

async fn place_order(
    state: &AppState,
    caller: Option<Claims>,
    payload: Result<Json<CreateOrderRequest>, JsonRejection>,
) -> Result<OrderResponse, AppError> {
    let Json(request) = payload.map_err(|e| AppError::ValidationError(e.body_text()))?;
    let identity = caller.as_ref().map(|claims| claims.sub.as_str());

    let order = state
        .orders
        .create_order(identity, &request.items, request.guest_info)
        .await?;

    Ok(OrderResponse::from(&order))
}

/// GET /orders
pub async fn list_orders(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<OrderResponse>>, AppError> {
    let orders = state.orders.orders_for(&claims.sub).await?;
    Ok(Json(orders.iter().map(OrderResponse::from).collect()))
}
