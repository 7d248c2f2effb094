use axum::{extract::State, http::header, response::IntoResponse};
use prometheus::{Encoder, IntCounter, IntCounterVec, Opts, Registry, TextEncoder};

use crate::error::AppError;
use crate::state::AppState;

// ============================================================================
// Prometheus metrics, scraped via GET /metrics
// ============================================================================

pub struct Metrics {
    registry: Registry,
    pub orders_created: IntCounter,
    pub order_rejections: IntCounterVec,
    pub status_transitions: IntCounterVec,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let orders_created = IntCounter::new("storefront_orders_created_total", "Orders successfully placed")?;
        registry.register(Box::new(orders_created.clone()))?;

        let order_rejections = IntCounterVec::new(
            Opts::new("storefront_order_rejections_total", "Order placements rejected, by reason"),
            &["reason"],
        )?;
        registry.register(Box::new(order_rejections.clone()))?;

        let status_transitions = IntCounterVec::new(
            Opts::new("storefront_status_transitions_total", "Order status changes, by target status"),
            &["status"],
        )?;
        registry.register(Box::new(status_transitions.clone()))?;

        Ok(Self {
            registry,
            orders_created,
            order_rejections,
            status_transitions,
        })
    }

    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

pub async fn metrics_handler(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let body = state
        .metrics
        .render()
        .map_err(|e| AppError::InternalServerError(e.to_string()))?;
    Ok(([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body))
}
