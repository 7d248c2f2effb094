use std::sync::Arc;
use storefront_notify::NotificationFeed;
use storefront_order::OrderWorkflow;

use crate::metrics::Metrics;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
}

#[derive(Clone)]
pub struct AppState {
    pub orders: Arc<OrderWorkflow>,
    pub feed: Arc<NotificationFeed>,
    pub metrics: Arc<Metrics>,
    pub auth: AuthConfig,
}
