use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use storefront_catalog::Reservation;
use storefront_core::{CoreError, IdentityDirectory};
use storefront_shared::NotificationEvent;
use tracing::{error, info, warn};

use crate::error::OrderError;
use crate::models::{CustomerRef, GuestInfo, OrderAggregate, OrderLine, OrderStatus};
use crate::repository::{OrderRepository, Placement};

/// Largest quantity a single line may carry; stored as a 32-bit column.
pub const MAX_LINE_QUANTITY: i64 = i32::MAX as i64;

/// One requested line as received from the client. Quantity is kept wide so
/// zero and negative values reach validation instead of failing to parse.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineRequest {
    pub product_id: i64,
    pub quantity: i64,
}

/// Guest contact as received from the client, before validation.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuestContact {
    pub email: String,
    pub full_name: String,
    pub address: String,
}

/// Places orders and moves them through their lifecycle.
///
/// Creation runs inside one `Placement`: stock for every line is reserved,
/// then the order and its outbox record are committed with it. Any failure
/// before the commit rolls back everything taken so far.
pub struct OrderWorkflow {
    orders: Arc<dyn OrderRepository>,
    identities: Arc<dyn IdentityDirectory>,
}

impl OrderWorkflow {
    pub fn new(orders: Arc<dyn OrderRepository>, identities: Arc<dyn IdentityDirectory>) -> Self {
        Self { orders, identities }
    }

    pub async fn create_order(
        &self,
        identity_email: Option<&str>,
        lines: &[LineRequest],
        guest: Option<GuestContact>,
    ) -> Result<OrderAggregate, OrderError> {
        // 1. Resolve who is ordering
        let customer = self.resolve_customer(identity_email, guest).await?;

        // 2. Validate the request shape before touching stock
        if lines.is_empty() {
            return Err(OrderError::Validation("Order must contain at least one item".to_string()));
        }
        let mut requested = Vec::with_capacity(lines.len());
        for line in lines {
            let quantity = Some(line.quantity)
                .filter(|q| (1..=MAX_LINE_QUANTITY).contains(q))
                .and_then(|q| u32::try_from(q).ok())
                .ok_or_else(|| {
                    OrderError::Validation(format!(
                        "Quantity for product {} must be between 1 and {}",
                        line.product_id, MAX_LINE_QUANTITY
                    ))
                })?;
            requested.push((line.product_id, quantity));
        }

        // 3. Reserve stock. Rows are taken in product id order so concurrent
        //    placements never wait on each other in a cycle.
        let mut placement = self.orders.begin().await.map_err(internal)?;
        let mut by_product: Vec<usize> = (0..requested.len()).collect();
        by_product.sort_by_key(|&i| requested[i].0);

        let mut taken = Vec::with_capacity(requested.len());
        for i in by_product {
            let (product_id, quantity) = requested[i];
            match placement.reserve(product_id, quantity).await {
                Ok(reservation) => taken.push((i, reservation)),
                Err(e) => {
                    warn!(product_id, quantity, "Order rejected: {}", e);
                    placement.rollback().await;
                    return Err(e.into());
                }
            }
        }
        taken.sort_by_key(|(i, _)| *i);
        let reserved: Vec<Reservation> = taken.into_iter().map(|(_, r)| r).collect();

        // 4. Build the order and its notification
        let (order, event) = match draft(&mut *placement, customer, &reserved).await {
            Ok(draft) => draft,
            Err(e) => {
                error!("Failed to build order, releasing stock: {}", e);
                placement.rollback().await;
                return Err(e);
            }
        };

        // 5. Stock, order and notification become durable together
        placement.commit(&order, &event).await.map_err(internal)?;
        info!(
            order_id = order.id(),
            total = %order.total_amount(),
            lines = order.lines().len(),
            "Order created"
        );

        Ok(order)
    }

    async fn resolve_customer(
        &self,
        identity_email: Option<&str>,
        guest: Option<GuestContact>,
    ) -> Result<CustomerRef, OrderError> {
        match (identity_email, guest) {
            (Some(email), None) => {
                let account = self
                    .identities
                    .find_by_email(email)
                    .await?
                    .ok_or_else(|| OrderError::UserNotFound(email.to_string()))?;
                Ok(CustomerRef::Registered {
                    user_id: account.id,
                    email: account.email,
                })
            }
            (None, Some(guest)) => Ok(CustomerRef::Guest(GuestInfo::try_from(guest)?)),
            (Some(_), Some(_)) => Err(OrderError::Validation(
                "Authenticated requests must not carry guest details".to_string(),
            )),
            (None, None) => Err(OrderError::Validation(
                "Guest checkout requires email, fullName and address".to_string(),
            )),
        }
    }

    /// Admin status change. Cancelling returns the order's stock to the ledger
    /// in the same unit of work as the status write.
    pub async fn transition(
        &self,
        order_id: i64,
        next: OrderStatus,
        actor: &str,
    ) -> Result<OrderAggregate, OrderError> {
        let mut order = self
            .orders
            .get(order_id)
            .await?
            .ok_or(OrderError::OrderNotFound(order_id))?;

        let previous = order.transition_to(next)?;
        let event = NotificationEvent::order_status_changed(
            order.id(),
            next.as_str(),
            order.customer().recipient(),
        );

        self.orders
            .update_status(order_id, previous, &order, &event)
            .await
            .map_err(|e| match e {
                CoreError::NotFound(_) => OrderError::OrderNotFound(order_id),
                other => OrderError::from(other),
            })?;

        info!(order_id, from = %previous, to = %next, actor, "Order status changed");
        Ok(order)
    }

    pub async fn get_order(&self, order_id: i64) -> Result<OrderAggregate, OrderError> {
        self.orders
            .get(order_id)
            .await?
            .ok_or(OrderError::OrderNotFound(order_id))
    }

    /// Orders of a registered customer, most recent first.
    pub async fn orders_for(&self, identity_email: &str) -> Result<Vec<OrderAggregate>, OrderError> {
        let account = self
            .identities
            .find_by_email(identity_email)
            .await?
            .ok_or_else(|| OrderError::UserNotFound(identity_email.to_string()))?;
        Ok(self.orders.list_for_user(account.id).await?)
    }

    pub async fn all_orders(&self) -> Result<Vec<OrderAggregate>, OrderError> {
        Ok(self.orders.list_all().await?)
    }
}

async fn draft(
    placement: &mut dyn Placement,
    customer: CustomerRef,
    reserved: &[Reservation],
) -> Result<(OrderAggregate, NotificationEvent), OrderError> {
    let lines = reserved
        .iter()
        .map(|r| OrderLine::new(r.product_id, r.quantity, r.unit_price))
        .collect::<Result<Vec<_>, _>>()?;

    let id = placement.next_id().await.map_err(internal)?;
    let order = OrderAggregate::create(id, customer, lines, Utc::now())?;
    let event = NotificationEvent::order_created(order.id(), order.customer().recipient());
    Ok((order, event))
}

fn internal(err: CoreError) -> OrderError {
    OrderError::Internal(err.to_string())
}
