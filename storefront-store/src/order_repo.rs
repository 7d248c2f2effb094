use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Transaction};
use std::collections::HashMap;
use storefront_catalog::{InventoryError, Reservation};
use storefront_core::{CoreError, CoreResult, OutboxRecord, OutboxRepository};
use storefront_order::{
    CustomerRef, GuestInfo, OrderAggregate, OrderLine, OrderRepository, OrderStatus, Placement,
};
use storefront_shared::NotificationEvent;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::database::storage;
use crate::inventory_repo::{reserve_on, restock_order_on};

/// Orders, their lines, the outbox and product stock live in one database so
/// that every order write, its stock movement and its notification commit in
/// the same transaction.
pub struct PgOrderRepository {
    pool: PgPool,
}

impl PgOrderRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load_lines(&self, order_ids: &[i64]) -> CoreResult<HashMap<i64, Vec<OrderLine>>> {
        let rows: Vec<OrderLineRow> = sqlx::query_as(
            r#"
            SELECT order_id, product_id, quantity, unit_price
            FROM order_lines
            WHERE order_id = ANY($1)
            ORDER BY order_id, position
            "#,
        )
        .bind(order_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;

        let mut lines: HashMap<i64, Vec<OrderLine>> = HashMap::new();
        for row in rows {
            let quantity = u32::try_from(row.quantity)
                .map_err(|_| CoreError::Storage(format!("order {} has a negative quantity", row.order_id)))?;
            let line = OrderLine::new(row.product_id, quantity, row.unit_price)
                .map_err(|e| CoreError::Storage(e.to_string()))?;
            lines.entry(row.order_id).or_default().push(line);
        }
        Ok(lines)
    }

    async fn hydrate(&self, rows: Vec<OrderRow>) -> CoreResult<Vec<OrderAggregate>> {
        let ids: Vec<i64> = rows.iter().map(|r| r.id).collect();
        let mut lines = self.load_lines(&ids).await?;

        rows.into_iter()
            .map(|row| {
                let order_lines = lines.remove(&row.id).unwrap_or_default();
                row.into_aggregate(order_lines)
            })
            .collect()
    }
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: i64,
    user_id: Option<i64>,
    user_email: Option<String>,
    guest_email: Option<String>,
    guest_full_name: Option<String>,
    guest_address: Option<String>,
    status: String,
    total_amount: Decimal,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl OrderRow {
    fn into_aggregate(self, lines: Vec<OrderLine>) -> CoreResult<OrderAggregate> {
        let customer = match (self.user_id, self.user_email) {
            (Some(user_id), Some(email)) => CustomerRef::Registered { user_id, email },
            _ => {
                let guest = GuestInfo::new(
                    self.guest_email.as_deref().unwrap_or_default(),
                    self.guest_full_name.as_deref().unwrap_or_default(),
                    self.guest_address.as_deref().unwrap_or_default(),
                )
                .map_err(|e| CoreError::Storage(format!("order {}: {}", self.id, e)))?;
                CustomerRef::Guest(guest)
            }
        };

        let status: OrderStatus = self
            .status
            .parse()
            .map_err(|e| CoreError::Storage(format!("order {}: {}", self.id, e)))?;

        OrderAggregate::restore(
            self.id,
            customer,
            status,
            lines,
            self.total_amount,
            self.created_at,
            self.updated_at,
        )
        .map_err(|e| CoreError::Storage(e.to_string()))
    }
}

#[derive(sqlx::FromRow)]
struct OrderLineRow {
    order_id: i64,
    product_id: i64,
    quantity: i32,
    unit_price: Decimal,
}

#[derive(sqlx::FromRow)]
struct OutboxRow {
    payload: Json<NotificationEvent>,
    attempts: i32,
    last_error: Option<String>,
    created_at: DateTime<Utc>,
}

const ORDER_COLUMNS: &str = "id, user_id, user_email, guest_email, guest_full_name, guest_address, \
     status, total_amount, created_at, updated_at";

async fn append_outbox(tx: &mut Transaction<'_, Postgres>, event: &NotificationEvent) -> CoreResult<()> {
    sqlx::query("INSERT INTO outbox (event_id, payload, created_at) VALUES ($1, $2, $3)")
        .bind(event.id)
        .bind(Json(event))
        .bind(event.created_at)
        .execute(&mut **tx)
        .await
        .map_err(storage)?;
    Ok(())
}

fn conflict_or_storage(err: sqlx::Error, what: String) -> CoreError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => CoreError::Conflict(what),
        _ => storage(err),
    }
}

/// An order being placed inside one database transaction.
///
/// Reservations decrement product rows on the same transaction as the order
/// insert, so nothing is visible to other sessions until `commit`. Dropping
/// the placement rolls everything back.
pub struct PgPlacement {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl Placement for PgPlacement {
    async fn reserve(&mut self, product_id: i64, quantity: u32) -> Result<Reservation, InventoryError> {
        reserve_on(&mut self.tx, product_id, quantity).await
    }

    async fn next_id(&mut self) -> CoreResult<i64> {
        let (id,): (i64,) = sqlx::query_as("SELECT nextval(pg_get_serial_sequence('orders', 'id'))")
            .fetch_one(&mut *self.tx)
            .await
            .map_err(storage)?;
        Ok(id)
    }

    async fn commit(self: Box<Self>, order: &OrderAggregate, outbox: &NotificationEvent) -> CoreResult<()> {
        let PgPlacement { mut tx } = *self;
        let (user_id, user_email, guest) = match order.customer() {
            CustomerRef::Registered { user_id, email } => (Some(*user_id), Some(email.as_str()), None),
            CustomerRef::Guest(guest) => (None, None, Some(guest)),
        };

        sqlx::query(
            r#"
            INSERT INTO orders (id, user_id, user_email, guest_email, guest_full_name, guest_address,
                                status, total_amount, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(order.id())
        .bind(user_id)
        .bind(user_email)
        .bind(guest.map(|g| g.email()))
        .bind(guest.map(|g| g.full_name()))
        .bind(guest.map(|g| g.address()))
        .bind(order.status().as_str())
        .bind(order.total_amount())
        .bind(order.created_at())
        .bind(order.updated_at())
        .execute(&mut *tx)
        .await
        .map_err(|e| conflict_or_storage(e, format!("order {} already exists", order.id())))?;

        for (position, line) in order.lines().iter().enumerate() {
            let quantity = i32::try_from(line.quantity())
                .map_err(|_| CoreError::Storage(format!("quantity {} out of range", line.quantity())))?;
            sqlx::query(
                r#"
                INSERT INTO order_lines (order_id, position, product_id, quantity, unit_price)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(order.id())
            .bind(position as i32)
            .bind(line.product_id())
            .bind(quantity)
            .bind(line.unit_price())
            .execute(&mut *tx)
            .await
            .map_err(storage)?;
        }

        append_outbox(&mut tx, outbox).await?;
        tx.commit().await.map_err(storage)?;
        debug!(order_id = order.id(), "Order committed");
        Ok(())
    }

    async fn rollback(self: Box<Self>) {
        let PgPlacement { tx } = *self;
        if let Err(e) = tx.rollback().await {
            warn!(error = %e, "Placement rollback failed; the connection drop discards it");
        }
    }
}

#[async_trait]
impl OrderRepository for PgOrderRepository {
    async fn begin(&self) -> CoreResult<Box<dyn Placement>> {
        let tx = self.pool.begin().await.map_err(storage)?;
        Ok(Box::new(PgPlacement { tx }))
    }

    async fn get(&self, id: i64) -> CoreResult<Option<OrderAggregate>> {
        let row: Option<OrderRow> = sqlx::query_as(&format!("SELECT {} FROM orders WHERE id = $1", ORDER_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)?;

        match row {
            Some(row) => Ok(self.hydrate(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn update_status(
        &self,
        id: i64,
        expected: OrderStatus,
        order: &OrderAggregate,
        outbox: &NotificationEvent,
    ) -> CoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(storage)?;

        let result = sqlx::query("UPDATE orders SET status = $3, updated_at = $4 WHERE id = $1 AND status = $2")
            .bind(id)
            .bind(expected.as_str())
            .bind(order.status().as_str())
            .bind(order.updated_at())
            .execute(&mut *tx)
            .await
            .map_err(storage)?;

        if result.rows_affected() == 0 {
            let exists: Option<(String,)> = sqlx::query_as("SELECT status FROM orders WHERE id = $1")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(storage)?;
            return Err(match exists {
                Some((current,)) => CoreError::Conflict(format!(
                    "order {} is {}, expected {}",
                    id, current, expected
                )),
                None => CoreError::NotFound(format!("order {}", id)),
            });
        }

        if order.status() == OrderStatus::Cancelled {
            restock_order_on(&mut tx, id)
                .await
                .map_err(|e| CoreError::Storage(e.to_string()))?;
        }

        append_outbox(&mut tx, outbox).await?;
        tx.commit().await.map_err(storage)?;
        Ok(())
    }

    async fn list_for_user(&self, user_id: i64) -> CoreResult<Vec<OrderAggregate>> {
        let rows: Vec<OrderRow> = sqlx::query_as(&format!(
            "SELECT {} FROM orders WHERE user_id = $1 ORDER BY created_at DESC, id DESC",
            ORDER_COLUMNS
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;

        self.hydrate(rows).await
    }

    async fn list_all(&self) -> CoreResult<Vec<OrderAggregate>> {
        let rows: Vec<OrderRow> = sqlx::query_as(&format!(
            "SELECT {} FROM orders ORDER BY created_at DESC, id DESC",
            ORDER_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;

        self.hydrate(rows).await
    }
}

#[async_trait]
impl OutboxRepository for PgOrderRepository {
    async fn pending(&self, limit: usize) -> CoreResult<Vec<OutboxRecord>> {
        let rows: Vec<OutboxRow> = sqlx::query_as(
            r#"
            SELECT payload, attempts, last_error, created_at
            FROM outbox
            WHERE dispatched_at IS NULL
            ORDER BY seq
            LIMIT $1
            "#,
        )
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;

        Ok(rows
            .into_iter()
            .map(|row| OutboxRecord {
                event: row.payload.0,
                attempts: u32::try_from(row.attempts).unwrap_or_default(),
                last_error: row.last_error,
                created_at: row.created_at,
            })
            .collect())
    }

    async fn mark_dispatched(&self, event_id: Uuid) -> CoreResult<()> {
        let result = sqlx::query("UPDATE outbox SET dispatched_at = NOW() WHERE event_id = $1")
            .bind(event_id)
            .execute(&self.pool)
            .await
            .map_err(storage)?;
        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound(format!("outbox record {}", event_id)));
        }
        Ok(())
    }

    async fn record_failure(&self, event_id: Uuid, error: &str) -> CoreResult<()> {
        sqlx::query("UPDATE outbox SET attempts = attempts + 1, last_error = $2 WHERE event_id = $1")
            .bind(event_id)
            .bind(error)
            .execute(&self.pool)
            .await
            .map_err(storage)?;
        Ok(())
    }
}
