use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};
use storefront_catalog::{InventoryError, InventoryLedger, Product, Reservation};
use tracing::{debug, warn};

/// Postgres-backed ledger. The row lock taken by the conditional `UPDATE`
/// serializes reservations per product.
pub struct PgInventoryLedger {
    pool: PgPool,
}

impl PgInventoryLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Catalog-side write: add a product or overwrite its price/stock.
    pub async fn upsert(&self, product: &Product) -> Result<(), InventoryError> {
        sqlx::query(
            r#"
            INSERT INTO products (id, name, stock, unit_price)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE
            SET name = EXCLUDED.name, stock = EXCLUDED.stock,
                unit_price = EXCLUDED.unit_price, updated_at = NOW()
            "#,
        )
        .bind(product.id)
        .bind(&product.name)
        .bind(product.stock)
        .bind(product.unit_price)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }
}

pub(crate) fn backend(err: sqlx::Error) -> InventoryError {
    InventoryError::Backend(err.to_string())
}

/// Conditional decrement of one product row on `conn`.
///
/// Inside a transaction the row stays locked until it ends, and the decrement
/// only survives if that transaction commits.
pub(crate) async fn reserve_on(
    conn: &mut PgConnection,
    product_id: i64,
    quantity: u32,
) -> Result<Reservation, InventoryError> {
    if quantity == 0 {
        return Err(InventoryError::InvalidQuantity(quantity));
    }

    let reserved: Option<(Decimal,)> = sqlx::query_as(
        r#"
        UPDATE products
        SET stock = stock - $2, updated_at = NOW()
        WHERE id = $1 AND stock >= $2
        RETURNING unit_price
        "#,
    )
    .bind(product_id)
    .bind(i64::from(quantity))
    .fetch_optional(&mut *conn)
    .await
    .map_err(backend)?;

    if let Some((unit_price,)) = reserved {
        debug!(product_id, quantity, "Stock reserved");
        return Ok(Reservation {
            product_id,
            quantity,
            unit_price,
        });
    }

    // Zero rows: either the product is missing or stock was short.
    match stock_on(conn, product_id).await? {
        None => Err(InventoryError::NotFound(product_id)),
        Some(available) => Err(InventoryError::InsufficientStock {
            product_id,
            requested: quantity,
            available,
        }),
    }
}

async fn stock_on(conn: &mut PgConnection, product_id: i64) -> Result<Option<i64>, InventoryError> {
    let row: Option<(i64,)> = sqlx::query_as("SELECT stock FROM products WHERE id = $1")
        .bind(product_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(backend)?;
    Ok(row.map(|(stock,)| stock))
}

/// Put every line of an order back on its product row.
pub(crate) async fn restock_order_on(conn: &mut PgConnection, order_id: i64) -> Result<u64, InventoryError> {
    let result = sqlx::query(
        r#"
        UPDATE products p
        SET stock = p.stock + l.quantity, updated_at = NOW()
        FROM (
            SELECT product_id, SUM(quantity)::BIGINT AS quantity
            FROM order_lines
            WHERE order_id = $1
            GROUP BY product_id
        ) l
        WHERE p.id = l.product_id
        "#,
    )
    .bind(order_id)
    .execute(&mut *conn)
    .await
    .map_err(backend)?;

    debug!(order_id, products = result.rows_affected(), "Order restocked");
    Ok(result.rows_affected())
}

#[async_trait]
impl InventoryLedger for PgInventoryLedger {
    async fn reserve(&self, product_id: i64, quantity: u32) -> Result<Reservation, InventoryError> {
        let mut conn = self.pool.acquire().await.map_err(backend)?;
        reserve_on(&mut conn, product_id, quantity).await
    }

    async fn release(&self, product_id: i64, quantity: u32) -> Result<(), InventoryError> {
        if quantity == 0 {
            return Ok(());
        }

        let result = sqlx::query("UPDATE products SET stock = stock + $2, updated_at = NOW() WHERE id = $1")
            .bind(product_id)
            .bind(i64::from(quantity))
            .execute(&self.pool)
            .await
            .map_err(backend)?;

        if result.rows_affected() == 0 {
            warn!(product_id, quantity, "Release for unknown product ignored");
        }
        Ok(())
    }

    async fn available(&self, product_id: i64) -> Result<Option<i64>, InventoryError> {
        let mut conn = self.pool.acquire().await.map_err(backend)?;
        stock_on(&mut conn, product_id).await
    }
}
