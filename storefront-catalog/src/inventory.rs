use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, warn};

use crate::product::Product;

/// Stock taken from a product for one order line.
///
/// `unit_price` is read under the same lock as the decrement, so the order
/// line price is the price at the moment the stock was secured.
#[derive(Debug, Clone, PartialEq)]
pub struct Reservation {
    pub product_id: i64,
    pub quantity: u32,
    pub unit_price: Decimal,
}

/// Exclusive authority over a product's available stock.
///
/// `reserve` must be linearizable per product: a check-and-decrement that
/// can never drive stock below zero, whatever the interleaving of callers.
#[async_trait]
pub trait InventoryLedger: Send + Sync {
    async fn reserve(&self, product_id: i64, quantity: u32) -> Result<Reservation, InventoryError>;

    /// Compensating increment. Succeeds for any quantity previously reserved.
    async fn release(&self, product_id: i64, quantity: u32) -> Result<(), InventoryError>;

    async fn available(&self, product_id: i64) -> Result<Option<i64>, InventoryError>;
}

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum InventoryError {
    #[error("Product not found: {0}")]
    NotFound(i64),

    #[error("Insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: i64,
        requested: u32,
        available: i64,
    },

    #[error("Concurrent update on product {product_id} after {attempts} attempts")]
    ConcurrencyConflict {
        product_id: i64,
        attempts: u32,
    },

    #[error("Invalid reservation quantity: {0}")]
    InvalidQuantity(u32),

    #[error("Inventory backend error: {0}")]
    Backend(String),
}

#[derive(Debug)]
struct StockEntry {
    name: String,
    stock: i64,
    unit_price: Decimal,
}

/// In-process ledger with one lock per product.
///
/// The outer map lock is only held to find a product's entry; the check and
/// decrement run under that product's own mutex, so products never contend
/// with each other.
#[derive(Default)]
pub struct InMemoryInventoryLedger {
    products: RwLock<HashMap<i64, Arc<Mutex<StockEntry>>>>,
}

impl InMemoryInventoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_products(products: impl IntoIterator<Item = Product>) -> Self {
        let ledger = Self::new();
        for product in products {
            ledger.upsert(product);
        }
        ledger
    }

    /// Catalog-side write: add a product or overwrite its price/stock.
    pub fn upsert(&self, product: Product) {
        let entry = StockEntry {
            name: product.name,
            stock: product.stock,
            unit_price: product.unit_price,
        };

        match self.products.write() {
            Ok(mut products) => {
                products.insert(product.id, Arc::new(Mutex::new(entry)));
            }
            Err(poisoned) => {
                poisoned.into_inner().insert(product.id, Arc::new(Mutex::new(entry)));
            }
        }
    }

    /// Catalog-side price change. Reservations already taken keep their price.
    pub fn set_price(&self, product_id: i64, unit_price: Decimal) -> Result<(), InventoryError> {
        let entry = self.entry(product_id)?.ok_or(InventoryError::NotFound(product_id))?;
        let mut entry = entry.lock().map_err(|_| poisoned())?;
        entry.unit_price = unit_price;
        Ok(())
    }

    pub fn get(&self, product_id: i64) -> Option<Product> {
        let entry = self.entry(product_id).ok()??;
        let entry = entry.lock().ok()?;
        Some(Product {
            id: product_id,
            name: entry.name.clone(),
            stock: entry.stock,
            unit_price: entry.unit_price,
        })
    }

    fn entry(&self, product_id: i64) -> Result<Option<Arc<Mutex<StockEntry>>>, InventoryError> {
        let products = self.products.read().map_err(|_| poisoned())?;
        Ok(products.get(&product_id).cloned())
    }
}

fn poisoned() -> InventoryError {
    InventoryError::Backend("inventory lock poisoned".to_string())
}

#[async_trait]
impl InventoryLedger for InMemoryInventoryLedger {
    async fn reserve(&self, product_id: i64, quantity: u32) -> Result<Reservation, InventoryError> {
        if quantity == 0 {
            return Err(InventoryError::InvalidQuantity(quantity));
        }

        let entry = self.entry(product_id)?.ok_or(InventoryError::NotFound(product_id))?;
        let mut entry = entry.lock().map_err(|_| poisoned())?;

        if entry.stock < i64::from(quantity) {
            return Err(InventoryError::InsufficientStock {
                product_id,
                requested: quantity,
                available: entry.stock,
            });
        }

        entry.stock -= i64::from(quantity);
        debug!(product_id, quantity, remaining = entry.stock, "Stock reserved");

        Ok(Reservation {
            product_id,
            quantity,
            unit_price: entry.unit_price,
        })
    }

    async fn release(&self, product_id: i64, quantity: u32) -> Result<(), InventoryError> {
        if quantity == 0 {
            return Ok(());
        }

        let Some(entry) = self.entry(product_id)? else {
            warn!(product_id, quantity, "Release for unknown product ignored");
            return Ok(());
        };
        let mut entry = entry.lock().map_err(|_| poisoned())?;

        entry.stock = entry
            .stock
            .checked_add(i64::from(quantity))
            .ok_or_else(|| InventoryError::Backend(format!("stock overflow on product {}", product_id)))?;
        debug!(product_id, quantity, remaining = entry.stock, "Stock released");

        Ok(())
    }

    async fn available(&self, product_id: i64) -> Result<Option<i64>, InventoryError> {
        match self.entry(product_id)? {
            Some(entry) => Ok(Some(entry.lock().map_err(|_| poisoned())?.stock)),
            None => Ok(None),
        }
    }
}
