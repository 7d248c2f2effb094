use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Catalog product as seen by the order core.
///
/// The catalog owns products; this crate only reads the price and, through
/// the inventory ledger, mutates `stock`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub stock: i64,
    pub unit_price: Decimal,
}

impl Product {
    pub fn new(id: i64, name: impl Into<String>, stock: i64, unit_price: Decimal) -> Result<Self, ProductError> {
        if stock < 0 {
            return Err(ProductError::NegativeStock(id));
        }
        if unit_price <= Decimal::ZERO {
            return Err(ProductError::NonPositivePrice(id));
        }

        let mut unit_price = unit_price;
        unit_price.rescale(2);

        Ok(Self {
            id,
            name: name.into(),
            stock,
            unit_price,
        })
    }
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ProductError {
    #[error("Product {0} has negative stock")]
    NegativeStock(i64),

    #[error("Product {0} must have a positive unit price")]
    NonPositivePrice(i64),
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn rejects_invalid_products() {
        assert_eq!(Product::new(1, "Tee", -1, dec!(10)), Err(ProductError::NegativeStock(1)));
        assert_eq!(Product::new(1, "Tee", 3, dec!(0)), Err(ProductError::NonPositivePrice(1)));
    }

    #[test]
    fn price_is_kept_in_cents() {
        let product = Product::new(1, "Tee", 3, dec!(10)).unwrap();
        assert_eq!(product.unit_price.to_string(), "10.00");
    }
}
