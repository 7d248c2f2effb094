use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use storefront_shared::Masked;

use crate::error::OrderError;
use crate::workflow::GuestContact;

/// Order status in the lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 5] = [
        OrderStatus::Pending,
        OrderStatus::Processing,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Processing => "PROCESSING",
            OrderStatus::Shipped => "SHIPPED",
            OrderStatus::Delivered => "DELIVERED",
            OrderStatus::Cancelled => "CANCELLED",
        }
    }

    /// Retail pipeline: PENDING → PROCESSING → SHIPPED → DELIVERED, with
    /// cancellation allowed until the order ships.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        matches!(
            (self, next),
            (OrderStatus::Pending, OrderStatus::Processing)
                | (OrderStatus::Processing, OrderStatus::Shipped)
                | (OrderStatus::Shipped, OrderStatus::Delivered)
                | (OrderStatus::Pending, OrderStatus::Cancelled)
                | (OrderStatus::Processing, OrderStatus::Cancelled)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = OrderError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let wanted = value.trim();
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| OrderError::Validation(format!("Unknown order status: {}", value)))
    }
}

/// Contact details embedded in a guest order instead of an account link.
/// Deserialising goes through the same checks as `GuestInfo::new`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", try_from = "GuestContact")]
pub struct GuestInfo {
    email: Masked<String>,
    full_name: Masked<String>,
    address: Masked<String>,
}

impl GuestInfo {
    pub fn new(email: &str, full_name: &str, address: &str) -> Result<Self, OrderError> {
        let email = email.trim();
        let full_name = full_name.trim();
        let address = address.trim();

        if email.is_empty() || full_name.is_empty() || address.is_empty() {
            return Err(OrderError::Validation(
                "Guest checkout requires email, fullName and address".to_string(),
            ));
        }
        if !email.contains('@') {
            return Err(OrderError::Validation("Guest email is malformed".to_string()));
        }

        Ok(Self {
            email: Masked::from(email),
            full_name: Masked::from(full_name),
            address: Masked::from(address),
        })
    }

    pub fn email(&self) -> &str {
        self.email.expose()
    }

    pub fn full_name(&self) -> &str {
        self.full_name.expose()
    }

    pub fn address(&self) -> &str {
        self.address.expose()
    }
}

impl TryFrom<GuestContact> for GuestInfo {
    type Error = OrderError;

    fn try_from(contact: GuestContact) -> Result<Self, Self::Error> {
        GuestInfo::new(&contact.email, &contact.full_name, &contact.address)
    }
}

/// Who the order belongs to: exactly one of a registered account or a guest.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE", rename_all_fields = "camelCase")]
pub enum CustomerRef {
    Registered { user_id: i64, email: String },
    Guest(GuestInfo),
}

impl CustomerRef {
    /// Address for notifications about this order.
    pub fn recipient(&self) -> &str {
        match self {
            CustomerRef::Registered { email, .. } => email,
            CustomerRef::Guest(guest) => guest.email(),
        }
    }

    pub fn user_id(&self) -> Option<i64> {
        match self {
            CustomerRef::Registered { user_id, .. } => Some(*user_id),
            CustomerRef::Guest(_) => None,
        }
    }
}

/// An individual product within an order. Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrderLine {
    product_id: i64,
    quantity: u32,
    unit_price: Decimal,
}

impl OrderLine {
    pub fn new(product_id: i64, quantity: u32, unit_price: Decimal) -> Result<Self, OrderError> {
        if quantity == 0 {
            return Err(OrderError::Validation(format!(
                "Quantity for product {} must be positive",
                product_id
            )));
        }
        if unit_price <= Decimal::ZERO {
            return Err(OrderError::Validation(format!(
                "Unit price for product {} must be positive",
                product_id
            )));
        }
        Ok(Self {
            product_id,
            quantity,
            unit_price,
        })
    }

    pub fn product_id(&self) -> i64 {
        self.product_id
    }

    pub fn quantity(&self) -> u32 {
        self.quantity
    }

    pub fn unit_price(&self) -> Decimal {
        self.unit_price
    }

    pub fn line_total(&self) -> Decimal {
        self.unit_price * Decimal::from(self.quantity)
    }
}

/// The order and its line snapshots, persisted and mutated as one unit.
///
/// Fields are private so the only ways to obtain a value are the validating
/// constructors; `total_amount` therefore always equals the sum of the lines.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OrderAggregate {
    id: i64,
    customer: CustomerRef,
    status: OrderStatus,
    lines: Vec<OrderLine>,
    total_amount: Decimal,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl OrderAggregate {
    /// A new order, always `PENDING`.
    pub fn create(
        id: i64,
        customer: CustomerRef,
        lines: Vec<OrderLine>,
        created_at: DateTime<Utc>,
    ) -> Result<Self, OrderError> {
        if lines.is_empty() {
            return Err(OrderError::Validation("Order must contain at least one item".to_string()));
        }

        let total_amount = Self::sum(&lines);
        Ok(Self {
            id,
            customer,
            status: OrderStatus::Pending,
            lines,
            total_amount,
            created_at,
            updated_at: created_at,
        })
    }

    /// Rebuild an order read back from storage, re-checking the total.
    pub fn restore(
        id: i64,
        customer: CustomerRef,
        status: OrderStatus,
        lines: Vec<OrderLine>,
        total_amount: Decimal,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Result<Self, OrderError> {
        if lines.is_empty() {
            return Err(OrderError::Internal(format!("Order {} has no lines", id)));
        }

        let computed = Self::sum(&lines);
        if computed != total_amount {
            return Err(OrderError::Internal(format!(
                "Order {} total {} does not match its lines ({})",
                id, total_amount, computed
            )));
        }

        Ok(Self {
            id,
            customer,
            status,
            lines,
            total_amount,
            created_at,
            updated_at,
        })
    }

    fn sum(lines: &[OrderLine]) -> Decimal {
        let mut total: Decimal = lines.iter().map(OrderLine::line_total).sum();
        if total.scale() < 2 {
            total.rescale(2);
        }
        total
    }

    /// Move to `next` if the state machine allows it.
    pub fn transition_to(&mut self, next: OrderStatus) -> Result<OrderStatus, OrderError> {
        if !self.status.can_transition_to(next) {
            return Err(OrderError::InvalidStateTransition {
                from: self.status.to_string(),
                to: next.to_string(),
            });
        }

        let previous = self.status;
        self.status = next;
        self.updated_at = Utc::now();
        Ok(previous)
    }

    pub fn id(&self) -> i64 {
        self.id
    }

    pub fn customer(&self) -> &CustomerRef {
        &self.customer
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn lines(&self) -> &[OrderLine] {
        &self.lines
    }

    pub fn total_amount(&self) -> Decimal {
        self.total_amount
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}
