pub mod product;
pub mod inventory;

pub use product::{Product, ProductError};
pub use inventory::{InMemoryInventoryLedger, InventoryError, InventoryLedger, Reservation};
