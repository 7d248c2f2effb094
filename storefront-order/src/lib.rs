pub mod error;
pub mod models;
pub mod repository;
pub mod saga;
pub mod workflow;

pub use error::OrderError;
pub use models::{CustomerRef, GuestInfo, OrderAggregate, OrderLine, OrderStatus};
pub use repository::{InMemoryOrderRepository, OrderRepository, Placement};
pub use saga::ReservationSet;
pub use workflow::{GuestContact, LineRequest, OrderWorkflow};
