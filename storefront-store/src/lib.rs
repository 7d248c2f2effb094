pub mod app_config;
pub mod database;
#[cfg(feature = "kafka")]
pub mod events;
pub mod identity_repo;
pub mod inventory_repo;
pub mod notification_repo;
pub mod order_repo;

pub use database::DbClient;
#[cfg(feature = "kafka")]
pub use events::EventProducer;
pub use identity_repo::PgIdentityDirectory;
pub use inventory_repo::PgInventoryLedger;
pub use notification_repo::PgNotificationRepository;
pub use order_repo::PgOrderRepository;
