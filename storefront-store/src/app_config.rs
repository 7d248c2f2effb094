use serde::Deserialize;
use std::env;
use rust_decimal::Decimal;
use storefront_catalog::{Product, ProductError};
use storefront_core::UserAccount;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub notifications: NotificationConfig,
    #[serde(default)]
    pub kafka: KafkaConfig,
    #[serde(default)]
    pub seed: SeedConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

/// Without a `url` the service runs on in-memory stores.
#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: default_max_connections(),
        }
    }
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct NotificationConfig {
    pub relay_interval_ms: u64,
    pub relay_batch_size: usize,
    pub max_delivery_attempts: usize,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self {
            relay_interval_ms: 500,
            relay_batch_size: 100,
            max_delivery_attempts: 5,
            initial_backoff_ms: 50,
            max_backoff_ms: 2000,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct KafkaConfig {
    pub brokers: String,
    pub topic: String,
    pub group_id: String,
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            brokers: "localhost:9092".to_string(),
            topic: "storefront.notifications".to_string(),
            group_id: "storefront-notifier".to_string(),
        }
    }
}

/// Products and accounts loaded at startup, for local runs and demos.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct SeedConfig {
    #[serde(default)]
    pub products: Vec<SeedProduct>,
    #[serde(default)]
    pub users: Vec<UserAccount>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SeedProduct {
    pub id: i64,
    pub name: String,
    pub stock: i64,
    pub unit_price: Decimal,
}

impl TryFrom<SeedProduct> for Product {
    type Error = ProductError;

    fn try_from(seed: SeedProduct) -> Result<Self, Self::Error> {
        Product::new(seed.id, seed.name, seed.stock, seed.unit_price)
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Optional per-environment overrides, e.g. config/production.toml
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Local overrides, never checked in
            .add_source(config::File::with_name("config/local").required(false))
            // STOREFRONT__DATABASE__URL=postgres://... sets database.url
            .add_source(config::Environment::with_prefix("STOREFRONT").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
