use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use storefront_api::{app, metrics::Metrics, AppState, AuthConfig};
use storefront_catalog::{InMemoryInventoryLedger, InventoryLedger, Product};
use storefront_core::{
    IdentityDirectory, InMemoryIdentityDirectory, InMemoryNotificationRepository, NotificationRepository,
    OutboxRepository,
};
use storefront_notify::{LogSink, NotificationDispatcher, NotificationFeed, OutboxRelay, Publisher, RetryPolicy};
use storefront_order::{InMemoryOrderRepository, OrderRepository, OrderWorkflow};
use storefront_store::app_config::Config;
use storefront_store::{
    DbClient, PgIdentityDirectory, PgInventoryLedger, PgNotificationRepository, PgOrderRepository,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

struct Stores {
    orders: Arc<dyn OrderRepository>,
    outbox: Arc<dyn OutboxRepository>,
    notifications: Arc<dyn NotificationRepository>,
    identities: Arc<dyn IdentityDirectory>,
}

async fn postgres_stores(url: &str, config: &Config) -> anyhow::Result<Stores> {
    let db = DbClient::new(url, config.database.max_connections)
        .await
        .context("Failed to connect to Postgres")?;
    db.migrate().await.context("Failed to run migrations")?;

    let ledger = PgInventoryLedger::new(db.pool.clone());
    for seed in config.seed.products.iter().cloned() {
        let product = Product::try_from(seed)?;
        ledger.upsert(&product).await?;
    }

    let identities = Arc::new(PgIdentityDirectory::new(db.pool.clone()));
    for account in &config.seed.users {
        identities.register(account).await?;
    }

    let orders = Arc::new(PgOrderRepository::new(db.pool.clone()));
    Ok(Stores {
        orders: orders.clone(),
        outbox: orders,
        notifications: Arc::new(PgNotificationRepository::new(db.pool.clone())),
        identities,
    })
}

fn memory_stores(config: &Config) -> anyhow::Result<Stores> {
    let products = config
        .seed
        .products
        .iter()
        .cloned()
        .map(Product::try_from)
        .collect::<Result<Vec<_>, _>>()?;

    let identities = InMemoryIdentityDirectory::new();
    for account in &config.seed.users {
        identities.register(account.clone())?;
    }

    let ledger: Arc<dyn InventoryLedger> = Arc::new(InMemoryInventoryLedger::with_products(products));
    let orders = Arc::new(InMemoryOrderRepository::new(ledger));
    Ok(Stores {
        orders: orders.clone(),
        outbox: orders,
        notifications: Arc::new(InMemoryNotificationRepository::new()),
        identities: Arc::new(identities),
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "storefront_api=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting Storefront API on port {}", config.server.port);

    let stores = match &config.database.url {
        Some(url) => postgres_stores(url, &config).await?,
        None => {
            tracing::warn!("No database configured, running on in-memory stores");
            memory_stores(&config)?
        }
    };

    // Notification pipeline: outbox -> relay -> publisher -> dispatcher -> feed
    let notify = &config.notifications;
    let dispatcher = Arc::new(NotificationDispatcher::new(
        stores.notifications.clone(),
        Arc::new(LogSink),
        RetryPolicy {
            max_attempts: notify.max_delivery_attempts,
            initial_backoff: Duration::from_millis(notify.initial_backoff_ms),
            max_backoff: Duration::from_millis(notify.max_backoff_ms),
        },
    ));

    #[cfg(feature = "kafka")]
    let publisher: Arc<dyn Publisher> = {
        let producer = storefront_store::EventProducer::new(&config.kafka.brokers, &config.kafka.topic)
            .context("Failed to create Kafka producer")?;
        let worker = storefront_api::worker::start_notification_worker(
            config.kafka.brokers.clone(),
            config.kafka.group_id.clone(),
            config.kafka.topic.clone(),
            dispatcher.clone(),
        );
        tokio::spawn(async move {
            if let Err(e) = worker.await {
                tracing::error!("Notification worker stopped: {}", e);
            }
        });
        Arc::new(producer)
    };

    #[cfg(not(feature = "kafka"))]
    let publisher: Arc<dyn Publisher> = {
        let (publisher, rx) = storefront_notify::ChannelPublisher::channel();
        tokio::spawn(dispatcher.clone().run(rx));
        Arc::new(publisher)
    };

    let relay = OutboxRelay::new(stores.outbox.clone(), publisher, notify.relay_batch_size);
    tokio::spawn(relay.run(Duration::from_millis(notify.relay_interval_ms)));

    let app_state = AppState {
        orders: Arc::new(OrderWorkflow::new(stores.orders, stores.identities)),
        feed: Arc::new(NotificationFeed::new(stores.notifications)),
        metrics: Arc::new(Metrics::new()?),
        auth: AuthConfig {
            secret: config.auth.jwt_secret.clone(),
        },
    };

    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
