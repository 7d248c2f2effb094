use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;
use storefront_catalog::{InMemoryInventoryLedger, InventoryLedger, Product};
use storefront_core::{InMemoryIdentityDirectory, InMemoryNotificationRepository, Role, UserAccount};
use storefront_notify::{
    ChannelPublisher, DeliveryOutcome, LogSink, NotificationDispatcher, NotificationFeed, OutboxRelay,
    RetryPolicy,
};
use storefront_order::{GuestContact, InMemoryOrderRepository, LineRequest, OrderStatus, OrderWorkflow};
use storefront_shared::NotificationType;

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 2,
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(2),
    }
}

#[tokio::test]
async fn order_changes_reach_the_recipient_feed() {
    let ledger: Arc<dyn InventoryLedger> = Arc::new(InMemoryInventoryLedger::with_products([
        Product::new(1, "Tea tin", 10, dec!(6.00)).unwrap(),
    ]));
    let orders = Arc::new(InMemoryOrderRepository::new(ledger));
    let identities = Arc::new(InMemoryIdentityDirectory::new());
    identities
        .register(UserAccount {
            id: 3,
            email: "Ana@Example.com".to_string(),
            full_name: "Ana".to_string(),
            role: Role::Customer,
        })
        .unwrap();
    let workflow = OrderWorkflow::new(orders.clone(), identities);

    let notifications = Arc::new(InMemoryNotificationRepository::new());
    let dispatcher = Arc::new(NotificationDispatcher::new(
        notifications.clone(),
        Arc::new(LogSink),
        fast_retry(),
    ));
    let (publisher, rx) = ChannelPublisher::channel();
    tokio::spawn(dispatcher.clone().run(rx));
    let relay = OutboxRelay::new(orders.clone(), Arc::new(publisher), 50);
    let feed = NotificationFeed::new(notifications.clone());

    let order = workflow
        .create_order(Some("ana@example.com"), &[LineRequest { product_id: 1, quantity: 2 }], None)
        .await
        .unwrap();
    workflow
        .create_order(
            None,
            &[LineRequest { product_id: 1, quantity: 1 }],
            Some(GuestContact {
                email: "Guest@Example.com".to_string(),
                full_name: "Guest".to_string(),
                address: "4 Quay Street".to_string(),
            }),
        )
        .await
        .unwrap();
    workflow
        .transition(order.id(), OrderStatus::Processing, "admin@example.com")
        .await
        .unwrap();

    // Publish returns only after the dispatcher handled each event.
    assert_eq!(relay.relay_once().await.unwrap(), 3);
    assert_eq!(relay.relay_once().await.unwrap(), 0);

    let ana = feed.list_for("ANA@example.com").await.unwrap();
    assert_eq!(ana.len(), 2);
    assert!(ana.iter().any(|n| n.kind == NotificationType::OrderCreated
        && n.message == format!("Order #{} created successfully.", order.id())));
    assert!(ana.iter().any(|n| n.kind == NotificationType::OrderStatusChanged
        && n.message == format!("Your order #{} is now PROCESSING", order.id())));
    assert_eq!(feed.unread_count_for("ana@example.com").await.unwrap(), 2);
    assert_eq!(feed.unread_count_for("Ana@Example.com").await.unwrap(), 2);

    // Replaying the same events must not create duplicates.
    for event in &ana {
        assert_eq!(dispatcher.handle(event).await.unwrap(), DeliveryOutcome::Duplicate);
    }
    assert_eq!(feed.list_for("ana@example.com").await.unwrap().len(), 2);

    assert_eq!(feed.list_for("guest@example.com").await.unwrap().len(), 1);
}
