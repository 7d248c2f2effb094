use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use storefront_catalog::{InventoryError, InventoryLedger, Reservation};
use storefront_core::{CoreError, CoreResult, OutboxRecord, OutboxRepository};
use storefront_shared::NotificationEvent;
use tracing::error;
use uuid::Uuid;

use crate::models::{OrderAggregate, OrderStatus};
use crate::saga::{spawn_release, ReservationSet};

/// One order being placed.
///
/// Stock taken through `reserve` and the order handed to `commit` become
/// durable together. `rollback`, or dropping the placement before `commit`,
/// gives every reserved unit back.
#[async_trait]
pub trait Placement: Send {
    async fn reserve(&mut self, product_id: i64, quantity: u32) -> Result<Reservation, InventoryError>;

    /// Allocate the id for the order being built.
    async fn next_id(&mut self) -> CoreResult<i64>;

    /// Store the order with its outbox record and make the reservations final.
    async fn commit(self: Box<Self>, order: &OrderAggregate, outbox: &NotificationEvent) -> CoreResult<()>;

    async fn rollback(self: Box<Self>);
}

/// Persistence boundary for order aggregates.
///
/// Every write carries the notification that describes it; implementations
/// must store both in one unit of work so an order change and its outbox
/// record are never observed apart.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn begin(&self) -> CoreResult<Box<dyn Placement>>;

    async fn get(&self, id: i64) -> CoreResult<Option<OrderAggregate>>;

    /// Compare-and-set on the status column. Fails with `CoreError::Conflict`
    /// when the stored status is no longer `expected`. When `order` is
    /// cancelled its lines go back to stock in the same unit of work.
    async fn update_status(
        &self,
        id: i64,
        expected: OrderStatus,
        order: &OrderAggregate,
        outbox: &NotificationEvent,
    ) -> CoreResult<()>;

    /// Most recent first.
    async fn list_for_user(&self, user_id: i64) -> CoreResult<Vec<OrderAggregate>>;

    /// Most recent first.
    async fn list_all(&self) -> CoreResult<Vec<OrderAggregate>>;
}

#[derive(Default)]
struct OrderTables {
    orders: HashMap<i64, OrderAggregate>,
    /// Undispatched records only, oldest first.
    outbox: VecDeque<OutboxRecord>,
}

fn lock(tables: &Mutex<OrderTables>) -> CoreResult<MutexGuard<'_, OrderTables>> {
    tables
        .lock()
        .map_err(|_| CoreError::Storage("order store lock poisoned".to_string()))
}

/// Order store for standalone mode and tests. One mutex guards both tables,
/// which gives the same atomicity as a database transaction. Stock moves
/// through the ledger the store was built with.
pub struct InMemoryOrderRepository {
    ledger: Arc<dyn InventoryLedger>,
    next_id: Arc<AtomicI64>,
    tables: Arc<Mutex<OrderTables>>,
}

impl InMemoryOrderRepository {
    pub fn new(ledger: Arc<dyn InventoryLedger>) -> Self {
        Self {
            ledger,
            next_id: Arc::new(AtomicI64::new(1)),
            tables: Arc::new(Mutex::new(OrderTables::default())),
        }
    }

    /// Number of stored orders.
    pub fn len(&self) -> usize {
        lock(&self.tables).map(|t| t.orders.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn newest_first(orders: &mut [OrderAggregate]) {
    orders.sort_by(|a, b| {
        b.created_at()
            .cmp(&a.created_at())
            .then_with(|| b.id().cmp(&a.id()))
    });
}

struct InMemoryPlacement {
    reservations: ReservationSet,
    next_id: Arc<AtomicI64>,
    tables: Arc<Mutex<OrderTables>>,
}

impl InMemoryPlacement {
    fn write(&self, order: &OrderAggregate, outbox: &NotificationEvent) -> CoreResult<()> {
        let mut tables = lock(&self.tables)?;
        if tables.orders.contains_key(&order.id()) {
            return Err(CoreError::Conflict(format!("order {} already exists", order.id())));
        }
        tables.orders.insert(order.id(), order.clone());
        tables.outbox.push_back(OutboxRecord::new(outbox.clone()));
        Ok(())
    }
}

#[async_trait]
impl Placement for InMemoryPlacement {
    async fn reserve(&mut self, product_id: i64, quantity: u32) -> Result<Reservation, InventoryError> {
        self.reservations.reserve(product_id, quantity).await
    }

    async fn next_id(&mut self) -> CoreResult<i64> {
        Ok(self.next_id.fetch_add(1, Ordering::SeqCst))
    }

    async fn commit(self: Box<Self>, order: &OrderAggregate, outbox: &NotificationEvent) -> CoreResult<()> {
        let this = *self;
        // No await between the write and settling the reservations
        match this.write(order, outbox) {
            Ok(()) => {
                this.reservations.commit();
                Ok(())
            }
            Err(e) => {
                this.reservations.release_all().await;
                Err(e)
            }
        }
    }

    async fn rollback(self: Box<Self>) {
        self.reservations.release_all().await;
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn begin(&self) -> CoreResult<Box<dyn Placement>> {
        Ok(Box::new(InMemoryPlacement {
            reservations: ReservationSet::new(self.ledger.clone()),
            next_id: self.next_id.clone(),
            tables: self.tables.clone(),
        }))
    }

    async fn get(&self, id: i64) -> CoreResult<Option<OrderAggregate>> {
        Ok(lock(&self.tables)?.orders.get(&id).cloned())
    }

    async fn update_status(
        &self,
        id: i64,
        expected: OrderStatus,
        order: &OrderAggregate,
        outbox: &NotificationEvent,
    ) -> CoreResult<()> {
        {
            let mut tables = lock(&self.tables)?;
            let stored = tables
                .orders
                .get_mut(&id)
                .ok_or_else(|| CoreError::NotFound(format!("order {}", id)))?;

            if stored.status() != expected {
                return Err(CoreError::Conflict(format!(
                    "order {} is {}, expected {}",
                    id,
                    stored.status(),
                    expected
                )));
            }

            *stored = order.clone();
            tables.outbox.push_back(OutboxRecord::new(outbox.clone()));
        }

        if order.status() == OrderStatus::Cancelled {
            let lines = order.lines().iter().map(|l| (l.product_id(), l.quantity())).collect();
            // Spawned before the first await, so the restock survives a cancelled caller
            let restock = spawn_release(self.ledger.clone(), lines);
            if let Err(e) = restock.await {
                error!(order_id = id, "Restock task failed: {}", e);
            }
        }
        Ok(())
    }

    async fn list_for_user(&self, user_id: i64) -> CoreResult<Vec<OrderAggregate>> {
        let tables = lock(&self.tables)?;
        let mut orders: Vec<OrderAggregate> = tables
            .orders
            .values()
            .filter(|o| o.customer().user_id() == Some(user_id))
            .cloned()
            .collect();
        newest_first(&mut orders);
        Ok(orders)
    }

    async fn list_all(&self) -> CoreResult<Vec<OrderAggregate>> {
        let tables = lock(&self.tables)?;
        let mut orders: Vec<OrderAggregate> = tables.orders.values().cloned().collect();
        newest_first(&mut orders);
        Ok(orders)
    }
}

#[async_trait]
impl OutboxRepository for InMemoryOrderRepository {
    async fn pending(&self, limit: usize) -> CoreResult<Vec<OutboxRecord>> {
        let tables = lock(&self.tables)?;
        Ok(tables.outbox.iter().take(limit).cloned().collect())
    }

    /// Dispatched records are dropped.
    async fn mark_dispatched(&self, event_id: Uuid) -> CoreResult<()> {
        let mut tables = lock(&self.tables)?;
        let position = tables
            .outbox
            .iter()
            .position(|r| r.event.id == event_id)
            .ok_or_else(|| CoreError::NotFound(format!("outbox record {}", event_id)))?;
        tables.outbox.remove(position);
        Ok(())
    }

    async fn record_failure(&self, event_id: Uuid, error: &str) -> CoreResult<()> {
        let mut tables = lock(&self.tables)?;
        let record = tables
            .outbox
            .iter_mut()
            .find(|r| r.event.id == event_id)
            .ok_or_else(|| CoreError::NotFound(format!("outbox record {}", event_id)))?;
        record.attempts += 1;
        record.last_error = Some(error.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CustomerRef, OrderLine};
    use chrono::{Duration, Utc};
    use rust_decimal_macros::dec;
    use storefront_catalog::{InMemoryInventoryLedger, Product};

    fn store() -> (Arc<InMemoryInventoryLedger>, InMemoryOrderRepository) {
        let ledger = Arc::new(InMemoryInventoryLedger::with_products([
            Product::new(1, "Candle", 100, dec!(5.00)).unwrap(),
        ]));
        (ledger.clone(), InMemoryOrderRepository::new(ledger))
    }

    fn order(id: i64, user_id: i64, minutes_ago: i64) -> OrderAggregate {
        let customer = CustomerRef::Registered {
            user_id,
            email: format!("user{}@example.com", user_id),
        };
        let lines = vec![OrderLine::new(1, 1, dec!(5.00)).unwrap()];
        OrderAggregate::create(id, customer, lines, Utc::now() - Duration::minutes(minutes_ago)).unwrap()
    }

    async fn place(repo: &InMemoryOrderRepository, order: &OrderAggregate, event: &NotificationEvent) -> CoreResult<()> {
        let mut placement = repo.begin().await?;
        for line in order.lines() {
            placement.reserve(line.product_id(), line.quantity()).await.unwrap();
        }
        placement.commit(order, event).await
    }

    #[tokio::test]
    async fn commit_writes_order_and_outbox_together() {
        let (ledger, repo) = store();
        let order = order(1, 7, 0);
        let event = NotificationEvent::order_created(1, "user7@example.com");

        place(&repo, &order, &event).await.unwrap();

        assert_eq!(repo.get(1).await.unwrap(), Some(order.clone()));
        let pending = repo.pending(10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].event.id, event.id);
        assert_eq!(ledger.available(1).await.unwrap(), Some(99));

        // A duplicate id is refused and its reservation handed back
        assert!(matches!(place(&repo, &order, &event).await, Err(CoreError::Conflict(_))));
        assert_eq!(ledger.available(1).await.unwrap(), Some(99));
        assert_eq!(repo.pending(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn rollback_and_drop_return_stock() {
        let (ledger, repo) = store();

        let mut placement = repo.begin().await.unwrap();
        placement.reserve(1, 10).await.unwrap();
        placement.rollback().await;
        assert_eq!(ledger.available(1).await.unwrap(), Some(100));

        {
            let mut placement = repo.begin().await.unwrap();
            placement.reserve(1, 7).await.unwrap();
        }
        let restored = crate::saga::tests::wait_for_stock(ledger.as_ref(), 1, 100).await;
        assert_eq!(restored, Some(100));
        assert!(repo.is_empty());
    }

    #[tokio::test]
    async fn status_update_is_compare_and_set() {
        let (_, repo) = store();
        let mut order = order(1, 7, 0);
        place(&repo, &order, &NotificationEvent::order_created(1, "u@example.com")).await.unwrap();

        order.transition_to(OrderStatus::Processing).unwrap();
        let event = NotificationEvent::order_status_changed(1, "PROCESSING", "u@example.com");
        repo.update_status(1, OrderStatus::Pending, &order, &event).await.unwrap();

        // A second writer that still believes the order is PENDING loses.
        let stale = repo.update_status(1, OrderStatus::Pending, &order, &event).await;
        assert!(matches!(stale, Err(CoreError::Conflict(_))));

        let missing = repo.update_status(99, OrderStatus::Pending, &order, &event).await;
        assert!(matches!(missing, Err(CoreError::NotFound(_))));
        assert_eq!(repo.pending(10).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn cancelling_restocks_with_the_status_change() {
        let (ledger, repo) = store();
        let mut order = order(1, 7, 0);
        place(&repo, &order, &NotificationEvent::order_created(1, "u@example.com")).await.unwrap();
        assert_eq!(ledger.available(1).await.unwrap(), Some(99));

        order.transition_to(OrderStatus::Cancelled).unwrap();
        let event = NotificationEvent::order_status_changed(1, "CANCELLED", "u@example.com");
        repo.update_status(1, OrderStatus::Pending, &order, &event).await.unwrap();
        assert_eq!(ledger.available(1).await.unwrap(), Some(100));

        // The losing writer of a race changes nothing, stock included
        let stale = repo.update_status(1, OrderStatus::Pending, &order, &event).await;
        assert!(matches!(stale, Err(CoreError::Conflict(_))));
        assert_eq!(ledger.available(1).await.unwrap(), Some(100));
    }

    #[tokio::test]
    async fn listings_are_newest_first() {
        let (_, repo) = store();
        for (id, user, age) in [(1, 7, 30), (2, 8, 20), (3, 7, 10)] {
            let event = NotificationEvent::order_created(id, "u@example.com");
            place(&repo, &order(id, user, age), &event).await.unwrap();
        }

        let mine: Vec<i64> = repo.list_for_user(7).await.unwrap().iter().map(|o| o.id()).collect();
        assert_eq!(mine, vec![3, 1]);
        let all: Vec<i64> = repo.list_all().await.unwrap().iter().map(|o| o.id()).collect();
        assert_eq!(all, vec![3, 2, 1]);
    }

    #[tokio::test]
    async fn outbox_tracks_failures_and_prunes_dispatched() {
        let (_, repo) = store();
        let first = NotificationEvent::order_created(1, "u@example.com");
        let second = NotificationEvent::order_created(2, "u@example.com");
        place(&repo, &order(1, 7, 0), &first).await.unwrap();
        place(&repo, &order(2, 7, 0), &second).await.unwrap();

        repo.record_failure(first.id, "broker down").await.unwrap();
        let pending = repo.pending(10).await.unwrap();
        assert_eq!(pending[0].attempts, 1);
        assert_eq!(pending[0].last_error.as_deref(), Some("broker down"));

        repo.mark_dispatched(first.id).await.unwrap();
        let pending = repo.pending(10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].event.id, second.id);

        // The dispatched record is gone, not just flagged
        assert!(matches!(repo.mark_dispatched(first.id).await, Err(CoreError::NotFound(_))));
        assert!(matches!(repo.record_failure(first.id, "late").await, Err(CoreError::NotFound(_))));
    }
}
