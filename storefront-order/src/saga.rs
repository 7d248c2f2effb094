use std::sync::Arc;
use storefront_catalog::{InventoryError, InventoryLedger, Reservation};
use tokio::task::JoinHandle;
use tracing::{error, warn};

/// Stock reservations taken for one order that is still being placed.
///
/// The set must end in either `commit` (the order was persisted) or
/// `release_all` (it was not). If it is dropped while still holding stock,
/// for example because the request future was cancelled, the release is
/// spawned on the current runtime.
pub struct ReservationSet {
    ledger: Arc<dyn InventoryLedger>,
    taken: Vec<Reservation>,
    settled: bool,
}

impl ReservationSet {
    pub fn new(ledger: Arc<dyn InventoryLedger>) -> Self {
        Self {
            ledger,
            taken: Vec::new(),
            settled: false,
        }
    }

    pub async fn reserve(&mut self, product_id: i64, quantity: u32) -> Result<Reservation, InventoryError> {
        let reservation = self.ledger.reserve(product_id, quantity).await?;
        self.taken.push(reservation.clone());
        Ok(reservation)
    }

    pub fn reservations(&self) -> &[Reservation] {
        &self.taken
    }

    /// Compensate every reservation, newest first. Release failures are
    /// logged and do not stop the remaining releases.
    ///
    /// The releases run on their own task, so cancelling the caller while
    /// this is awaited does not cut the compensation short.
    pub async fn release_all(mut self) {
        self.settled = true;
        let taken = std::mem::take(&mut self.taken);
        let lines = taken.into_iter().map(|r| (r.product_id, r.quantity)).collect();
        if let Err(e) = spawn_release(self.ledger.clone(), lines).await {
            error!("Stock release task failed: {}", e);
        }
    }

    /// The order now owns the stock.
    pub fn commit(mut self) -> Vec<Reservation> {
        self.settled = true;
        std::mem::take(&mut self.taken)
    }
}

/// Give `(product_id, quantity)` pairs back to the ledger, last pair first,
/// on a detached task.
pub(crate) fn spawn_release(ledger: Arc<dyn InventoryLedger>, lines: Vec<(i64, u32)>) -> JoinHandle<()> {
    tokio::spawn(release(ledger, lines))
}

async fn release(ledger: Arc<dyn InventoryLedger>, lines: Vec<(i64, u32)>) {
    for (product_id, quantity) in lines.into_iter().rev() {
        if let Err(e) = ledger.release(product_id, quantity).await {
            error!(product_id, quantity, "Failed to release reserved stock: {}", e);
        }
    }
}

impl Drop for ReservationSet {
    fn drop(&mut self) {
        if self.settled || self.taken.is_empty() {
            return;
        }

        let lines: Vec<(i64, u32)> = std::mem::take(&mut self.taken)
            .into_iter()
            .map(|r| (r.product_id, r.quantity))
            .collect();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!(count = lines.len(), "Reservation set dropped unsettled, releasing stock");
                handle.spawn(release(self.ledger.clone(), lines));
            }
            Err(_) => {
                error!(count = lines.len(), "Reservation set dropped outside a runtime, stock not released");
            }
        }
    }
}
