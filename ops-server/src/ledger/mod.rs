//! Quantity ledger - append-only product quantity events
//!
//! # Append Flow
//!
//! ```text
//! append(product, kind, counter, delta, note)
//!     ├─ 1. Validate delta (non-zero, positive for add)
//!     ├─ 2. Acquire product serialization point (bounded wait)
//!     ├─ 3. Begin write transaction
//!     ├─ 4. Allocate global sequence, store event
//!     ├─ 5. Inventory add? check received vs origin, log discrepancy
//!     ├─ 6. Project new stock inside the transaction
//!     └─ 7. Under the hub gate: commit, invalidate cache, publish deltas
//! ```
//!
//! Events are never edited or deleted; a wrong quantity is fixed by
//! appending a `correct` event.

mod slaughter;

use std::sync::Arc;
use std::time::Duration;

use redb::WriteTransaction;
use shared::message::DeltaChange;
use shared::models::{
    Counter, ErrorLog, ProductId, QuantityEvent, QuantityEventKind, ShipmentId,
};

use crate::message::BroadcastHub;
use crate::ops::{KeyedLocks, OpsError, OpsResult};
use crate::stock::{CounterTotals, StockProjector, project_stock};
use crate::storage::{ERROR_LOG_SEQUENCE, LEDGER_SEQUENCE, OpsStorage, StorageError};

/// Error log event name for inventory discrepancies
pub const INVENTORY_DISCREPANCY: &str = "inventory_discrepancy";

/// Event about to be written
#[derive(Debug, Clone)]
pub(crate) struct NewEvent {
    pub product_id: ProductId,
    pub kind: QuantityEventKind,
    pub counter: Counter,
    pub delta: i64,
    pub note: Option<String>,
    pub shipment_id: Option<ShipmentId>,
}

/// Store one event under the next global sequence (within transaction)
pub(crate) fn write_event(
    storage: &OpsStorage,
    txn: &WriteTransaction,
    new: NewEvent,
) -> OpsResult<QuantityEvent> {
    let sequence = storage.next_sequence(txn, LEDGER_SEQUENCE)?;
    let event = QuantityEvent {
        event_id: uuid::Uuid::new_v4().to_string(),
        sequence,
        product_id: new.product_id,
        kind: new.kind,
        counter: new.counter,
        delta: new.delta,
        note: new.note,
        shipment_id: new.shipment_id,
        created_at: shared::util::now_millis(),
    };
    storage.store_event(txn, &event)?;
    Ok(event)
}

/// Store an error log entry under the next error log id (within transaction)
pub(crate) fn write_error_log(
    storage: &OpsStorage,
    txn: &WriteTransaction,
    product_id: ProductId,
    event: &str,
    note: String,
) -> OpsResult<ErrorLog> {
    let entry = ErrorLog {
        id: storage.next_sequence(txn, ERROR_LOG_SEQUENCE)?,
        product_id,
        event: event.to_string(),
        note,
        timestamp: shared::util::now_millis(),
    };
    storage.store_error_log(txn, &entry)?;
    Ok(entry)
}

/// `add` needs a positive delta; every kind rejects zero
pub fn validate_delta(kind: QuantityEventKind, delta: i64) -> OpsResult<()> {
    if delta == 0 {
        return Err(OpsError::InvalidQuantity(
            "quantity delta must be non-zero".to_string(),
        ));
    }
    if kind == QuantityEventKind::Add && delta < 0 {
        return Err(OpsError::InvalidQuantity(format!(
            "add requires a positive quantity, got {}",
            delta
        )));
    }
    Ok(())
}

/// Append-only ledger with per-product serialization
pub struct QuantityLedger {
    storage: OpsStorage,
    projector: Arc<StockProjector>,
    hub: Arc<BroadcastHub>,
    product_locks: Arc<KeyedLocks<ProductId>>,
    lock_timeout: Duration,
}

impl QuantityLedger {
    pub fn new(
        storage: OpsStorage,
        projector: Arc<StockProjector>,
        hub: Arc<BroadcastHub>,
        product_locks: Arc<KeyedLocks<ProductId>>,
        lock_timeout: Duration,
    ) -> Self {
        Self {
            storage,
            projector,
            hub,
            product_locks,
            lock_timeout,
        }
    }

    /// Append one event and broadcast the product's new stock
    pub fn append(
        &self,
        product_id: ProductId,
        kind: QuantityEventKind,
        counter: Counter,
        delta: i64,
        note: Option<String>,
    ) -> OpsResult<QuantityEvent> {
        validate_delta(kind, delta)?;

        let _guard = self.product_locks.acquire(product_id, self.lock_timeout)?;
        let txn = self.storage.begin_write()?;
        if self.storage.get_product_txn(&txn, product_id)?.is_none() {
            return Err(OpsError::ProductNotFound(product_id));
        }

        let event = write_event(
            &self.storage,
            &txn,
            NewEvent {
                product_id,
                kind,
                counter,
                delta,
                note,
                shipment_id: None,
            },
        )?;

        let ledger = self.storage.load_product_ledger_txn(&txn, product_id)?;
        let stock = project_stock(&ledger.events, &ledger.shipment_debits)?;

        let discrepancy = if kind == QuantityEventKind::Add && counter == Counter::Inventory {
            let totals = CounterTotals::from_events(&ledger.events)?;
            if totals.has_discrepancy() {
                tracing::warn!(
                    product_id,
                    received = totals.received,
                    origin = totals.origin,
                    "Inventory received exceeds origin"
                );
                Some(write_error_log(
                    &self.storage,
                    &txn,
                    product_id,
                    INVENTORY_DISCREPANCY,
                    format!(
                        "Discrepancy detected: Received ({}) > Origin ({})",
                        totals.received, totals.origin
                    ),
                )?)
            } else {
                None
            }
        } else {
            None
        };

        let event = self.hub.publish_committed(|| {
            txn.commit().map_err(StorageError::from)?;
            self.projector.invalidate(product_id);

            let mut changes = vec![DeltaChange::StockChanged {
                product_id,
                stock,
                event: event.clone(),
            }];
            if let Some(entry) = discrepancy {
                changes.push(DeltaChange::ErrorLogged { entry });
            }
            Ok::<_, OpsError>((event, changes))
        })?;

        tracing::info!(
            product_id,
            sequence = event.sequence,
            kind = %event.kind,
            counter = %event.counter,
            delta = event.delta,
            stock,
            "Quantity event appended"
        );
        Ok(event)
    }

    /// Full ledger history of a product, in append order
    pub fn history(&self, product_id: ProductId) -> OpsResult<Vec<QuantityEvent>> {
        if self.storage.get_product(product_id)?.is_none() {
            return Err(OpsError::ProductNotFound(product_id));
        }
        let mut events = self.storage.get_events_for_product(product_id)?;
        events.sort_by_key(|e| e.sequence);
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{SnapshotSource, SnapshotState};
    use shared::message::StationMessage;
    use shared::models::{Product, ProductKind};

    struct EmptySource;

    impl SnapshotSource for EmptySource {
        fn snapshot_state(&self) -> OpsResult<SnapshotState> {
            Ok(SnapshotState::default())
        }
    }

    fn setup() -> (OpsStorage, Arc<StockProjector>, Arc<BroadcastHub>, QuantityLedger) {
        let storage = OpsStorage::open_in_memory().unwrap();
        let txn = storage.begin_write().unwrap();
        storage
            .store_product(
                &txn,
                &Product {
                    id: 1,
                    name: "Jeroan Sapi".to_string(),
                    kind: ProductKind::Jeroan,
                    animal_type_id: None,
                    created_at: 0,
                },
            )
            .unwrap();
        txn.commit().unwrap();

        let projector = Arc::new(StockProjector::new(storage.clone()));
        let hub = Arc::new(BroadcastHub::new(Arc::new(EmptySource), 64));
        let ledger = QuantityLedger::new(
            storage.clone(),
            projector.clone(),
            hub.clone(),
            Arc::new(KeyedLocks::new("product")),
            Duration::from_millis(200),
        );
        (storage, projector, hub, ledger)
    }

    #[test]
    fn test_validate_delta() {
        assert!(validate_delta(QuantityEventKind::Add, 3).is_ok());
        assert!(validate_delta(QuantityEventKind::Add, -3).is_err());
        assert!(validate_delta(QuantityEventKind::Move, -3).is_ok());
        assert!(validate_delta(QuantityEventKind::Correct, 2).is_ok());
        for kind in [
            QuantityEventKind::Add,
            QuantityEventKind::Move,
            QuantityEventKind::Correct,
        ] {
            assert!(matches!(
                validate_delta(kind, 0),
                Err(OpsError::InvalidQuantity(_))
            ));
        }
    }

    #[test]
    fn test_append_updates_stock_and_history() {
        let (_storage, projector, _hub, ledger) = setup();

        let first = ledger
            .append(1, QuantityEventKind::Add, Counter::Slaughter, 5, None)
            .unwrap();
        ledger
            .append(
                1,
                QuantityEventKind::Correct,
                Counter::Weighing,
                -2,
                Some("recount".to_string()),
            )
            .unwrap();

        assert_eq!(projector.current_stock(1).unwrap(), 3);
        let history = ledger.history(1).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0], first);
        assert_eq!(history[1].note.as_deref(), Some("recount"));
        assert!(history[0].sequence < history[1].sequence);
    }

    #[test]
    fn test_append_unknown_product() {
        let (storage, _projector, hub, ledger) = setup();
        let err = ledger
            .append(9, QuantityEventKind::Add, Counter::Slaughter, 1, None)
            .unwrap_err();
        assert!(matches!(err, OpsError::ProductNotFound(9)));
        assert_eq!(storage.current_sequence(LEDGER_SEQUENCE).unwrap(), 0);
        assert_eq!(hub.version(), 0);
    }

    #[tokio::test]
    async fn test_append_broadcasts_stock_delta() {
        let (_storage, _projector, hub, ledger) = setup();
        let mut stream = hub.subscribe("dashboard").unwrap();
        stream.recv().await.unwrap();

        ledger
            .append(1, QuantityEventKind::Add, Counter::Slaughter, 4, None)
            .unwrap();

        match stream.recv().await.unwrap() {
            StationMessage::Delta(delta) => match delta.change {
                DeltaChange::StockChanged { product_id, stock, .. } => {
                    assert_eq!(product_id, 1);
                    assert_eq!(stock, 4);
                }
                other => panic!("unexpected change: {:?}", other),
            },
            StationMessage::Snapshot(_) => panic!("expected delta"),
        }
    }

    #[tokio::test]
    async fn test_inventory_discrepancy_logged() {
        let (storage, _projector, hub, ledger) = setup();
        ledger
            .append(1, QuantityEventKind::Add, Counter::Slaughter, 2, None)
            .unwrap();

        let mut stream = hub.subscribe("inventory").unwrap();
        stream.recv().await.unwrap();

        // 2 ≤ 2: no discrepancy
        ledger
            .append(1, QuantityEventKind::Add, Counter::Inventory, 2, None)
            .unwrap();
        assert!(storage.recent_error_logs(10).unwrap().is_empty());

        ledger
            .append(1, QuantityEventKind::Add, Counter::Inventory, 1, None)
            .unwrap();
        let logs = storage.recent_error_logs(10).unwrap();
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].note, "Discrepancy detected: Received (3) > Origin (2)");
        assert_eq!(logs[0].event, INVENTORY_DISCREPANCY);

        let versions: Vec<u64> = (0..3)
            .map(|_| stream.try_recv().unwrap().version())
            .collect();
        assert_eq!(versions, vec![2, 3, 4]);
    }

    #[test]
    fn test_busy_product_returns_conflict_without_effect() {
        let (storage, _projector, _hub, ledger) = setup();
        let _held = ledger.product_locks.acquire(1, Duration::ZERO).unwrap();

        let err = ledger
            .append(1, QuantityEventKind::Add, Counter::Slaughter, 1, None)
            .unwrap_err();
        assert!(matches!(err, OpsError::Conflict(_)));
        assert!(storage.get_events_for_product(1).unwrap().is_empty());
    }
}
