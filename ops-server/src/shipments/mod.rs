//! Shipment aggregation
//!
//! # Create Flow
//!
//! ```text
//! create_shipment(items, note)
//!     ├─ 1. Validate items (non-empty, positive quantities)
//!     ├─ 2. Acquire every product's serialization point (all-or-nothing)
//!     ├─ 3. Begin write transaction
//!     ├─ 4. Check stock >= requested total for each product → else abort
//!     ├─ 5. Store shipment + per-product debit index
//!     ├─ 6. Append one `move` event per item, referencing the shipment
//!     └─ 7. Under the hub gate: commit, invalidate cache, publish deltas
//! ```
//!
//! A rejected shipment aborts the transaction: no shipment record, no
//! ledger event and no broadcast.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use shared::message::DeltaChange;
use shared::models::{
    Counter, ProductId, QuantityEventKind, Shipment, ShipmentDiscrepancy, ShipmentId,
    ShipmentItem, ShipmentReceipt, ShipmentStatus,
};

use crate::ledger::{NewEvent, write_error_log, write_event};
use crate::message::BroadcastHub;
use crate::ops::{KeyedLocks, OpsError, OpsResult};
use crate::stock::StockProjector;
use crate::storage::{OpsStorage, SHIPMENT_SEQUENCE, StorageError};

/// Error log event name for receipt mismatches
pub const SHIPMENT_DISCREPANCY: &str = "shipment_discrepancy";

/// Sum quantities per product, keyed in stable order
fn totals_by_product(items: &[ShipmentItem]) -> OpsResult<BTreeMap<ProductId, i64>> {
    let mut totals = BTreeMap::new();
    for item in items {
        let total = totals.entry(item.product_id).or_insert(0i64);
        *total = total.checked_add(item.quantity).ok_or_else(|| {
            OpsError::InvalidQuantity(format!(
                "total quantity for product {} is out of range",
                item.product_id
            ))
        })?;
    }
    Ok(totals)
}

/// Compare shipped and received quantities
///
/// Reports missing products, quantity mismatches and unexpected products,
/// in product id order.
pub fn compare_receipt(
    shipped: &[ShipmentItem],
    received: &[ShipmentItem],
) -> OpsResult<Vec<ShipmentDiscrepancy>> {
    let shipped = totals_by_product(shipped)?;
    let received = totals_by_product(received)?;

    let mut discrepancies = Vec::new();
    for (&product_id, &expected) in &shipped {
        match received.get(&product_id) {
            None => discrepancies.push(ShipmentDiscrepancy {
                product_id,
                expected,
                received: 0,
                message: format!("Product not received (expected {})", expected),
            }),
            Some(&got) if got != expected => discrepancies.push(ShipmentDiscrepancy {
                product_id,
                expected,
                received: got,
                message: format!("Expected {}, received {}", expected, got),
            }),
            Some(_) => {}
        }
    }
    for (&product_id, &got) in &received {
        if !shipped.contains_key(&product_id) {
            discrepancies.push(ShipmentDiscrepancy {
                product_id,
                expected: 0,
                received: got,
                message: format!("Unexpected product received ({})", got),
            });
        }
    }
    discrepancies.sort_by_key(|d| d.product_id);
    Ok(discrepancies)
}

/// Creates and receives shipments
pub struct ShipmentAggregator {
    storage: OpsStorage,
    projector: Arc<StockProjector>,
    hub: Arc<BroadcastHub>,
    product_locks: Arc<KeyedLocks<ProductId>>,
    lock_timeout: Duration,
}

impl ShipmentAggregator {
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

    /// Debit stock across products as one committed shipment
    pub fn create_shipment(
        &self,
        items: Vec<ShipmentItem>,
        note: Option<String>,
    ) -> OpsResult<Shipment> {
        if items.is_empty() {
            return Err(OpsError::EmptyShipment);
        }
        if let Some(item) = items.iter().find(|i| i.quantity <= 0) {
            return Err(OpsError::InvalidQuantity(format!(
                "shipment quantity for product {} must be positive, got {}",
                item.product_id, item.quantity
            )));
        }

        let requested = totals_by_product(&items)?;
        let _guard = self
            .product_locks
            .acquire_many(requested.keys().copied(), self.lock_timeout)?;

        let txn = self.storage.begin_write()?;
        for (&product_id, &quantity) in &requested {
            if self.storage.get_product_txn(&txn, product_id)?.is_none() {
                txn.abort().map_err(StorageError::from)?;
                return Err(OpsError::ProductNotFound(product_id));
            }
            let available = self.projector.stock_in_txn(&txn, product_id)?;
            if available < quantity {
                txn.abort().map_err(StorageError::from)?;
                tracing::info!(
                    product_id,
                    requested = quantity,
                    available,
                    "Shipment rejected: insufficient stock"
                );
                return Err(OpsError::InsufficientStock {
                    product_id,
                    requested: quantity,
                    available,
                });
            }
        }

        let shipment = Shipment {
            id: self.storage.next_sequence(&txn, SHIPMENT_SEQUENCE)?,
            items,
            note,
            status: ShipmentStatus::Pending,
            created_at: shared::util::now_millis(),
            delivered_at: None,
        };
        self.storage.store_shipment(&txn, &shipment)?;
        self.storage.store_shipment_debits(&txn, &shipment)?;

        let debit_note = format!("Shipped in batch #{}", shipment.id);
        let mut last_events = HashMap::new();
        for item in &shipment.items {
            let event = write_event(
                &self.storage,
                &txn,
                NewEvent {
                    product_id: item.product_id,
                    kind: QuantityEventKind::Move,
                    counter: Counter::Slaughter,
                    delta: -item.quantity,
                    note: Some(debit_note.clone()),
                    shipment_id: Some(shipment.id),
                },
            )?;
            last_events.insert(item.product_id, event);
        }

        // 每个产品一条库存增量，携带该产品最后一条扣减事件
        let mut changes = Vec::with_capacity(requested.len() + 1);
        for product_id in requested.keys() {
            if let Some(event) = last_events.remove(product_id) {
                changes.push(DeltaChange::StockChanged {
                    product_id: *product_id,
                    stock: self.projector.stock_in_txn(&txn, *product_id)?,
                    event,
                });
            }
        }
        changes.push(DeltaChange::ShipmentCommitted {
            shipment: shipment.clone(),
        });

        let shipment = self.hub.publish_committed(|| {
            txn.commit().map_err(StorageError::from)?;
            for product_id in requested.keys() {
                self.projector.invalidate(*product_id);
            }
            Ok::<_, OpsError>((shipment, changes))
        })?;

        tracing::info!(
            shipment_id = shipment.id,
            items = shipment.items.len(),
            products = requested.len(),
            "Shipment committed"
        );
        Ok(shipment)
    }

    /// Mark a pending shipment delivered and log any receipt mismatch
    ///
    /// Stock is not touched; the debit happened when the shipment was created.
    pub fn receive_shipment(
        &self,
        shipment_id: ShipmentId,
        received: Vec<ShipmentItem>,
    ) -> OpsResult<ShipmentReceipt> {
        if let Some(item) = received.iter().find(|i| i.quantity < 0) {
            return Err(OpsError::InvalidQuantity(format!(
                "received quantity for product {} cannot be negative",
                item.product_id
            )));
        }

        let txn = self.storage.begin_write()?;
        let mut shipment = self
            .storage
            .get_shipment_txn(&txn, shipment_id)?
            .ok_or(OpsError::ShipmentNotFound(shipment_id))?;
        if shipment.status == ShipmentStatus::Delivered {
            return Err(OpsError::ShipmentAlreadyDelivered(shipment_id));
        }

        let discrepancies = compare_receipt(&shipment.items, &received)?;
        let mut entries = Vec::with_capacity(discrepancies.len());
        for d in &discrepancies {
            entries.push(write_error_log(
                &self.storage,
                &txn,
                d.product_id,
                SHIPMENT_DISCREPANCY,
                format!("Shipment #{}: {}", shipment_id, d.message),
            )?);
        }

        shipment.status = ShipmentStatus::Delivered;
        shipment.delivered_at = Some(shared::util::now_millis());
        self.storage.store_shipment(&txn, &shipment)?;

        let mut changes = vec![DeltaChange::ShipmentDelivered {
            shipment: shipment.clone(),
        }];
        changes.extend(entries.into_iter().map(|entry| DeltaChange::ErrorLogged { entry }));

        let shipment = self.hub.publish_committed(|| {
            txn.commit().map_err(StorageError::from)?;
            Ok::<_, OpsError>((shipment, changes))
        })?;

        if discrepancies.is_empty() {
            tracing::info!(shipment_id, "Shipment received");
        } else {
            tracing::warn!(
                shipment_id,
                discrepancies = discrepancies.len(),
                "Shipment received with discrepancies"
            );
        }
        Ok(ShipmentReceipt {
            shipment,
            discrepancies,
        })
    }

    pub fn get_shipment(&self, shipment_id: ShipmentId) -> OpsResult<Shipment> {
        self.storage
            .get_shipment(shipment_id)?
            .ok_or(OpsError::ShipmentNotFound(shipment_id))
    }

    /// All shipments, oldest first
    pub fn list_shipments(&self) -> OpsResult<Vec<Shipment>> {
        Ok(self.storage.list_shipments()?)
    }

    pub fn pending_shipments(&self) -> OpsResult<Vec<Shipment>> {
        Ok(self
            .storage
            .list_shipments()?
            .into_iter()
            .filter(|s| s.status == ShipmentStatus::Pending)
            .collect())
    }
}
