//! OpsService - the operations core facade
//!
//! Wires storage, allocator, ledger, projector, shipments and the broadcast
//! hub together and exposes the caller-facing operations:
//!
//! | Operation | Component |
//! |-----------|-----------|
//! | `allocate` | [`SequenceAllocator`] |
//! | `append_quantity_event` | [`QuantityLedger`] |
//! | `current_stock` | [`StockProjector`] |
//! | `create_shipment` / `receive_shipment` | [`ShipmentAggregator`] |
//! | `subscribe` / `unsubscribe` | [`BroadcastHub`] |
//! | `plan_pagination` | [`pagination::plan`] |
//!
//! All operations are synchronous; async callers should run them on a
//! blocking thread (`tokio::task::spawn_blocking`). Every failure carries an
//! [`ErrorKind`]; `Conflict` and `Unavailable` are safe to retry.

mod error;
mod locks;
mod snapshot;

pub use error::{ErrorKind, OpsError, OpsResult};
pub use locks::{KeyGuard, KeyedLocks};
pub use snapshot::LedgerSnapshotSource;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use shared::models::{
    Animal, AnimalType, AnimalTypeCreate, AnimalTypeId, Counter, ErrorLog, Product,
    ProductCreate, ProductId, ProductStock, QuantityEvent, QuantityEventKind, Shipment,
    ShipmentId, ShipmentItem, ShipmentReceipt,
};

use crate::allocator::SequenceAllocator;
use crate::ledger::QuantityLedger;
use crate::message::{BroadcastHub, StationStream};
use crate::pagination::{self, PaginationPlan};
use crate::shipments::ShipmentAggregator;
use crate::stock::StockProjector;
use crate::storage::{
    ANIMAL_TYPE_SEQUENCE, OpsStorage, PRODUCT_SEQUENCE, StorageError, StorageStats,
};

/// Tunables for the operations core
#[derive(Debug, Clone)]
pub struct OpsConfig {
    /// Bounded wait on any serialization point
    pub lock_timeout: Duration,
    /// Per-station outgoing queue bound
    pub station_queue_capacity: usize,
    /// Error log entries included in station snapshots
    pub error_log_tail: usize,
}

impl Default for OpsConfig {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_millis(2000),
            station_queue_capacity: 256,
            error_log_tail: 50,
        }
    }
}

/// Operations core
pub struct OpsService {
    storage: OpsStorage,
    allocator: SequenceAllocator,
    ledger: QuantityLedger,
    projector: Arc<StockProjector>,
    shipments: ShipmentAggregator,
    hub: Arc<BroadcastHub>,
}

impl std::fmt::Debug for OpsService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpsService")
            .field("storage", &"<OpsStorage>")
            .field("hub_version", &self.hub.version())
            .field("stations", &self.hub.station_count())
            .finish()
    }
}

impl OpsService {
    /// Open (or create) the database at `db_path`
    pub fn open(db_path: impl AsRef<Path>, config: OpsConfig) -> OpsResult<Self> {
        let storage = OpsStorage::open(db_path)?;
        Ok(Self::new(storage, config))
    }

    pub fn new(storage: OpsStorage, config: OpsConfig) -> Self {
        let projector = Arc::new(StockProjector::new(storage.clone()));
        let source = Arc::new(LedgerSnapshotSource::new(
            storage.clone(),
            projector.clone(),
            config.error_log_tail,
        ));
        let hub = Arc::new(BroadcastHub::new(source, config.station_queue_capacity));
        let product_locks = Arc::new(KeyedLocks::new("product"));

        Self {
            allocator: SequenceAllocator::new(storage.clone(), config.lock_timeout),
            ledger: QuantityLedger::new(
                storage.clone(),
                projector.clone(),
                hub.clone(),
                product_locks.clone(),
                config.lock_timeout,
            ),
            shipments: ShipmentAggregator::new(
                storage.clone(),
                projector.clone(),
                hub.clone(),
                product_locks,
                config.lock_timeout,
            ),
            storage,
            projector,
            hub,
        }
    }

    // ========== Catalog ==========

    pub fn create_animal_type(&self, create: AnimalTypeCreate) -> OpsResult<AnimalType> {
        let name = create.name.trim();
        if name.is_empty() {
            return Err(OpsError::InvalidArgument(
                "animal type name is required".to_string(),
            ));
        }

        let txn = self.storage.begin_write()?;
        let exists = self
            .storage
            .list_animal_types_txn(&txn)?
            .iter()
            .any(|t| t.name == name);
        if exists {
            return Err(OpsError::AlreadyExists(format!("animal type {}", name)));
        }

        let animal_type = AnimalType {
            id: self.storage.next_catalog_id(&txn, ANIMAL_TYPE_SEQUENCE)?,
            name: name.to_string(),
            species: create.species,
            target: create.target,
            created_at: shared::util::now_millis(),
        };
        self.storage.store_animal_type(&txn, &animal_type)?;
        txn.commit().map_err(StorageError::from)?;

        tracing::info!(
            type_id = animal_type.id,
            name = %animal_type.name,
            species = %animal_type.species,
            target = animal_type.target,
            "Animal type created"
        );
        Ok(animal_type)
    }

    pub fn get_animal_type(&self, type_id: AnimalTypeId) -> OpsResult<AnimalType> {
        self.storage
            .get_animal_type(type_id)?
            .ok_or(OpsError::AnimalTypeNotFound(type_id))
    }

    pub fn list_animal_types(&self) -> OpsResult<Vec<AnimalType>> {
        Ok(self.storage.list_animal_types()?)
    }

    pub fn create_product(&self, create: ProductCreate) -> OpsResult<Product> {
        let name = create.name.trim();
        if name.is_empty() {
            return Err(OpsError::InvalidArgument(
                "product name is required".to_string(),
            ));
        }

        let txn = self.storage.begin_write()?;
        if let Some(type_id) = create.animal_type_id
            && self.storage.get_animal_type_txn(&txn, type_id)?.is_none()
        {
            return Err(OpsError::AnimalTypeNotFound(type_id));
        }

        let product = Product {
            id: self.storage.next_catalog_id(&txn, PRODUCT_SEQUENCE)?,
            name: name.to_string(),
            kind: create.kind,
            animal_type_id: create.animal_type_id,
            created_at: shared::util::now_millis(),
        };
        self.storage.store_product(&txn, &product)?;
        txn.commit().map_err(StorageError::from)?;

        tracing::info!(product_id = product.id, name = %product.name, "Product created");
        Ok(product)
    }

    pub fn get_product(&self, product_id: ProductId) -> OpsResult<Product> {
        self.storage
            .get_product(product_id)?
            .ok_or(OpsError::ProductNotFound(product_id))
    }

    pub fn list_products(&self) -> OpsResult<Vec<Product>> {
        Ok(self.storage.list_products()?)
    }

    // ========== Animals ==========

    /// Allocate the next identifier of an animal type
    pub fn allocate(&self, type_id: AnimalTypeId) -> OpsResult<String> {
        self.allocator.allocate(type_id).map(|animal| animal.identifier)
    }

    /// Allocate several animals of one type in a single commit
    pub fn register_animals(&self, type_id: AnimalTypeId, count: u32) -> OpsResult<Vec<Animal>> {
        self.allocator.allocate_many(type_id, count)
    }

    pub fn get_animal(&self, identifier: &str) -> OpsResult<Animal> {
        self.storage
            .get_animal(identifier)?
            .ok_or_else(|| OpsError::AnimalNotFound(identifier.to_string()))
    }

    pub fn animals_of_type(&self, type_id: AnimalTypeId) -> OpsResult<Vec<Animal>> {
        self.get_animal_type(type_id)?;
        Ok(self.storage.list_animals(type_id)?)
    }

    /// Delete an animal record; its identifier stays retired
    pub fn remove_animal(&self, identifier: &str) -> OpsResult<Animal> {
        let txn = self.storage.begin_write()?;
        let removed = self
            .storage
            .remove_animal(&txn, identifier)?
            .ok_or_else(|| OpsError::AnimalNotFound(identifier.to_string()))?;
        txn.commit().map_err(StorageError::from)?;
        tracing::info!(identifier, type_id = removed.type_id, "Animal removed");
        Ok(removed)
    }

    pub fn record_slaughter(&self, identifier: &str) -> OpsResult<Animal> {
        self.ledger.record_slaughter(identifier)
    }

    // ========== Ledger & Stock ==========

    pub fn append_quantity_event(
        &self,
        product_id: ProductId,
        kind: QuantityEventKind,
        counter: Counter,
        delta: i64,
        note: Option<String>,
    ) -> OpsResult<QuantityEvent> {
        self.ledger.append(product_id, kind, counter, delta, note)
    }

    pub fn current_stock(&self, product_id: ProductId) -> OpsResult<i64> {
        self.projector.current_stock(product_id)
    }

    /// Rebuild a product's stock from the full ledger, bypassing the cache
    pub fn recompute_stock(&self, product_id: ProductId) -> OpsResult<i64> {
        self.projector.recompute(product_id)
    }

    pub fn all_stocks(&self) -> OpsResult<Vec<ProductStock>> {
        self.projector.all_stocks()
    }

    pub fn product_events(&self, product_id: ProductId) -> OpsResult<Vec<QuantityEvent>> {
        self.ledger.history(product_id)
    }

    /// Error log entries, newest first
    pub fn error_logs(&self, limit: usize) -> OpsResult<Vec<ErrorLog>> {
        Ok(self.storage.recent_error_logs(limit)?)
    }

    // ========== Shipments ==========

    pub fn create_shipment(
        &self,
        items: Vec<ShipmentItem>,
        note: Option<String>,
    ) -> OpsResult<Shipment> {
        self.shipments.create_shipment(items, note)
    }

    pub fn receive_shipment(
        &self,
        shipment_id: ShipmentId,
        received: Vec<ShipmentItem>,
    ) -> OpsResult<ShipmentReceipt> {
        self.shipments.receive_shipment(shipment_id, received)
    }

    pub fn get_shipment(&self, shipment_id: ShipmentId) -> OpsResult<Shipment> {
        self.shipments.get_shipment(shipment_id)
    }

    pub fn list_shipments(&self) -> OpsResult<Vec<Shipment>> {
        self.shipments.list_shipments()
    }

    pub fn pending_shipments(&self) -> OpsResult<Vec<Shipment>> {
        self.shipments.pending_shipments()
    }

    // ========== Stations ==========

    pub fn subscribe(&self, station_id: &str) -> OpsResult<StationStream> {
        self.hub.subscribe(station_id)
    }

    pub fn unsubscribe(&self, station_id: &str) -> bool {
        self.hub.unsubscribe(station_id)
    }

    pub fn hub(&self) -> &Arc<BroadcastHub> {
        &self.hub
    }

    // ========== Misc ==========

    pub fn plan_pagination(
        &self,
        target_quota: u32,
        total_count: u64,
        items_per_group: u32,
    ) -> PaginationPlan {
        pagination::plan(target_quota, total_count, items_per_group)
    }

    pub fn stats(&self) -> OpsResult<StorageStats> {
        Ok(self.storage.get_stats()?)
    }

    /// Close every station session
    pub fn shutdown(&self) {
        self.hub.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::models::{ProductKind, Species};

    fn service() -> OpsService {
        OpsService::new(OpsStorage::open_in_memory().unwrap(), OpsConfig::default())
    }

    fn sapi(ops: &OpsService) -> AnimalType {
        ops.create_animal_type(AnimalTypeCreate {
            name: "Sapi".to_string(),
            species: Species::Sapi,
            target: 7,
        })
        .unwrap()
    }

    #[test]
    fn test_catalog_validation() {
        let ops = service();
        sapi(&ops);

        let dup = ops.create_animal_type(AnimalTypeCreate {
            name: " Sapi ".to_string(),
            species: Species::Sapi,
            target: 3,
        });
        assert!(matches!(dup, Err(OpsError::AlreadyExists(_))));

        let blank = ops.create_product(ProductCreate {
            name: "  ".to_string(),
            kind: ProductKind::Daging,
            animal_type_id: None,
        });
        assert_eq!(blank.unwrap_err().kind(), ErrorKind::InvalidArgument);

        let orphan = ops.create_product(ProductCreate {
            name: "Kulit".to_string(),
            kind: ProductKind::Kulit,
            animal_type_id: Some(123),
        });
        assert!(matches!(orphan, Err(OpsError::AnimalTypeNotFound(123))));
    }

    #[test]
    fn test_catalog_ids_never_collide() {
        let ops = service();
        let t = sapi(&ops);
        let second = ops
            .create_animal_type(AnimalTypeCreate {
                name: "Domba".to_string(),
                species: Species::Domba,
                target: 60,
            })
            .unwrap();
        assert_ne!(t.id, second.id);

        const N: usize = 5000;
        let mut ids = std::collections::HashSet::new();
        for i in 0..N {
            let product = ops
                .create_product(ProductCreate {
                    name: format!("Paket {}", i),
                    kind: ProductKind::Daging,
                    animal_type_id: Some(t.id),
                })
                .unwrap();
            ids.insert(product.id);
        }
        assert_eq!(ids.len(), N);
        assert_eq!(ops.list_products().unwrap().len(), N);
    }

    #[test]
    fn test_allocate_and_list_animals() {
        let ops = service();
        let t = sapi(&ops);

        assert_eq!(ops.allocate(t.id).unwrap(), "Sapi_1");
        let batch = ops.register_animals(t.id, 2).unwrap();
        assert_eq!(batch[1].identifier, "Sapi_3");
        assert_eq!(ops.animals_of_type(t.id).unwrap().len(), 3);

        ops.remove_animal("Sapi_2").unwrap();
        assert_eq!(ops.get_animal("Sapi_2").unwrap_err().kind(), ErrorKind::NotFound);
        assert_eq!(ops.allocate(t.id).unwrap(), "Sapi_4");
        assert!(ops.animals_of_type(999).is_err());
    }

    #[test]
    fn test_end_to_end_flow() {
        let ops = service();
        let t = sapi(&ops);
        let kulit = ops
            .create_product(ProductCreate {
                name: "Kulit Sapi".to_string(),
                kind: ProductKind::Kulit,
                animal_type_id: Some(t.id),
            })
            .unwrap();

        let first = ops.allocate(t.id).unwrap();
        let second = ops.allocate(t.id).unwrap();
        ops.record_slaughter(&first).unwrap();
        ops.record_slaughter(&second).unwrap();
        assert_eq!(ops.current_stock(kulit.id).unwrap(), 2);

        let shipment = ops
            .create_shipment(vec![ShipmentItem::new(kulit.id, 2)], None)
            .unwrap();
        assert_eq!(ops.current_stock(kulit.id).unwrap(), 0);
        assert_eq!(ops.pending_shipments().unwrap().len(), 1);

        ops.receive_shipment(shipment.id, vec![ShipmentItem::new(kulit.id, 2)])
            .unwrap();
        assert!(ops.pending_shipments().unwrap().is_empty());
        assert!(ops.error_logs(10).unwrap().is_empty());
        assert_eq!(ops.product_events(kulit.id).unwrap().len(), 3);

        let stats = ops.stats().unwrap();
        assert_eq!(stats.shipments, 1);
        assert_eq!(stats.events, 3);
    }

    #[test]
    fn test_snapshot_contents() {
        let ops = service();
        let product = ops
            .create_product(ProductCreate {
                name: "Jeroan".to_string(),
                kind: ProductKind::Jeroan,
                animal_type_id: None,
            })
            .unwrap();
        ops.append_quantity_event(product.id, QuantityEventKind::Add, Counter::Inventory, 3, None)
            .unwrap();
        ops.create_shipment(vec![ShipmentItem::new(product.id, 1)], None)
            .unwrap();

        let mut stream = ops.subscribe("dashboard").unwrap();
        match stream.try_recv().unwrap() {
            shared::message::StationMessage::Snapshot(snapshot) => {
                assert_eq!(snapshot.stocks.len(), 1);
                assert_eq!(snapshot.stocks[0].stock, 2);
                // received 3 > origin 0
                assert_eq!(snapshot.error_logs.len(), 1);
                assert_eq!(snapshot.pending_shipments.len(), 1);
                assert_eq!(snapshot.version, ops.hub().version());
            }
            other => panic!("expected snapshot, got {:?}", other),
        }
        assert!(ops.unsubscribe("dashboard"));
    }

    #[test]
    fn test_plan_pagination() {
        let ops = service();
        assert_eq!(ops.plan_pagination(10, 55, 5).page_size, 15);
    }
}
