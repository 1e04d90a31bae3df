//! redb-based storage layer for the operations ledger
//!
//! # Tables
//!
//! | Table | Key | Value | Purpose |
//! |-------|-----|-------|---------|
//! | `animal_types` | `type_id` | `AnimalType` | Animal type catalog |
//! | `animals` | `(type_id, allocation_index)` | `Animal` | Allocated animals |
//! | `animal_identifiers` | `identifier` | `(type_id, allocation_index)` | Identifier lookup |
//! | `allocation_counters` | `type_id` | `u64` | Per-type allocation counter (never decremented) |
//! | `products` | `product_id` | `Product` | Product catalog |
//! | `events` | `(product_id, sequence)` | `QuantityEvent` | Quantity ledger (append-only) |
//! | `shipments` | `shipment_id` | `Shipment` | Shipment records |
//! | `shipment_debits` | `(product_id, shipment_id, line)` | `i64` | Per-product shipment debit index |
//! | `error_logs` | `log_id` | `ErrorLog` | Discrepancy log |
//! | `sequence_counter` | name | `u64` | Ledger / shipment / error log sequences |
//!
//! # Durability
//!
//! redb commits with `Durability::Immediate`: once `commit()` returns the
//! write survives a crash, and a dropped transaction leaves no trace.
//! Derived values (stock levels) are never stored here; they are
//! recomputed from the event and shipment tables.

use redb::{
    Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, TableDefinition,
    WriteTransaction,
};
use serde::de::DeserializeOwned;
use shared::models::{
    Animal, AnimalType, AnimalTypeId, ErrorLog, Product, ProductId, QuantityEvent, Shipment,
    ShipmentId,
};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

/// Animal type catalog: key = type_id, value = JSON-serialized AnimalType
const ANIMAL_TYPES_TABLE: TableDefinition<i64, &[u8]> = TableDefinition::new("animal_types");

/// Animals: key = (type_id, allocation_index), value = JSON-serialized Animal
const ANIMALS_TABLE: TableDefinition<(i64, u64), &[u8]> = TableDefinition::new("animals");

/// Identifier index: key = identifier, value = (type_id, allocation_index)
const ANIMAL_IDENTIFIERS_TABLE: TableDefinition<&str, (i64, u64)> =
    TableDefinition::new("animal_identifiers");

/// Allocation counters: key = type_id, value = number of identifiers ever allocated
const ALLOCATION_COUNTERS_TABLE: TableDefinition<i64, u64> =
    TableDefinition::new("allocation_counters");

/// Product catalog: key = product_id, value = JSON-serialized Product
const PRODUCTS_TABLE: TableDefinition<i64, &[u8]> = TableDefinition::new("products");

/// Quantity ledger: key = (product_id, sequence), value = JSON-serialized QuantityEvent
const EVENTS_TABLE: TableDefinition<(i64, u64), &[u8]> = TableDefinition::new("events");

/// Shipments: key = shipment_id, value = JSON-serialized Shipment
const SHIPMENTS_TABLE: TableDefinition<u64, &[u8]> = TableDefinition::new("shipments");

/// Shipment debit index: key = (product_id, shipment_id, line), value = quantity
const SHIPMENT_DEBITS_TABLE: TableDefinition<(i64, u64, u32), i64> =
    TableDefinition::new("shipment_debits");

/// Error logs: key = log_id, value = JSON-serialized ErrorLog
const ERROR_LOGS_TABLE: TableDefinition<u64, &[u8]> = TableDefinition::new("error_logs");

/// Sequences: key = name, value = u64
const SEQUENCE_TABLE: TableDefinition<&str, u64> = TableDefinition::new("sequence_counter");

/// Global ledger sequence (orders every quantity event)
pub const LEDGER_SEQUENCE: &str = "seq";
/// Shipment id counter
pub const SHIPMENT_SEQUENCE: &str = "shipment_count";
/// Error log id counter
pub const ERROR_LOG_SEQUENCE: &str = "error_log_count";
/// Animal type id counter
pub const ANIMAL_TYPE_SEQUENCE: &str = "animal_type_count";
/// Product id counter
pub const PRODUCT_SEQUENCE: &str = "product_count";

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] redb::DatabaseError),

    #[error("Transaction error: {0}")]
    Transaction(#[from] redb::TransactionError),

    #[error("Table error: {0}")]
    Table(#[from] redb::TableError),

    #[error("Storage error: {0}")]
    Storage(#[from] redb::StorageError),

    #[error("Commit error: {0}")]
    Commit(#[from] redb::CommitError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Sequence exhausted: {0}")]
    SequenceExhausted(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Everything stock projection needs for one product, read in one transaction
#[derive(Debug, Clone, Default)]
pub struct ProductLedger {
    pub events: Vec<QuantityEvent>,
    pub shipment_debits: Vec<i64>,
}

/// Row counts per table
#[derive(Debug, Clone, Copy, Default)]
pub struct StorageStats {
    pub animal_types: u64,
    pub animals: u64,
    pub products: u64,
    pub events: u64,
    pub shipments: u64,
    pub error_logs: u64,
}

/// Ledger storage backed by redb
#[derive(Clone)]
pub struct OpsStorage {
    db: Arc<Database>,
}

impl OpsStorage {
    /// Open or create the database at the given path
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let db = Database::create(path)?;
        Self::init(db)
    }

    /// Open an in-memory database
    pub fn open_in_memory() -> StorageResult<Self> {
        let db = Database::builder().create_with_backend(redb::backends::InMemoryBackend::new())?;
        Self::init(db)
    }

    fn init(db: Database) -> StorageResult<Self> {
        let write_txn = db.begin_write()?;
        {
            // Create all tables if they don't exist
            let _ = write_txn.open_table(ANIMAL_TYPES_TABLE)?;
            let _ = write_txn.open_table(ANIMALS_TABLE)?;
            let _ = write_txn.open_table(ANIMAL_IDENTIFIERS_TABLE)?;
            let _ = write_txn.open_table(ALLOCATION_COUNTERS_TABLE)?;
            let _ = write_txn.open_table(PRODUCTS_TABLE)?;
            let _ = write_txn.open_table(EVENTS_TABLE)?;
            let _ = write_txn.open_table(SHIPMENTS_TABLE)?;
            let _ = write_txn.open_table(SHIPMENT_DEBITS_TABLE)?;
            let _ = write_txn.open_table(ERROR_LOGS_TABLE)?;

            let mut seq_table = write_txn.open_table(SEQUENCE_TABLE)?;
            for key in [
                LEDGER_SEQUENCE,
                SHIPMENT_SEQUENCE,
                ERROR_LOG_SEQUENCE,
                ANIMAL_TYPE_SEQUENCE,
                PRODUCT_SEQUENCE,
            ] {
                if seq_table.get(key)?.is_none() {
                    seq_table.insert(key, 0u64)?;
                }
            }
        }
        write_txn.commit()?;

        Ok(Self { db: Arc::new(db) })
    }

    /// Begin a write transaction
    ///
    /// redb allows one writer at a time; a second caller waits here until
    /// the first commits or aborts.
    pub fn begin_write(&self) -> StorageResult<WriteTransaction> {
        Ok(self.db.begin_write()?)
    }

    // ========== Sequence Operations ==========

    /// Increment and return the named sequence (within transaction)
    pub fn next_sequence(&self, txn: &WriteTransaction, name: &str) -> StorageResult<u64> {
        let mut table = txn.open_table(SEQUENCE_TABLE)?;
        let current = table.get(name)?.map(|guard| guard.value()).unwrap_or(0);
        let next = current + 1;
        table.insert(name, next)?;
        Ok(next)
    }

    /// Next catalog id from the named sequence (within transaction)
    ///
    /// redb `insert` overwrites silently, so catalog keys must never repeat.
    pub fn next_catalog_id(&self, txn: &WriteTransaction, name: &str) -> StorageResult<i64> {
        let next = self.next_sequence(txn, name)?;
        i64::try_from(next).map_err(|_| StorageError::SequenceExhausted(name.to_string()))
    }

    /// Get the current value of a named sequence (read-only)
    pub fn current_sequence(&self, name: &str) -> StorageResult<u64> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(SEQUENCE_TABLE)?;
        Ok(table.get(name)?.map(|guard| guard.value()).unwrap_or(0))
    }

    // ========== Animal Types ==========

    pub fn store_animal_type(
        &self,
        txn: &WriteTransaction,
        animal_type: &AnimalType,
    ) -> StorageResult<()> {
        let mut table = txn.open_table(ANIMAL_TYPES_TABLE)?;
        let value = serde_json::to_vec(animal_type)?;
        table.insert(animal_type.id, value.as_slice())?;
        Ok(())
    }

    pub fn get_animal_type(&self, type_id: AnimalTypeId) -> StorageResult<Option<AnimalType>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ANIMAL_TYPES_TABLE)?;
        get_json(&table, type_id)
    }

    pub fn get_animal_type_txn(
        &self,
        txn: &WriteTransaction,
        type_id: AnimalTypeId,
    ) -> StorageResult<Option<AnimalType>> {
        let table = txn.open_table(ANIMAL_TYPES_TABLE)?;
        get_json(&table, type_id)
    }

    pub fn list_animal_types(&self) -> StorageResult<Vec<AnimalType>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ANIMAL_TYPES_TABLE)?;
        all_json(&table)
    }

    pub fn list_animal_types_txn(&self, txn: &WriteTransaction) -> StorageResult<Vec<AnimalType>> {
        let table = txn.open_table(ANIMAL_TYPES_TABLE)?;
        all_json(&table)
    }

    // ========== Allocation Counters ==========

    /// Number of identifiers ever allocated for a type (within transaction)
    pub fn allocation_count_txn(
        &self,
        txn: &WriteTransaction,
        type_id: AnimalTypeId,
    ) -> StorageResult<u64> {
        let table = txn.open_table(ALLOCATION_COUNTERS_TABLE)?;
        Ok(table.get(type_id)?.map(|guard| guard.value()).unwrap_or(0))
    }

    pub fn set_allocation_count(
        &self,
        txn: &WriteTransaction,
        type_id: AnimalTypeId,
        count: u64,
    ) -> StorageResult<()> {
        let mut table = txn.open_table(ALLOCATION_COUNTERS_TABLE)?;
        table.insert(type_id, count)?;
        Ok(())
    }

    pub fn allocation_count(&self, type_id: AnimalTypeId) -> StorageResult<u64> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ALLOCATION_COUNTERS_TABLE)?;
        Ok(table.get(type_id)?.map(|guard| guard.value()).unwrap_or(0))
    }

    // ========== Animals ==========

    /// Insert or overwrite an animal and its identifier index entry
    pub fn store_animal(&self, txn: &WriteTransaction, animal: &Animal) -> StorageResult<()> {
        let key = (animal.type_id, animal.allocation_index);
        let value = serde_json::to_vec(animal)?;
        {
            let mut table = txn.open_table(ANIMALS_TABLE)?;
            table.insert(key, value.as_slice())?;
        }
        let mut index = txn.open_table(ANIMAL_IDENTIFIERS_TABLE)?;
        index.insert(animal.identifier.as_str(), key)?;
        Ok(())
    }

    pub fn identifier_exists_txn(
        &self,
        txn: &WriteTransaction,
        identifier: &str,
    ) -> StorageResult<bool> {
        let index = txn.open_table(ANIMAL_IDENTIFIERS_TABLE)?;
        Ok(index.get(identifier)?.is_some())
    }

    pub fn get_animal(&self, identifier: &str) -> StorageResult<Option<Animal>> {
        let read_txn = self.db.begin_read()?;
        let index = read_txn.open_table(ANIMAL_IDENTIFIERS_TABLE)?;
        let Some(key) = index.get(identifier)?.map(|guard| guard.value()) else {
            return Ok(None);
        };
        let table = read_txn.open_table(ANIMALS_TABLE)?;
        get_json(&table, key)
    }

    pub fn get_animal_txn(
        &self,
        txn: &WriteTransaction,
        identifier: &str,
    ) -> StorageResult<Option<Animal>> {
        let key = {
            let index = txn.open_table(ANIMAL_IDENTIFIERS_TABLE)?;
            index.get(identifier)?.map(|guard| guard.value())
        };
        let Some(key) = key else {
            return Ok(None);
        };
        let table = txn.open_table(ANIMALS_TABLE)?;
        get_json(&table, key)
    }

    /// Animals of one type, in allocation order
    pub fn list_animals(&self, type_id: AnimalTypeId) -> StorageResult<Vec<Animal>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ANIMALS_TABLE)?;
        range_json(&table, (type_id, 0u64)..=(type_id, u64::MAX))
    }

    /// Remove an animal record (the allocation counter is left untouched)
    pub fn remove_animal(
        &self,
        txn: &WriteTransaction,
        identifier: &str,
    ) -> StorageResult<Option<Animal>> {
        let key = {
            let mut index = txn.open_table(ANIMAL_IDENTIFIERS_TABLE)?;
            index.remove(identifier)?.map(|guard| guard.value())
        };
        let Some(key) = key else {
            return Ok(None);
        };
        let mut table = txn.open_table(ANIMALS_TABLE)?;
        let removed = table.remove(key)?;
        match removed {
            Some(guard) => Ok(Some(serde_json::from_slice(guard.value())?)),
            None => Ok(None),
        }
    }

    // ========== Products ==========

    pub fn store_product(&self, txn: &WriteTransaction, product: &Product) -> StorageResult<()> {
        let mut table = txn.open_table(PRODUCTS_TABLE)?;
        let value = serde_json::to_vec(product)?;
        table.insert(product.id, value.as_slice())?;
        Ok(())
    }

    pub fn get_product(&self, product_id: ProductId) -> StorageResult<Option<Product>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(PRODUCTS_TABLE)?;
        get_json(&table, product_id)
    }

    pub fn get_product_txn(
        &self,
        txn: &WriteTransaction,
        product_id: ProductId,
    ) -> StorageResult<Option<Product>> {
        let table = txn.open_table(PRODUCTS_TABLE)?;
        get_json(&table, product_id)
    }

    pub fn list_products(&self) -> StorageResult<Vec<Product>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(PRODUCTS_TABLE)?;
        all_json(&table)
    }

    /// Products bound to an animal type (within transaction)
    pub fn products_for_type_txn(
        &self,
        txn: &WriteTransaction,
        type_id: AnimalTypeId,
    ) -> StorageResult<Vec<Product>> {
        let table = txn.open_table(PRODUCTS_TABLE)?;
        let products: Vec<Product> = all_json(&table)?;
        Ok(products
            .into_iter()
            .filter(|p| p.animal_type_id == Some(type_id))
            .collect())
    }

    pub fn products_for_type(&self, type_id: AnimalTypeId) -> StorageResult<Vec<Product>> {
        Ok(self
            .list_products()?
            .into_iter()
            .filter(|p| p.animal_type_id == Some(type_id))
            .collect())
    }

    // ========== Quantity Events ==========

    /// Append an event
    pub fn store_event(&self, txn: &WriteTransaction, event: &QuantityEvent) -> StorageResult<()> {
        let mut table = txn.open_table(EVENTS_TABLE)?;
        let key = (event.product_id, event.sequence);
        let value = serde_json::to_vec(event)?;
        table.insert(key, value.as_slice())?;
        Ok(())
    }

    /// All events for a product, in sequence order
    pub fn get_events_for_product(&self, product_id: ProductId) -> StorageResult<Vec<QuantityEvent>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(EVENTS_TABLE)?;
        range_json(&table, (product_id, 0u64)..=(product_id, u64::MAX))
    }

    /// Events and shipment debits of one product from a single read snapshot
    pub fn load_product_ledger(&self, product_id: ProductId) -> StorageResult<ProductLedger> {
        let read_txn = self.db.begin_read()?;
        let events = read_txn.open_table(EVENTS_TABLE)?;
        let debits = read_txn.open_table(SHIPMENT_DEBITS_TABLE)?;
        read_product_ledger(&events, &debits, product_id)
    }

    /// Same as [`Self::load_product_ledger`] but sees the transaction's own writes
    pub fn load_product_ledger_txn(
        &self,
        txn: &WriteTransaction,
        product_id: ProductId,
    ) -> StorageResult<ProductLedger> {
        let events = txn.open_table(EVENTS_TABLE)?;
        let debits = txn.open_table(SHIPMENT_DEBITS_TABLE)?;
        read_product_ledger(&events, &debits, product_id)
    }

    // ========== Shipments ==========

    /// Insert or overwrite a shipment record
    pub fn store_shipment(&self, txn: &WriteTransaction, shipment: &Shipment) -> StorageResult<()> {
        let mut table = txn.open_table(SHIPMENTS_TABLE)?;
        let value = serde_json::to_vec(shipment)?;
        table.insert(shipment.id, value.as_slice())?;
        Ok(())
    }

    /// Index each shipment line under its product
    pub fn store_shipment_debits(
        &self,
        txn: &WriteTransaction,
        shipment: &Shipment,
    ) -> StorageResult<()> {
        let mut table = txn.open_table(SHIPMENT_DEBITS_TABLE)?;
        for (line, item) in shipment.items.iter().enumerate() {
            table.insert((item.product_id, shipment.id, line as u32), item.quantity)?;
        }
        Ok(())
    }

    pub fn get_shipment(&self, shipment_id: ShipmentId) -> StorageResult<Option<Shipment>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(SHIPMENTS_TABLE)?;
        get_json(&table, shipment_id)
    }

    pub fn get_shipment_txn(
        &self,
        txn: &WriteTransaction,
        shipment_id: ShipmentId,
    ) -> StorageResult<Option<Shipment>> {
        let table = txn.open_table(SHIPMENTS_TABLE)?;
        get_json(&table, shipment_id)
    }

    /// All shipments, oldest first
    pub fn list_shipments(&self) -> StorageResult<Vec<Shipment>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(SHIPMENTS_TABLE)?;
        all_json(&table)
    }

    // ========== Error Logs ==========

    pub fn store_error_log(&self, txn: &WriteTransaction, entry: &ErrorLog) -> StorageResult<()> {
        let mut table = txn.open_table(ERROR_LOGS_TABLE)?;
        let value = serde_json::to_vec(entry)?;
        table.insert(entry.id, value.as_slice())?;
        Ok(())
    }

    /// Most recent error logs, newest first
    pub fn recent_error_logs(&self, limit: usize) -> StorageResult<Vec<ErrorLog>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(ERROR_LOGS_TABLE)?;

        let mut logs = Vec::new();
        for result in table.iter()?.rev().take(limit) {
            let (_key, value) = result?;
            logs.push(serde_json::from_slice(value.value())?);
        }
        Ok(logs)
    }

    // ========== Stats ==========

    pub fn get_stats(&self) -> StorageResult<StorageStats> {
        let read_txn = self.db.begin_read()?;
        Ok(StorageStats {
            animal_types: read_txn.open_table(ANIMAL_TYPES_TABLE)?.len()?,
            animals: read_txn.open_table(ANIMALS_TABLE)?.len()?,
            products: read_txn.open_table(PRODUCTS_TABLE)?.len()?,
            events: read_txn.open_table(EVENTS_TABLE)?.len()?,
            shipments: read_txn.open_table(SHIPMENTS_TABLE)?.len()?,
            error_logs: read_txn.open_table(ERROR_LOGS_TABLE)?.len()?,
        })
    }
}

// ========== Table helpers (shared by read and write transactions) ==========

fn get_json<K, T>(
    table: &impl ReadableTable<K, &'static [u8]>,
    key: K::SelfType<'_>,
) -> StorageResult<Option<T>>
where
    K: redb::Key + 'static,
    T: DeserializeOwned,
{
    match table.get(key)? {
        Some(guard) => Ok(Some(serde_json::from_slice(guard.value())?)),
        None => Ok(None),
    }
}

fn all_json<K, T>(table: &impl ReadableTable<K, &'static [u8]>) -> StorageResult<Vec<T>>
where
    K: redb::Key + 'static,
    T: DeserializeOwned,
{
    let mut values = Vec::new();
    for result in table.iter()? {
        let (_key, value) = result?;
        values.push(serde_json::from_slice(value.value())?);
    }
    Ok(values)
}

fn range_json<T>(
    table: &impl ReadableTable<(i64, u64), &'static [u8]>,
    range: std::ops::RangeInclusive<(i64, u64)>,
) -> StorageResult<Vec<T>>
where
    T: DeserializeOwned,
{
    let mut values = Vec::new();
    for result in table.range(range)? {
        let (_key, value) = result?;
        values.push(serde_json::from_slice(value.value())?);
    }
    Ok(values)
}

fn read_product_ledger(
    events: &impl ReadableTable<(i64, u64), &'static [u8]>,
    debits: &impl ReadableTable<(i64, u64, u32), i64>,
    product_id: ProductId,
) -> StorageResult<ProductLedger> {
    let events = range_json(events, (product_id, 0u64)..=(product_id, u64::MAX))?;

    let mut shipment_debits = Vec::new();
    for result in debits.range((product_id, 0u64, 0u32)..=(product_id, u64::MAX, u32::MAX))? {
        let (_key, value) = result?;
        shipment_debits.push(value.value());
    }

    Ok(ProductLedger {
        events,
        shipment_debits,
    })
}
