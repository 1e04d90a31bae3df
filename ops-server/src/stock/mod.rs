//! Stock projection
//!
//! Stock is never stored. It is the sum of a product's ledger events minus
//! the quantities of every shipment line referencing the product. Shipment
//! debit events (those carrying a `shipment_id`) mirror the shipment lines
//! for auditing and are not counted a second time.
//!
//! [`StockProjector`] keeps a per-product cache guarded by a generation
//! counter: writers bump the generation after commit, and a reader only
//! stores the value it computed if the generation did not move meanwhile.

use dashmap::DashMap;
use redb::WriteTransaction;
use shared::models::{Counter, ProductId, ProductStock, QuantityEvent, QuantityEventKind};

use crate::ops::{OpsError, OpsResult};
use crate::storage::{OpsStorage, ProductLedger};

/// Projected stock from a product's full history
///
/// Sums run in `i128`; a result outside `i64` is rejected, so an event that
/// would push the total out of range never commits.
pub fn project_stock(events: &[QuantityEvent], shipment_debits: &[i64]) -> OpsResult<i64> {
    let movements: i128 = events
        .iter()
        .filter(|e| !e.is_shipment_debit())
        .map(|e| i128::from(e.delta))
        .sum();
    let shipped: i128 = shipment_debits.iter().map(|&q| i128::from(q)).sum();
    narrow(movements - shipped, "stock")
}

fn narrow(total: i128, what: &str) -> OpsResult<i64> {
    i64::try_from(total)
        .map_err(|_| OpsError::InvalidQuantity(format!("{} total out of range: {}", what, total)))
}

/// Per-counter totals used for discrepancy checks
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterTotals {
    /// 屠宰 + 称重 (不含发货扣减)
    pub origin: i64,
    /// 库存点累计收货 (`add` 事件)
    pub received: i64,
}

impl CounterTotals {
    pub fn from_events(events: &[QuantityEvent]) -> OpsResult<Self> {
        let (origin, received) = events
            .iter()
            .filter(|e| !e.is_shipment_debit())
            .fold((0i128, 0i128), |(origin, received), e| {
                if e.counter.is_origin() {
                    (origin + i128::from(e.delta), received)
                } else if e.counter == Counter::Inventory && e.kind == QuantityEventKind::Add {
                    (origin, received + i128::from(e.delta))
                } else {
                    (origin, received)
                }
            });
        Ok(Self {
            origin: narrow(origin, "origin")?,
            received: narrow(received, "received")?,
        })
    }

    pub fn has_discrepancy(&self) -> bool {
        self.received > self.origin
    }
}

#[derive(Debug, Default)]
struct CacheSlot {
    generation: u64,
    stock: Option<i64>,
}

/// Derives current stock per product, with an invalidate-on-write cache
pub struct StockProjector {
    storage: OpsStorage,
    cache: DashMap<ProductId, CacheSlot>,
}

impl StockProjector {
    pub fn new(storage: OpsStorage) -> Self {
        Self {
            storage,
            cache: DashMap::new(),
        }
    }

    /// Current stock; `ProductNotFound` for unknown products
    pub fn current_stock(&self, product_id: ProductId) -> OpsResult<i64> {
        let generation = match self.cache.get(&product_id) {
            Some(slot) => match slot.stock {
                Some(stock) => return Ok(stock),
                None => slot.generation,
            },
            None => 0,
        };

        let stock = self.recompute(product_id)?;

        let mut slot = self.cache.entry(product_id).or_default();
        if slot.generation == generation {
            slot.stock = Some(stock);
        }
        Ok(stock)
    }

    /// Replay the product's history, bypassing the cache
    pub fn recompute(&self, product_id: ProductId) -> OpsResult<i64> {
        if self.storage.get_product(product_id)?.is_none() {
            return Err(OpsError::ProductNotFound(product_id));
        }
        let ledger = self.storage.load_product_ledger(product_id)?;
        project(&ledger)
    }

    /// Stock as seen by an open write transaction (includes its own writes)
    pub fn stock_in_txn(&self, txn: &WriteTransaction, product_id: ProductId) -> OpsResult<i64> {
        let ledger = self.storage.load_product_ledger_txn(txn, product_id)?;
        project(&ledger)
    }

    /// Forget the cached value; call after the write has committed
    pub fn invalidate(&self, product_id: ProductId) {
        let mut slot = self.cache.entry(product_id).or_default();
        slot.generation += 1;
        slot.stock = None;
    }

    /// Stock of every product, in catalog order
    pub fn all_stocks(&self) -> OpsResult<Vec<ProductStock>> {
        self.storage
            .list_products()?
            .into_iter()
            .map(|product| {
                Ok(ProductStock {
                    stock: self.current_stock(product.id)?,
                    product_id: product.id,
                    name: product.name,
                })
            })
            .collect()
    }

    pub fn cached_count(&self) -> usize {
        self.cache.iter().filter(|slot| slot.stock.is_some()).count()
    }
}

fn project(ledger: &ProductLedger) -> OpsResult<i64> {
    project_stock(&ledger.events, &ledger.shipment_debits)
}
