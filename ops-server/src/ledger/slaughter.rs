//! 屠宰登记：标记动物已屠宰，并为该类型的非肉类产品自动入账
//!
//! 每个关联产品追加一条 SLAUGHTER 计数点的 `add` (+1) 事件，
//! 与动物状态变更在同一事务内提交。重复登记不产生任何事件。

use std::collections::BTreeSet;

use shared::message::DeltaChange;
use shared::models::{Animal, Counter, ProductId, QuantityEventKind};

use super::{NewEvent, QuantityLedger, write_event};
use crate::ops::{OpsError, OpsResult};
use crate::storage::StorageError;

impl QuantityLedger {
    /// Mark an animal slaughtered; idempotent
    pub fn record_slaughter(&self, identifier: &str) -> OpsResult<Animal> {
        let animal = self
            .storage
            .get_animal(identifier)?
            .ok_or_else(|| OpsError::AnimalNotFound(identifier.to_string()))?;
        if animal.slaughtered {
            return Ok(animal);
        }

        let product_ids: BTreeSet<ProductId> = self
            .storage
            .products_for_type(animal.type_id)?
            .into_iter()
            .filter(|p| !p.kind.is_meat())
            .map(|p| p.id)
            .collect();
        let _guard = self
            .product_locks
            .acquire_many(product_ids.iter().copied(), self.lock_timeout)?;

        let txn = self.storage.begin_write()?;
        let mut animal = self
            .storage
            .get_animal_txn(&txn, identifier)?
            .ok_or_else(|| OpsError::AnimalNotFound(identifier.to_string()))?;
        if animal.slaughtered {
            return Ok(animal);
        }

        let current_ids: BTreeSet<ProductId> = self
            .storage
            .products_for_type_txn(&txn, animal.type_id)?
            .into_iter()
            .filter(|p| !p.kind.is_meat())
            .map(|p| p.id)
            .collect();
        if current_ids != product_ids {
            return Err(OpsError::Conflict(format!(
                "product catalog of animal type {} changed, retry",
                animal.type_id
            )));
        }

        let type_name = self
            .storage
            .get_animal_type_txn(&txn, animal.type_id)?
            .map(|t| t.name)
            .ok_or(OpsError::AnimalTypeNotFound(animal.type_id))?;
        let note = format!("Auto-added from slaughter of {} #{}", type_name, identifier);

        let mut changes = Vec::with_capacity(product_ids.len());
        for &product_id in &product_ids {
            let event = write_event(
                &self.storage,
                &txn,
                NewEvent {
                    product_id,
                    kind: QuantityEventKind::Add,
                    counter: Counter::Slaughter,
                    delta: 1,
                    note: Some(note.clone()),
                    shipment_id: None,
                },
            )?;
            changes.push(DeltaChange::StockChanged {
                product_id,
                stock: self.projector.stock_in_txn(&txn, product_id)?,
                event,
            });
        }

        animal.slaughtered = true;
        animal.slaughtered_at = Some(shared::util::now_millis());
        self.storage.store_animal(&txn, &animal)?;

        let product_count = changes.len();
        self.hub.publish_committed(|| {
            txn.commit().map_err(StorageError::from)?;
            for product_id in &product_ids {
                self.projector.invalidate(*product_id);
            }
            Ok::<_, OpsError>(((), changes))
        })?;

        tracing::info!(
            identifier,
            animal_type = %type_name,
            products = product_count,
            "Slaughter recorded"
        );
        Ok(animal)
    }
}
