//! Animal identifier allocation
//!
//! 每个动物类型一个串行点：同一类型的分配严格串行，不同类型互不阻塞。
//! The per-type counter lives in redb and only ever grows, so an identifier
//! is never handed out twice even after the animal record is removed.

use std::time::Duration;

use redb::WriteTransaction;
use shared::models::{Animal, AnimalType, AnimalTypeId};

use crate::ops::{KeyedLocks, OpsError, OpsResult};
use crate::storage::{OpsStorage, StorageError};

/// Animals per group in grouped identifiers
pub const GROUP_SIZE: u64 = 50;

/// Spreadsheet-style group label: 0 → A, 25 → Z, 26 → AA, 27 → AB, ...
pub fn group_label(index: u64) -> String {
    let mut letters = Vec::new();
    let mut rest = index;
    loop {
        letters.push(char::from(b'A' + (rest % 26) as u8));
        if rest < 26 {
            break;
        }
        rest = rest / 26 - 1;
    }
    letters.iter().rev().collect()
}

/// Inverse of [`group_label`]; `None` for anything but upper-case letters
pub fn group_index(label: &str) -> Option<u64> {
    if label.is_empty() {
        return None;
    }
    let mut acc: u64 = 0;
    for c in label.chars() {
        if !c.is_ascii_uppercase() {
            return None;
        }
        acc = acc.checked_mul(26)?.checked_add(u64::from(c as u8 - b'A') + 1)?;
    }
    Some(acc - 1)
}

/// Identifier for the animal allocated when `n` animals of the type exist
pub fn format_identifier(animal_type: &AnimalType, n: u64) -> String {
    if animal_type.uses_groups() {
        let group = group_label(n / GROUP_SIZE);
        let position = n % GROUP_SIZE + 1;
        format!("{}_{}-{:02}", animal_type.name, group, position)
    } else {
        format!("{}_{}", animal_type.name, n + 1)
    }
}

/// Allocates animal identifiers against the per-type counter
pub struct SequenceAllocator {
    storage: OpsStorage,
    type_locks: KeyedLocks<AnimalTypeId>,
    lock_timeout: Duration,
}

impl SequenceAllocator {
    pub fn new(storage: OpsStorage, lock_timeout: Duration) -> Self {
        Self {
            storage,
            type_locks: KeyedLocks::new("animal type"),
            lock_timeout,
        }
    }

    /// Allocate one animal
    pub fn allocate(&self, type_id: AnimalTypeId) -> OpsResult<Animal> {
        self.with_type(type_id, |txn, animal_type, n| {
            let animal = self.create_animal(txn, animal_type, n)?;
            Ok((animal, n + 1))
        })
    }

    /// Allocate `count` consecutive animals in one commit
    pub fn allocate_many(&self, type_id: AnimalTypeId, count: u32) -> OpsResult<Vec<Animal>> {
        if count == 0 {
            return Err(OpsError::InvalidArgument(
                "count must be at least 1".to_string(),
            ));
        }
        self.with_type(type_id, |txn, animal_type, n| {
            let end = n + u64::from(count);
            let animals = (n..end)
                .map(|index| self.create_animal(txn, animal_type, index))
                .collect::<OpsResult<Vec<_>>>()?;
            Ok((animals, end))
        })
    }

    /// Run `f` under the type's serialization point inside one write transaction
    ///
    /// `f` receives the current counter and returns the new one.
    fn with_type<T>(
        &self,
        type_id: AnimalTypeId,
        f: impl FnOnce(&WriteTransaction, &AnimalType, u64) -> OpsResult<(T, u64)>,
    ) -> OpsResult<T> {
        let _guard = self.type_locks.acquire(type_id, self.lock_timeout)?;

        let txn = self.storage.begin_write()?;
        let animal_type = self
            .storage
            .get_animal_type_txn(&txn, type_id)?
            .ok_or(OpsError::AnimalTypeNotFound(type_id))?;
        let current = self.storage.allocation_count_txn(&txn, type_id)?;

        let (value, next) = f(&txn, &animal_type, current)?;
        self.storage.set_allocation_count(&txn, type_id, next)?;
        txn.commit().map_err(StorageError::from)?;

        tracing::info!(
            animal_type = %animal_type.name,
            type_id,
            from = current,
            to = next,
            "Allocated animal identifiers"
        );
        Ok(value)
    }

    fn create_animal(
        &self,
        txn: &WriteTransaction,
        animal_type: &AnimalType,
        index: u64,
    ) -> OpsResult<Animal> {
        let identifier = format_identifier(animal_type, index);
        if self.storage.identifier_exists_txn(txn, &identifier)? {
            return Err(OpsError::AlreadyExists(format!(
                "identifier {} already allocated",
                identifier
            )));
        }

        let animal = Animal {
            type_id: animal_type.id,
            identifier,
            allocation_index: index,
            slaughtered: false,
            slaughtered_at: None,
            created_at: shared::util::now_millis(),
        };
        self.storage.store_animal(txn, &animal)?;
        Ok(animal)
    }
}
