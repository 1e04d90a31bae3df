//! Station snapshot assembly

use std::sync::Arc;

use crate::message::{SnapshotSource, SnapshotState};
use crate::stock::StockProjector;
use crate::storage::OpsStorage;
use shared::models::ShipmentStatus;

use super::OpsResult;

/// Builds snapshots from committed state: every product's stock, the
/// error log tail and undelivered shipments
pub struct LedgerSnapshotSource {
    storage: OpsStorage,
    projector: Arc<StockProjector>,
    error_log_tail: usize,
}

impl LedgerSnapshotSource {
    pub fn new(storage: OpsStorage, projector: Arc<StockProjector>, error_log_tail: usize) -> Self {
        Self {
            storage,
            projector,
            error_log_tail,
        }
    }
}

impl SnapshotSource for LedgerSnapshotSource {
    fn snapshot_state(&self) -> OpsResult<SnapshotState> {
        let pending_shipments = self
            .storage
            .list_shipments()?
            .into_iter()
            .filter(|s| s.status == ShipmentStatus::Pending)
            .collect();

        Ok(SnapshotState {
            stocks: self.projector.all_stocks()?,
            error_logs: self.storage.recent_error_logs(self.error_log_tail)?,
            pending_shipments,
        })
    }

    fn warm(&self) {
        if let Err(e) = self.projector.all_stocks() {
            tracing::debug!(error = %e, "Stock cache warm-up failed");
        }
    }
}
