//! Error Log Model
//!
//! Operational anomalies (count discrepancies) surfaced to every station.

use serde::{Deserialize, Serialize};

use super::ProductId;

/// Error log entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorLog {
    pub id: u64,
    pub product_id: ProductId,
    /// Originating event, e.g. `add` or `shipment_discrepancy`
    pub event: String,
    pub note: String,
    pub timestamp: i64,
}
