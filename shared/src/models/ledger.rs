//! Quantity ledger models
//!
//! `QuantityEvent` is the immutable unit of the append-only product ledger.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::{ProductId, ShipmentId};

/// Event kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuantityEventKind {
    /// Units arrive at a counter (delta > 0)
    Add,
    /// Units leave or transfer (signed by the caller)
    Move,
    /// Manual adjustment of earlier mistakes (signed by the caller)
    Correct,
}

impl fmt::Display for QuantityEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Add => write!(f, "add"),
            Self::Move => write!(f, "move"),
            Self::Correct => write!(f, "correct"),
        }
    }
}

/// 计数站 - physical station where a quantity event is recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Counter {
    /// Slaughter floor
    Slaughter,
    /// Weighing counter
    Weighing,
    /// Inventory counter
    Inventory,
}

impl Counter {
    /// Counters that produce units (origin side)
    pub fn is_origin(&self) -> bool {
        matches!(self, Self::Slaughter | Self::Weighing)
    }
}

impl fmt::Display for Counter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Slaughter => write!(f, "SLAUGHTER"),
            Self::Weighing => write!(f, "WEIGHING"),
            Self::Inventory => write!(f, "INVENTORY"),
        }
    }
}

/// Quantity event - immutable ledger record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantityEvent {
    /// Event unique ID
    pub event_id: String,
    /// Global ledger sequence (authoritative append order)
    pub sequence: u64,
    pub product_id: ProductId,
    pub kind: QuantityEventKind,
    pub counter: Counter,
    /// Signed quantity delta, never zero
    pub delta: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    /// Set when this event records a shipment debit
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shipment_id: Option<ShipmentId>,
    /// Server timestamp (Unix milliseconds)
    pub created_at: i64,
}

impl QuantityEvent {
    pub fn is_shipment_debit(&self) -> bool {
        self.shipment_id.is_some()
    }
}

/// Projected stock of one product
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductStock {
    pub product_id: ProductId,
    pub name: String,
    pub stock: i64,
}
