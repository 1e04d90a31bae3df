//! Shipment Model

use serde::{Deserialize, Serialize};

use super::{ProductId, ShipmentId};

/// Shipment status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShipmentStatus {
    Pending,
    Delivered,
}

/// One line of a shipment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipmentItem {
    pub product_id: ProductId,
    pub quantity: i64,
}

impl ShipmentItem {
    pub fn new(product_id: ProductId, quantity: i64) -> Self {
        Self {
            product_id,
            quantity,
        }
    }
}

/// Shipment entity - committed bundle of stock debits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shipment {
    pub id: ShipmentId,
    /// Items in request order
    pub items: Vec<ShipmentItem>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub status: ShipmentStatus,
    pub created_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivered_at: Option<i64>,
}

impl Shipment {
    /// Total debited quantity for a product (a product may appear on several lines)
    pub fn debit_for(&self, product_id: ProductId) -> i64 {
        self.items
            .iter()
            .filter(|item| item.product_id == product_id)
            .map(|item| item.quantity)
            .sum()
    }
}

/// Mismatch between shipped and received quantities
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShipmentDiscrepancy {
    pub product_id: ProductId,
    pub expected: i64,
    pub received: i64,
    pub message: String,
}

/// Result of receiving a shipment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShipmentReceipt {
    pub shipment: Shipment,
    pub discrepancies: Vec<ShipmentDiscrepancy>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debit_for_sums_repeated_lines() {
        let shipment = Shipment {
            id: 1,
            items: vec![
                ShipmentItem::new(10, 3),
                ShipmentItem::new(11, 1),
                ShipmentItem::new(10, 2),
            ],
            note: None,
            status: ShipmentStatus::Pending,
            created_at: 0,
            delivered_at: None,
        };
        assert_eq!(shipment.debit_for(10), 5);
        assert_eq!(shipment.debit_for(11), 1);
        assert_eq!(shipment.debit_for(12), 0);
    }
}
