//! Product Model

use serde::{Deserialize, Serialize};

use super::{AnimalTypeId, ProductId};

/// 产品分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProductKind {
    /// Meat
    Daging,
    /// Offal
    Jeroan,
    /// Hide
    Kulit,
    Lainnya,
}

impl ProductKind {
    pub fn is_meat(&self) -> bool {
        matches!(self, Self::Daging)
    }
}

/// Product entity
///
/// Carries no quantity field: stock is always projected from the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub kind: ProductKind,
    /// Animal type this product is cut from (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub animal_type_id: Option<AnimalTypeId>,
    pub created_at: i64,
}

/// Create product payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductCreate {
    pub name: String,
    pub kind: ProductKind,
    pub animal_type_id: Option<AnimalTypeId>,
}
