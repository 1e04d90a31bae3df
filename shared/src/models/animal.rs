//! Animal Type / Animal Model

use serde::{Deserialize, Serialize};
use std::fmt;

use super::AnimalTypeId;

/// 动物种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Species {
    /// Cattle
    Sapi,
    /// Camel
    Unta,
    /// Sheep (single-quota)
    Domba,
    /// Goat (single-quota)
    Kambing,
}

impl Species {
    /// One contributor per animal. Identifiers for these species are always grouped.
    pub fn is_single_quota(&self) -> bool {
        matches!(self, Self::Domba | Self::Kambing)
    }
}

impl fmt::Display for Species {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sapi => write!(f, "SAPI"),
            Self::Unta => write!(f, "UNTA"),
            Self::Domba => write!(f, "DOMBA"),
            Self::Kambing => write!(f, "KAMBING"),
        }
    }
}

/// Animal type entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnimalType {
    pub id: AnimalTypeId,
    /// Identifier prefix, e.g. `sapi` produces `sapi_1`
    pub name: String,
    pub species: Species,
    /// Target quota (number of animals planned for this type)
    pub target: u32,
    pub created_at: i64,
}

impl AnimalType {
    /// Types with more than 100 planned animals get grouped identifiers
    pub fn is_large_quota(&self) -> bool {
        self.target > 100
    }

    /// Whether identifiers for this type carry a group label
    pub fn uses_groups(&self) -> bool {
        self.species.is_single_quota() || self.is_large_quota()
    }
}

/// Create animal type payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnimalTypeCreate {
    pub name: String,
    pub species: Species,
    pub target: u32,
}

/// Animal entity
///
/// `identifier` is assigned once by the allocator and never changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Animal {
    pub type_id: AnimalTypeId,
    pub identifier: String,
    /// 0-based allocation index within the type (monotonic, never reused)
    pub allocation_index: u64,
    pub slaughtered: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub slaughtered_at: Option<i64>,
    pub created_at: i64,
}
