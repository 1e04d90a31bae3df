//! Data models
//!
//! Shared between ops-server and station clients (via the message envelope).
//! Animal type and product IDs are `i64`, shipment IDs and ledger
//! sequences are `u64`; all of them come from server-side counters.

pub mod animal;
pub mod error_log;
pub mod ledger;
pub mod product;
pub mod shipment;

// Re-exports
pub use animal::*;
pub use error_log::*;
pub use ledger::*;
pub use product::*;
pub use shipment::*;

pub type AnimalTypeId = i64;
pub type ProductId = i64;
pub type ShipmentId = u64;
