//! Shared types for the qurban operations core
//!
//! Domain models, the station message envelope and the unified error
//! types used by ops-server and its station clients.

pub mod error;
pub mod message;
pub mod models;
pub mod util;

// Re-exports
pub use serde::{Deserialize, Serialize};

// Message re-exports (for convenient access)
pub use message::{BusMessage, EventType, StationMessage};

pub use error::{AppError, AppResult, ErrorCode};
