//! Unified error codes for the qurban operations core
//!
//! Error codes are organized by category:
//! - 0xxx: General errors
//! - 4xxx: Ledger errors (quantity events, stock, shipments)
//! - 6xxx: Catalog errors (products, animal types, animals)
//! - 9xxx: System errors

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unified error code enum
///
/// All error codes are represented as u16 values for efficient serialization
/// and cross-language compatibility (Rust, TypeScript, etc.)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u16", try_from = "u16")]
#[repr(u16)]
pub enum ErrorCode {
    // ==================== 0xxx: General ====================
    /// Operation completed successfully
    Success = 0,
    /// Unknown error
    Unknown = 1,
    /// Validation failed
    ValidationFailed = 2,
    /// Resource not found
    NotFound = 3,
    /// Resource already exists
    AlreadyExists = 4,
    /// Invalid request
    InvalidRequest = 5,
    /// Value out of range
    ValueOutOfRange = 8,

    // ==================== 4xxx: Ledger ====================
    /// Quantity delta is zero or has the wrong sign for the event kind
    InvalidQuantity = 4001,
    /// Shipment would overdraw a product's stock
    InsufficientStock = 4002,
    /// Shipment not found
    ShipmentNotFound = 4101,
    /// Shipment has already been delivered
    ShipmentAlreadyDelivered = 4102,
    /// Shipment has no items
    ShipmentEmpty = 4103,

    // ==================== 6xxx: Catalog ====================
    /// Product not found
    ProductNotFound = 6001,
    /// Animal type not found
    AnimalTypeNotFound = 6101,
    /// Animal not found
    AnimalNotFound = 6102,

    // ==================== 9xxx: System ====================
    /// Internal server error
    InternalError = 9001,
    /// Database error
    DatabaseError = 9002,
    /// Serialization point busy, retry later
    ResourceBusy = 9003,
    /// Downstream store or transport temporarily unreachable
    ServiceUnavailable = 9004,
    /// Station disconnected
    StationDisconnected = 9101,
}

impl ErrorCode {
    /// Get the numeric code value
    #[inline]
    pub const fn code(&self) -> u16 {
        *self as u16
    }

    /// Check if this is a success code
    #[inline]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Whether the caller should retry with backoff
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::ResourceBusy | Self::ServiceUnavailable)
    }

    /// Get the default message for this error code
    pub const fn message(&self) -> &'static str {
        match self {
            Self::Success => "Success",
            Self::Unknown => "Unknown error",
            Self::ValidationFailed => "Validation failed",
            Self::NotFound => "Resource not found",
            Self::AlreadyExists => "Resource already exists",
            Self::InvalidRequest => "Invalid request",
            Self::ValueOutOfRange => "Value out of range",

            Self::InvalidQuantity => "Invalid quantity",
            Self::InsufficientStock => "Insufficient stock",
            Self::ShipmentNotFound => "Shipment not found",
            Self::ShipmentAlreadyDelivered => "Shipment has already been delivered",
            Self::ShipmentEmpty => "Shipment has no items",

            Self::ProductNotFound => "Product not found",
            Self::AnimalTypeNotFound => "Animal type not found",
            Self::AnimalNotFound => "Animal not found",

            Self::InternalError => "Internal server error",
            Self::DatabaseError => "Database error",
            Self::ResourceBusy => "Resource is busy, please retry",
            Self::ServiceUnavailable => "Service temporarily unavailable",
            Self::StationDisconnected => "Station disconnected",
        }
    }
}

impl From<ErrorCode> for u16 {
    #[inline]
    fn from(code: ErrorCode) -> Self {
        code as u16
    }
}

/// Error returned when trying to convert an invalid u16 to ErrorCode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidErrorCode(pub u16);

impl fmt::Display for InvalidErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid error code: {}", self.0)
    }
}

impl std::error::Error for InvalidErrorCode {}

impl TryFrom<u16> for ErrorCode {
    type Error = InvalidErrorCode;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Success),
            1 => Ok(Self::Unknown),
            2 => Ok(Self::ValidationFailed),
            3 => Ok(Self::NotFound),
            4 => Ok(Self::AlreadyExists),
            5 => Ok(Self::InvalidRequest),
            8 => Ok(Self::ValueOutOfRange),

            4001 => Ok(Self::InvalidQuantity),
            4002 => Ok(Self::InsufficientStock),
            4101 => Ok(Self::ShipmentNotFound),
            4102 => Ok(Self::ShipmentAlreadyDelivered),
            4103 => Ok(Self::ShipmentEmpty),

            6001 => Ok(Self::ProductNotFound),
            6101 => Ok(Self::AnimalTypeNotFound),
            6102 => Ok(Self::AnimalNotFound),

            9001 => Ok(Self::InternalError),
            9002 => Ok(Self::DatabaseError),
            9003 => Ok(Self::ResourceBusy),
            9004 => Ok(Self::ServiceUnavailable),
            9101 => Ok(Self::StationDisconnected),

            _ => Err(InvalidErrorCode(value)),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}
