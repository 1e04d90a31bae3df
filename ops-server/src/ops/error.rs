use crate::storage::StorageError;
use serde::{Deserialize, Serialize};
use shared::error::{AppError, ErrorCode};
use shared::models::{AnimalTypeId, ProductId, ShipmentId};
use std::fmt;
use thiserror::Error;

/// Failure classes reported to callers
///
/// `Conflict` and `Unavailable` are transient: the operation had no effect
/// and may be retried with backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    NotFound,
    InvalidArgument,
    Conflict,
    InsufficientStock,
    Unavailable,
}

impl ErrorKind {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict | Self::Unavailable)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "NOT_FOUND"),
            Self::InvalidArgument => write!(f, "INVALID_ARGUMENT"),
            Self::Conflict => write!(f, "CONFLICT"),
            Self::InsufficientStock => write!(f, "INSUFFICIENT_STOCK"),
            Self::Unavailable => write!(f, "UNAVAILABLE"),
        }
    }
}

/// Operation errors
#[derive(Debug, Error)]
pub enum OpsError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Animal type not found: {0}")]
    AnimalTypeNotFound(AnimalTypeId),

    #[error("Animal not found: {0}")]
    AnimalNotFound(String),

    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    #[error("Shipment not found: {0}")]
    ShipmentNotFound(ShipmentId),

    #[error("Shipment already delivered: {0}")]
    ShipmentAlreadyDelivered(ShipmentId),

    #[error("Shipment has no items")]
    EmptyShipment,

    #[error("Invalid quantity: {0}")]
    InvalidQuantity(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Busy: {0}")]
    Conflict(String),

    #[error("Insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: ProductId,
        requested: i64,
        available: i64,
    },

    #[error("Unavailable: {0}")]
    Unavailable(String),
}

impl OpsError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            OpsError::Storage(_) | OpsError::Unavailable(_) => ErrorKind::Unavailable,
            OpsError::AnimalTypeNotFound(_)
            | OpsError::AnimalNotFound(_)
            | OpsError::ProductNotFound(_)
            | OpsError::ShipmentNotFound(_) => ErrorKind::NotFound,
            OpsError::ShipmentAlreadyDelivered(_)
            | OpsError::EmptyShipment
            | OpsError::InvalidQuantity(_)
            | OpsError::InvalidArgument(_)
            | OpsError::AlreadyExists(_) => ErrorKind::InvalidArgument,
            OpsError::Conflict(_) => ErrorKind::Conflict,
            OpsError::InsufficientStock { .. } => ErrorKind::InsufficientStock,
        }
    }

    /// Whether retrying the same call may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            OpsError::Storage(e) => classify_storage_error(e).is_retryable(),
            other => other.kind().is_retryable(),
        }
    }
}

/// 将存储错误转换为错误码
fn classify_storage_error(e: &StorageError) -> ErrorCode {
    if matches!(
        e,
        StorageError::Serialization(_) | StorageError::SequenceExhausted(_)
    ) {
        return ErrorCode::InternalError;
    }

    // redb 错误通过字符串匹配分类
    let err_str = e.to_string().to_lowercase();
    if err_str.contains("corrupt") || err_str.contains("invalid database") {
        return ErrorCode::DatabaseError;
    }

    // 默认：暂时不可用（redb 的 Database/Transaction/Table/Storage/Commit 错误）
    ErrorCode::ServiceUnavailable
}

impl From<OpsError> for AppError {
    fn from(err: OpsError) -> Self {
        let kind = err.kind();
        let app = match err {
            OpsError::Storage(e) => {
                let code = classify_storage_error(&e);
                tracing::error!(error = %e, error_code = ?code, "Storage error occurred");
                AppError::with_message(code, e.to_string())
            }
            OpsError::AnimalTypeNotFound(id) => {
                AppError::with_message(ErrorCode::AnimalTypeNotFound, format!("Animal type not found: {}", id))
                    .with_detail("animal_type_id", id)
            }
            OpsError::AnimalNotFound(identifier) => AppError::with_message(
                ErrorCode::AnimalNotFound,
                format!("Animal not found: {}", identifier),
            )
            .with_detail("identifier", identifier),
            OpsError::ProductNotFound(id) => {
                AppError::with_message(ErrorCode::ProductNotFound, format!("Product not found: {}", id))
                    .with_detail("product_id", id)
            }
            OpsError::ShipmentNotFound(id) => AppError::with_message(
                ErrorCode::ShipmentNotFound,
                format!("Shipment not found: {}", id),
            )
            .with_detail("shipment_id", id),
            OpsError::ShipmentAlreadyDelivered(id) => AppError::with_message(
                ErrorCode::ShipmentAlreadyDelivered,
                format!("Shipment already delivered: {}", id),
            )
            .with_detail("shipment_id", id),
            OpsError::EmptyShipment => AppError::new(ErrorCode::ShipmentEmpty),
            OpsError::InvalidQuantity(msg) => AppError::with_message(ErrorCode::InvalidQuantity, msg),
            OpsError::InvalidArgument(msg) => AppError::invalid(msg),
            OpsError::AlreadyExists(msg) => AppError::with_message(ErrorCode::AlreadyExists, msg),
            OpsError::Conflict(msg) => AppError::busy(msg),
            OpsError::InsufficientStock {
                product_id,
                requested,
                available,
            } => AppError::with_message(
                ErrorCode::InsufficientStock,
                format!(
                    "Insufficient stock for product {}: requested {}, available {}",
                    product_id, requested, available
                ),
            )
            .with_detail("product_id", product_id)
            .with_detail("requested", requested)
            .with_detail("available", available),
            OpsError::Unavailable(msg) => AppError::unavailable(msg),
        };
        app.with_detail("kind", kind.to_string())
    }
}

pub type OpsResult<T> = Result<T, OpsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(OpsError::ProductNotFound(1).kind(), ErrorKind::NotFound);
        assert_eq!(OpsError::EmptyShipment.kind(), ErrorKind::InvalidArgument);
        assert_eq!(OpsError::Conflict("p1".into()).kind(), ErrorKind::Conflict);
        assert_eq!(
            OpsError::InsufficientStock {
                product_id: 1,
                requested: 5,
                available: 2
            }
            .kind(),
            ErrorKind::InsufficientStock
        );
        assert_eq!(OpsError::Unavailable("down".into()).kind(), ErrorKind::Unavailable);
    }

    #[test]
    fn test_retryable() {
        assert!(OpsError::Conflict("p1".into()).is_retryable());
        assert!(OpsError::Unavailable("down".into()).is_retryable());
        assert!(!OpsError::InvalidQuantity("zero".into()).is_retryable());

        let bad_json = serde_json::from_slice::<u64>(b"x").unwrap_err();
        let err = OpsError::Storage(StorageError::Serialization(bad_json));
        assert_eq!(err.kind(), ErrorKind::Unavailable);
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_into_app_error() {
        let app: AppError = OpsError::InsufficientStock {
            product_id: 3,
            requested: 5,
            available: 2,
        }
        .into();
        assert_eq!(app.code, ErrorCode::InsufficientStock);
        let details = app.details.unwrap();
        assert_eq!(details.get("available").unwrap(), 2);
        assert_eq!(details.get("kind").unwrap(), "INSUFFICIENT_STOCK");

        let app: AppError = OpsError::Conflict("product 3".into()).into();
        assert_eq!(app.code, ErrorCode::ResourceBusy);
        assert!(app.is_retryable());
    }
}
