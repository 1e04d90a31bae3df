//! Unified error system for the qurban operations core
//!
//! - [`ErrorCode`]: Standardized error codes for all error types
//! - [`ErrorCategory`]: Classification of errors by domain
//! - [`AppError`]: Rich error type with codes, messages, and details
//!
//! # Error Code Ranges
//!
//! - 0xxx: General errors
//! - 4xxx: Ledger errors
//! - 6xxx: Catalog errors
//! - 9xxx: System errors
//!
//! # Example
//!
//! ```
//! use http::StatusCode;
//! use shared::error::{AppError, ErrorCode};
//!
//! let err = AppError::with_message(ErrorCode::InsufficientStock, "Not enough stock")
//!     .with_detail("product_id", 3);
//! assert!(!err.is_retryable());
//! assert_eq!(err.code.code(), 4002);
//! assert_eq!(err.http_status(), StatusCode::UNPROCESSABLE_ENTITY);
//! ```

mod category;
mod codes;
mod http;
mod types;

pub use category::ErrorCategory;
pub use codes::{ErrorCode, InvalidErrorCode};
pub use types::{AppError, AppResult};
