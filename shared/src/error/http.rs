//! HTTP status code mapping for error codes

use super::codes::ErrorCode;
use http::StatusCode;

impl ErrorCode {
    /// Get the appropriate HTTP status code for this error code
    pub fn http_status(&self) -> StatusCode {
        match self {
            Self::Success => StatusCode::OK,

            // 404 Not Found
            Self::NotFound
            | Self::ShipmentNotFound
            | Self::ProductNotFound
            | Self::AnimalTypeNotFound
            | Self::AnimalNotFound => StatusCode::NOT_FOUND,

            // 409 Conflict
            Self::AlreadyExists | Self::ShipmentAlreadyDelivered | Self::ResourceBusy => {
                StatusCode::CONFLICT
            }

            // 422 Unprocessable Entity
            Self::InsufficientStock => StatusCode::UNPROCESSABLE_ENTITY,

            // 400 Bad Request
            Self::ValidationFailed
            | Self::InvalidRequest
            | Self::ValueOutOfRange
            | Self::InvalidQuantity
            | Self::ShipmentEmpty => StatusCode::BAD_REQUEST,

            // 503 Service Unavailable
            Self::ServiceUnavailable | Self::StationDisconnected => {
                StatusCode::SERVICE_UNAVAILABLE
            }

            // 500 Internal Server Error
            Self::Unknown | Self::InternalError | Self::DatabaseError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}
