use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::error::DbErr;
use serde::{Deserialize, Serialize};

use crate::services::{pricing::PricingError, redemptions::LedgerError};

fn current_request_id() -> Option<String> {
    crate::tracing::current_request_id().map(|rid| rid.as_str().to_string())
}

/// Body of every non-2xx response.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// HTTP status category (e.g., "Not Found", "Bad Request")
    pub error: String,
    /// Human-readable error description
    pub message: String,
    /// Machine-readable detail, e.g. the coupon rejection reason code
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// Unique request identifier for support and debugging
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// RFC 3339 timestamp when the error occurred
    pub timestamp: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] DbErr),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid status: {0}")]
    InvalidStatus(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("{0}")]
    InsufficientStock(String),

    /// `code` is the stable rejection reason identifier.
    #[error("{message}")]
    CouponRejected { code: &'static str, message: String },

    /// Missing catalog setup or other operator mistakes.
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Storage timeout: {0}")]
    Timeout(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl From<PricingError> for ServiceError {
    fn from(err: PricingError) -> Self {
        match err {
            PricingError::ProductNotFound(category) => ServiceError::Configuration(format!(
                "no product configured for category {}",
                category.as_str()
            )),
            PricingError::OutOfStock(_) => {
                ServiceError::InsufficientStock("Product currently out of stock".to_string())
            }
            PricingError::CouponRejected(reason) => ServiceError::CouponRejected {
                code: reason.code(),
                message: reason.to_string(),
            },
            PricingError::AlreadyRedeemed(_) => {
                ServiceError::Conflict("Coupon has already been redeemed".to_string())
            }
            PricingError::InvalidQuantity(quantity) => ServiceError::ValidationError(format!(
                "quantity must be between 1 and 999, got {}",
                quantity
            )),
            PricingError::Timeout(deadline) => ServiceError::Timeout(deadline.to_string()),
            PricingError::Storage(msg) => ServiceError::InternalError(msg),
        }
    }
}

impl From<LedgerError> for ServiceError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::Duplicate(_) => {
                ServiceError::Conflict("Coupon has already been redeemed".to_string())
            }
            LedgerError::Storage(e) => ServiceError::DatabaseError(e),
        }
    }
}

impl From<crate::db::DeadlineExceeded> for ServiceError {
    fn from(err: crate::db::DeadlineExceeded) -> Self {
        ServiceError::Timeout(err.to_string())
    }
}

impl ServiceError {
    /// Returns the HTTP status code for this error.
    /// This is the single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::DatabaseError(_) | Self::Configuration(_) | Self::InternalError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::ValidationError(_)
            | Self::InvalidStatus(_)
            | Self::CouponRejected { .. } => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::InsufficientStock(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Timeout(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// Returns the error message suitable for HTTP responses.
    /// Internal errors return generic messages to avoid leaking implementation details.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) => "Database error".to_string(),
            Self::InternalError(_) => "Internal server error".to_string(),
            Self::Configuration(_) => "Product catalog is not configured".to_string(),
            Self::Timeout(_) => "Service temporarily unavailable".to_string(),
            _ => self.to_string(),
        }
    }

    pub fn details(&self) -> Option<String> {
        match self {
            Self::CouponRejected { code, .. } => Some((*code).to_string()),
            _ => None,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }

        let err = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message: self.response_message(),
            details: self.details(),
            request_id: current_request_id(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(err)).into_response()
    }
}

/// API Error type for HTTP responses
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Service error: {0}")]
    ServiceError(#[from] ServiceError),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            ApiError::ServiceError(service_error) => return service_error.into_response(),
            ApiError::ValidationError(msg) => (StatusCode::BAD_REQUEST, msg),
        };

        let error_response = ErrorResponse {
            error: status
                .canonical_reason()
                .unwrap_or("Unknown Error")
                .to_string(),
            message: error_message,
            details: None,
            request_id: current_request_id(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(error_response)).into_response()
    }
}
