use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Error payload returned on every non-2xx response.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// HTTP status category (e.g., "Not Found", "Conflict")
    pub error: String,
    /// Human-readable error description
    pub message: String,
    /// Machine-readable error code for client branching
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// ISO 8601 timestamp when the error occurred
    pub timestamp: String,
}

/// Application-wide service error taxonomy.
///
/// Checkout failures carry enough context for the client to act on them:
/// which SKU is short, which promo code was rejected, whether a retry is
/// worthwhile (lock timeouts are transient, stock shortages are not).
#[derive(thiserror::Error, Debug)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sea_orm::error::DbErr),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Insufficient stock for SKU {sku}: requested {requested}, available {available}")]
    InsufficientStock {
        sku: String,
        requested: i32,
        available: i32,
    },

    #[error("Timed out acquiring stock lock for SKU {0}")]
    StockLockTimeout(String),

    #[error("Invalid promo code: {0}")]
    InvalidPromoCode(String),

    #[error("Promo code usage limit reached: {0}")]
    PromoCodeLimitReached(String),

    #[error("Webhook signature verification failed for provider {0}")]
    SignatureInvalid(String),

    #[error("Illegal order transition: {from} -> {event} for order {order_id}")]
    IllegalTransition {
        order_id: Uuid,
        from: String,
        event: String,
    },

    #[error("Payment gateway timeout: {0}")]
    GatewayTimeout(String),

    #[error("Payment gateway error: {0}")]
    GatewayError(String),

    #[error("Lock store error: {0}")]
    LockStoreError(String),

    #[error("Invalid status: {0}")]
    InvalidStatus(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl ServiceError {
    /// Stable machine-readable code surfaced in the response body.
    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::DatabaseError(_) => "database_error",
            ServiceError::NotFound(_) => "not_found",
            ServiceError::ValidationError(_) => "validation_error",
            ServiceError::InvalidOperation(_) => "invalid_operation",
            ServiceError::BadRequest(_) => "bad_request",
            ServiceError::Conflict(_) => "conflict",
            ServiceError::InsufficientStock { .. } => "insufficient_stock",
            ServiceError::StockLockTimeout(_) => "stock_lock_timeout",
            ServiceError::InvalidPromoCode(_) => "invalid_promo_code",
            ServiceError::PromoCodeLimitReached(_) => "promo_code_limit_reached",
            ServiceError::SignatureInvalid(_) => "signature_invalid",
            ServiceError::IllegalTransition { .. } => "illegal_transition",
            ServiceError::GatewayTimeout(_) => "gateway_timeout",
            ServiceError::GatewayError(_) => "gateway_error",
            ServiceError::LockStoreError(_) => "lock_store_error",
            ServiceError::InvalidStatus(_) => "invalid_status",
            ServiceError::InternalError(_) => "internal_error",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::ValidationError(_)
            | ServiceError::BadRequest(_)
            | ServiceError::InvalidOperation(_)
            | ServiceError::InsufficientStock { .. }
            | ServiceError::InvalidPromoCode(_)
            | ServiceError::PromoCodeLimitReached(_)
            | ServiceError::InvalidStatus(_) => StatusCode::BAD_REQUEST,
            // Transient contention: the client should retry the checkout.
            ServiceError::StockLockTimeout(_) => StatusCode::CONFLICT,
            ServiceError::Conflict(_) | ServiceError::IllegalTransition { .. } => {
                StatusCode::CONFLICT
            }
            ServiceError::SignatureInvalid(_) => StatusCode::UNAUTHORIZED,
            ServiceError::GatewayTimeout(_) | ServiceError::GatewayError(_) => {
                StatusCode::BAD_GATEWAY
            }
            ServiceError::DatabaseError(_)
            | ServiceError::LockStoreError(_)
            | ServiceError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status();

        // Replayed or out-of-order webhooks show up here as illegal
        // transitions; that is a signal worth alerting on, not noise.
        match &self {
            ServiceError::IllegalTransition { order_id, from, event } => {
                tracing::error!(%order_id, %from, %event, "illegal order transition attempted");
            }
            ServiceError::SignatureInvalid(provider) => {
                tracing::warn!(%provider, "rejected webhook with invalid signature");
            }
            ServiceError::DatabaseError(e) => {
                tracing::error!("database error: {}", e);
            }
            _ => {}
        }

        let message = match &self {
            // Never leak driver internals to clients.
            ServiceError::DatabaseError(_) | ServiceError::InternalError(_) => {
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };

        let body = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Unknown").to_string(),
            message,
            code: Some(self.code().to_string()),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_stock_maps_to_bad_request() {
        let err = ServiceError::InsufficientStock {
            sku: "SKU-1".into(),
            requested: 3,
            available: 1,
        };
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.code(), "insufficient_stock");
    }

    #[test]
    fn lock_timeout_is_retryable_conflict() {
        let err = ServiceError::StockLockTimeout("SKU-1".into());
        assert_eq!(err.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn signature_failures_are_unauthorized() {
        let err = ServiceError::SignatureInvalid("paystack".into());
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
    }
}
