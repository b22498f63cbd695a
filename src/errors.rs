use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::error::DbErr;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use utoipa::ToSchema;

/// Error payload returned by every HTTP endpoint.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "error": "Unprocessable Entity",
    "message": "Insufficient stock: 3 available, 5 requested",
    "details": { "available": 3, "requested": 5 },
    "timestamp": "2026-08-06T10:30:00.000Z"
}))]
pub struct ErrorResponse {
    /// HTTP status category (e.g., "Not Found", "Bad Request")
    pub error: String,
    /// Human-readable error description
    pub message: String,
    /// Structured details for programmatic consumers (stock numbers, field names)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    /// ISO 8601 timestamp when the error occurred
    pub timestamp: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(#[from] sea_orm::error::DbErr),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Insufficient stock: {available} available, {requested} requested")]
    InsufficientStock { available: i32, requested: i32 },

    #[error("Order {0} is already completed")]
    AlreadyCompleted(String),

    #[error("Order {0} is already cancelled")]
    AlreadyCancelled(String),

    #[error("Requested stock level equals the current stock")]
    NoChangeRequested,

    #[error("Concurrent modification: {0}")]
    ConcurrentModification(String),

    #[error("Event error: {0}")]
    EventError(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

pub trait IntoDbErr {
    fn into_db_err(self) -> DbErr;
}

impl IntoDbErr for DbErr {
    fn into_db_err(self) -> DbErr {
        self
    }
}

impl IntoDbErr for String {
    fn into_db_err(self) -> DbErr {
        DbErr::Custom(self)
    }
}

impl IntoDbErr for &str {
    fn into_db_err(self) -> DbErr {
        DbErr::Custom(self.to_string())
    }
}

impl ServiceError {
    /// Generic constructor that normalizes any supported database error input.
    pub fn db_error<E: IntoDbErr>(error: E) -> Self {
        ServiceError::DatabaseError(error.into_db_err())
    }

    /// Returns the HTTP status code for this error.
    /// This is the single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::ValidationError(_) | Self::InvalidOperation(_) => StatusCode::BAD_REQUEST,
            Self::InsufficientStock { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::AlreadyCompleted(_)
            | Self::AlreadyCancelled(_)
            | Self::NoChangeRequested
            | Self::ConcurrentModification(_) => StatusCode::CONFLICT,
            Self::DatabaseError(_)
            | Self::EventError(_)
            | Self::InternalError(_)
            | Self::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Returns the error message suitable for HTTP responses.
    /// Internal errors return generic messages to avoid leaking implementation details.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) => "Database error".to_string(),
            Self::EventError(_) | Self::InternalError(_) | Self::Other(_) => {
                "Internal server error".to_string()
            }
            _ => self.to_string(),
        }
    }

    /// Structured details exposed alongside the message, so callers can render
    /// their own copy ("stok tersisa: N") without parsing prose.
    pub fn response_details(&self) -> Option<Value> {
        match self {
            Self::InsufficientStock {
                available,
                requested,
            } => Some(json!({ "available": available, "requested": requested })),
            Self::AlreadyCompleted(reference) | Self::AlreadyCancelled(reference) => {
                Some(json!({ "reference": reference }))
            }
            _ => None,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let err = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message: self.response_message(),
            details: self.response_details(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(err)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::to_bytes, http::StatusCode};

    #[test]
    fn status_code_mapping() {
        assert_eq!(
            ServiceError::NotFound("x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ServiceError::ValidationError("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::InsufficientStock {
                available: 1,
                requested: 2
            }
            .status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ServiceError::AlreadyCompleted("PRD-1".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ServiceError::NoChangeRequested.status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ServiceError::ConcurrentModification("variant".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ServiceError::InternalError("boom".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn response_message_hides_internal_details() {
        assert_eq!(
            ServiceError::db_error("connection refused").response_message(),
            "Database error"
        );
        assert_eq!(
            ServiceError::InternalError("stack trace".into()).response_message(),
            "Internal server error"
        );

        assert_eq!(
            ServiceError::NotFound("Variant not found".into()).response_message(),
            "Not found: Variant not found"
        );
    }

    #[test]
    fn insufficient_stock_exposes_numbers() {
        let err = ServiceError::InsufficientStock {
            available: 3,
            requested: 5,
        };
        let details = err.response_details().unwrap();
        assert_eq!(details["available"], 3);
        assert_eq!(details["requested"], 5);
    }

    #[tokio::test]
    async fn error_response_body_is_structured() {
        let response = ServiceError::InsufficientStock {
            available: 0,
            requested: 4,
        }
        .into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let payload: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert_eq!(payload.error, "Unprocessable Entity");
        assert_eq!(payload.details.unwrap()["requested"], 4);
    }
}
