//! Error handling module
//!
//! Centralized error types and HTTP response conversion.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::domain::DomainError;
use crate::repository::RepositoryError;

/// Application-wide Result type
pub type AppResult<T> = Result<T, AppError>;

/// Application error types
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // Client errors (4xx)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Conflict: {0}")]
    Conflict(String),

    // Domain errors
    #[error(transparent)]
    Domain(#[from] DomainError),

    // Server errors (5xx)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
}

impl AppError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

impl From<RepositoryError> for AppError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound { entity, id } => AppError::NotFound { entity, id },
            RepositoryError::UniqueViolation(value) => {
                AppError::Conflict(format!("{} already exists", value))
            }
            RepositoryError::StillReferenced { .. } => AppError::Conflict(err.to_string()),
            RepositoryError::Domain(e) => AppError::Domain(e),
            RepositoryError::Corrupt(msg) => AppError::Internal(msg),
            RepositoryError::Database(e) => AppError::Database(e),
        }
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_code, details) = match &self {
            // 400 Bad Request
            AppError::InvalidRequest(msg) => {
                (StatusCode::BAD_REQUEST, "invalid_request", Some(msg.clone()))
            }
            AppError::InvalidHeader(header) => {
                (StatusCode::BAD_REQUEST, "invalid_header", Some(header.clone()))
            }

            // 404 Not Found
            AppError::NotFound { id, .. } => (StatusCode::NOT_FOUND, "not_found", Some(id.clone())),

            // 409 Conflict
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", Some(msg.clone())),

            // Domain errors - map to appropriate HTTP status
            AppError::Domain(domain_err) => match domain_err {
                DomainError::AlreadyExists { username } => (
                    StatusCode::CONFLICT,
                    "username_already_exists",
                    Some(username.clone()),
                ),
                DomainError::InsufficientStock { .. } => (
                    StatusCode::CONFLICT,
                    "insufficient_stock",
                    Some(domain_err.to_string()),
                ),
                DomainError::InvalidState { .. } => {
                    (StatusCode::CONFLICT, "invalid_state", Some(domain_err.to_string()))
                }
                DomainError::CategoryHasChildren(id) => (
                    StatusCode::CONFLICT,
                    "category_has_children",
                    Some(id.to_string()),
                ),
                DomainError::Cycle { .. } => (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "category_cycle",
                    Some(domain_err.to_string()),
                ),
                DomainError::NotFound { id, .. } => {
                    (StatusCode::NOT_FOUND, "not_found", Some(id.clone()))
                }
                DomainError::InvalidQuantity(msg) => {
                    (StatusCode::BAD_REQUEST, "invalid_quantity", Some(msg.clone()))
                }
                DomainError::InvalidPrice(msg) => {
                    (StatusCode::BAD_REQUEST, "invalid_price", Some(msg.clone()))
                }
                DomainError::Validation { field, reason } => (
                    StatusCode::BAD_REQUEST,
                    "validation_error",
                    Some(format!("{}: {}", field, reason)),
                ),
                DomainError::Decode(e) => {
                    tracing::error!("Stored status could not be decoded: {}", e);
                    (StatusCode::INTERNAL_SERVER_ERROR, "decode_error", None)
                }
            },

            // 500 Internal Server Error
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "database_error", None)
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
            AppError::Config(e) => {
                tracing::error!("Config error: {:?}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "config_error", None)
            }
        };

        let body = ErrorResponse {
            error: self.to_string(),
            error_code: error_code.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}
