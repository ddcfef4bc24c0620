//! Repository Errors
//!
//! Error types for store operations.

use crate::domain::DomainError;

/// Errors that can occur in a store
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    /// Entity not found
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Unique constraint violated (the value that collided)
    #[error("Unique constraint violated: {0}")]
    UniqueViolation(String),

    /// Entity is still referenced by another entity
    #[error("{entity} {id} is still referenced")]
    StillReferenced { entity: &'static str, id: String },

    /// Business rule rejected the operation
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Stored data could not be mapped back to the domain
    #[error("Corrupt stored data: {0}")]
    Corrupt(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl RepositoryError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn still_referenced(entity: &'static str, id: impl ToString) -> Self {
        Self::StillReferenced {
            entity,
            id: id.to_string(),
        }
    }

    /// Check if this error is a unique constraint violation
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, RepositoryError::UniqueViolation(_))
    }

    /// Check if this error is a missing entity
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            RepositoryError::NotFound { .. }
                | RepositoryError::Domain(DomainError::NotFound { .. })
        )
    }
}
