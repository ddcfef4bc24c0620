//! Domain Error Types
//!
//! Pure domain errors that don't depend on infrastructure.

use thiserror::Error;

use super::ids::{CategoryId, ItemId};
use super::status::StatusDecodeError;

/// Domain-specific errors
///
/// These errors represent business rule violations and domain invariant failures.
/// They are independent of the web/infrastructure layer.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DomainError {
    /// Attaching the category would make it its own ancestor
    #[error("Cannot attach category {child} under {parent}: it would create a cycle")]
    Cycle { parent: CategoryId, child: CategoryId },

    /// Stock would go negative. `item_id` is `None` for an item not yet saved.
    #[error(
        "Insufficient stock for {}: requested {requested}, available {available}",
        item_label(.item_id)
    )]
    InsufficientStock {
        item_id: Option<ItemId>,
        requested: u64,
        available: u32,
    },

    /// Status transition not permitted from the current state
    #[error("Cannot {operation} {entity} in state {state}")]
    InvalidState {
        entity: &'static str,
        state: String,
        operation: &'static str,
    },

    /// Username already taken
    #[error("Username already exists: {username}")]
    AlreadyExists { username: String },

    /// Stored status code is not recognised
    #[error(transparent)]
    Decode(#[from] StatusDecodeError),

    /// Category cannot be removed while it has children
    #[error("Category {0} still has child categories")]
    CategoryHasChildren(CategoryId),

    /// Referenced entity does not exist
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Quantity is zero, negative, or out of range
    #[error("Invalid quantity: {0}")]
    InvalidQuantity(String),

    /// Price is negative or out of range
    #[error("Invalid price: {0}")]
    InvalidPrice(String),

    /// Field failed validation
    #[error("Invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },
}

fn item_label(item_id: &Option<ItemId>) -> String {
    match item_id {
        Some(id) => format!("item {}", id),
        None => "unsaved item".to_string(),
    }
}

impl DomainError {
    /// Create an insufficient stock error
    pub fn insufficient_stock(item_id: ItemId, requested: u64, available: u32) -> Self {
        Self::InsufficientStock {
            item_id: Some(item_id),
            requested,
            available,
        }
    }

    /// Create an invalid state error
    pub fn invalid_state(
        entity: &'static str,
        state: impl std::fmt::Debug,
        operation: &'static str,
    ) -> Self {
        Self::InvalidState {
            entity,
            state: format!("{:?}", state),
            operation,
        }
    }

    /// Create an already exists error
    pub fn already_exists(username: impl Into<String>) -> Self {
        Self::AlreadyExists {
            username: username.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Create a validation error
    pub fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field,
            reason: reason.into(),
        }
    }

    /// Check if this is a client error (user's fault)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Cycle { .. }
                | Self::InvalidQuantity(_)
                | Self::InvalidPrice(_)
                | Self::Validation { .. }
        )
    }

    /// Check if this is a conflict with current state (retry after a change may help)
    pub fn is_conflict_error(&self) -> bool {
        matches!(
            self,
            Self::InsufficientStock { .. }
                | Self::InvalidState { .. }
                | Self::AlreadyExists { .. }
                | Self::CategoryHasChildren(_)
        )
    }
}
