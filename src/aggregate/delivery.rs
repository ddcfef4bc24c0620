//! Delivery
//!
//! Shipping record of an order. Progresses READY → DELIVERED → COMPLETED,
//! or READY → RETURNED; nothing else.

use serde::{Deserialize, Serialize};

use crate::domain::status::stable_code_enum;
use crate::domain::{Address, DeliveryId, DomainError};

stable_code_enum! {
    /// Delivery status, persisted as its stable code
    pub enum DeliveryStatus default Ready {
        Ready => "D0000",
        Delivered => "D0001",
        Completed => "D0002",
        Returned => "D0003",
    }
}

impl DeliveryStatus {
    /// Check if `next` may follow this status
    pub fn can_transition_to(self, next: DeliveryStatus) -> bool {
        matches!(
            (self, next),
            (DeliveryStatus::Ready, DeliveryStatus::Delivered)
                | (DeliveryStatus::Delivered, DeliveryStatus::Completed)
                | (DeliveryStatus::Ready, DeliveryStatus::Returned)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, DeliveryStatus::Completed | DeliveryStatus::Returned)
    }
}

/// Delivery record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delivery {
    id: Option<DeliveryId>,
    status: DeliveryStatus,
    address: Address,
}

impl Delivery {
    /// Create a delivery to `address`, starting at READY
    pub fn new(address: Address) -> Self {
        Self {
            id: None,
            status: DeliveryStatus::Ready,
            address,
        }
    }

    /// Rebuild a delivery from stored state
    pub fn from_db_state(id: DeliveryId, status: DeliveryStatus, address: Address) -> Self {
        Self {
            id: Some(id),
            status,
            address,
        }
    }

    /// Move to `next`, failing if the transition is not allowed
    pub fn transition_to(&mut self, next: DeliveryStatus) -> Result<(), DomainError> {
        if !self.status.can_transition_to(next) {
            return Err(DomainError::invalid_state(
                "Delivery",
                self.status,
                transition_name(next),
            ));
        }
        self.status = next;
        Ok(())
    }

    pub fn mark_delivered(&mut self) -> Result<(), DomainError> {
        self.transition_to(DeliveryStatus::Delivered)
    }

    pub fn complete(&mut self) -> Result<(), DomainError> {
        self.transition_to(DeliveryStatus::Completed)
    }

    pub fn mark_returned(&mut self) -> Result<(), DomainError> {
        self.transition_to(DeliveryStatus::Returned)
    }

    pub fn id(&self) -> Option<DeliveryId> {
        self.id
    }

    pub(crate) fn assign_id(&mut self, id: DeliveryId) {
        self.id = Some(id);
    }

    pub fn status(&self) -> DeliveryStatus {
        self.status
    }

    pub fn address(&self) -> &Address {
        &self.address
    }
}

fn transition_name(next: DeliveryStatus) -> &'static str {
    match next {
        DeliveryStatus::Ready => "reset",
        DeliveryStatus::Delivered => "deliver",
        DeliveryStatus::Completed => "complete",
        DeliveryStatus::Returned => "return",
    }
}
