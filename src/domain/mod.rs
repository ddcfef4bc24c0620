//! Domain module
//!
//! Value objects, identifiers, errors and the stable-code status pattern.

pub mod address;
pub mod auditing;
pub mod context;
pub mod error;
pub mod ids;
pub mod password;
pub mod status;

pub use address::Address;
pub use auditing::{AuditFields, Auditable};
pub use context::OperationContext;
pub use error::DomainError;
pub use ids::{CategoryId, DeliveryId, ItemId, MemberId, OrderId, OrderItemId};
pub use password::PasswordHash;
pub use status::{StableCode, StatusDecodeError};
