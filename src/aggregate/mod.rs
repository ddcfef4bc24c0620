//! Aggregate module
//!
//! Entities and aggregate roots of the shop: members, catalog items, the
//! category tree, and orders with their lines and delivery.

pub mod category;
pub mod delivery;
pub mod item;
pub mod member;
pub mod order;

pub use category::{Category, CategoryTree};
pub use delivery::{Delivery, DeliveryStatus};
pub use item::{Item, ItemKind};
pub use member::Member;
pub use order::{Inventory, Order, OrderItem, OrderStatus};

use std::fmt::Display;
use std::hash::Hash;

/// Aggregate trait that every persisted root implements
pub trait Aggregate: Clone + Send + Sync + 'static {
    /// Identifier type assigned by the store
    type Id: Copy + Eq + Hash + Display + Send + Sync + 'static;

    /// Get the aggregate type name (for storage and audit records)
    fn aggregate_type() -> &'static str;

    /// Get the aggregate ID, `None` until first saved
    fn id(&self) -> Option<Self::Id>;

    /// Set the ID; called by a store when the aggregate is first saved
    fn assign_id(&mut self, id: Self::Id);

    /// Check if the aggregate has never been saved
    fn is_new(&self) -> bool {
        self.id().is_none()
    }
}
