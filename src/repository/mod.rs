//! Repository module
//!
//! Store contracts for the aggregates, with an in-memory implementation and a
//! PostgreSQL one. Every store assigns ids on first save, enforces username
//! uniqueness, and runs order placement and cancellation as one atomic unit.

mod error;
mod memory;
mod postgres;

pub use error::RepositoryError;
pub use memory::InMemoryStore;
pub use postgres::PgStore;

use async_trait::async_trait;

use crate::aggregate::{Aggregate, Category, CategoryTree, Item, Member, Order};
use crate::domain::{CategoryId, MemberId, OrderId, OrderItemId};

/// Basic persistence for one aggregate type
#[async_trait]
pub trait Repository<A: Aggregate>: Send + Sync {
    /// Insert or update. New aggregates get an id assigned; the stored
    /// version is returned. Orders are checked with
    /// [`Order::ensure_can_overwrite`] against the stored version first.
    async fn save(&self, aggregate: A) -> Result<A, RepositoryError>;

    async fn find_by_id(&self, id: A::Id) -> Result<Option<A>, RepositoryError>;

    /// Remove a saved aggregate
    async fn delete(&self, aggregate: &A) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait MemberRepository: Repository<Member> {
    async fn exists_by_username(&self, username: &str) -> Result<bool, RepositoryError>;

    async fn find_by_username(&self, username: &str) -> Result<Option<Member>, RepositoryError>;
}

#[async_trait]
pub trait ItemRepository: Repository<Item> {
    async fn find_all(&self) -> Result<Vec<Item>, RepositoryError>;

    async fn find_all_by_category(&self, category: CategoryId)
        -> Result<Vec<Item>, RepositoryError>;
}

#[async_trait]
pub trait CategoryRepository: Repository<Category> {
    async fn find_by_name(&self, name: &str) -> Result<Option<Category>, RepositoryError>;

    async fn find_all_by_name(&self, name: &str) -> Result<Vec<Category>, RepositoryError>;

    /// Direct children of every category called `name`
    async fn find_all_by_parent_name(&self, name: &str)
        -> Result<Vec<Category>, RepositoryError>;

    /// Load every category as a tree
    async fn load_tree(&self) -> Result<CategoryTree, RepositoryError>;

    /// Attach `child` under `parent`, rejecting cycles. Returns the updated child.
    async fn attach(
        &self,
        parent: CategoryId,
        child: CategoryId,
    ) -> Result<Category, RepositoryError>;

    /// Make `child` a root again. Returns the updated child.
    async fn detach(&self, child: CategoryId) -> Result<Category, RepositoryError>;
}

#[async_trait]
pub trait OrderRepository: Repository<Order> {
    async fn find_all_by_member(&self, member: MemberId) -> Result<Vec<Order>, RepositoryError>;

    /// The order owning the line `id`
    async fn find_by_order_item(&self, id: OrderItemId) -> Result<Option<Order>, RepositoryError>;

    /// Place the order and take stock for its lines, atomically. The order's
    /// audit fields are stamped with `auditor` in the same unit.
    async fn place_order(&self, id: OrderId, auditor: &str) -> Result<Order, RepositoryError>;

    /// Cancel the order and restore stock for its lines, atomically
    async fn cancel_order(&self, id: OrderId, auditor: &str) -> Result<Order, RepositoryError>;
}
