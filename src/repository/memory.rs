//! In-memory store
//!
//! Every table sits behind one lock, so each operation (including order
//! placement and cancellation) is atomic with respect to the others.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use tokio::sync::Mutex;

use crate::aggregate::{Aggregate, Category, CategoryTree, Item, Member, Order};
use crate::domain::{
    Auditable, CategoryId, DeliveryId, ItemId, MemberId, OrderId, OrderItemId,
};

use super::{
    CategoryRepository, ItemRepository, MemberRepository, OrderRepository, Repository,
    RepositoryError,
};

#[derive(Debug, Default)]
struct StoreData {
    members: BTreeMap<MemberId, Member>,
    items: BTreeMap<ItemId, Item>,
    categories: CategoryTree,
    orders: BTreeMap<OrderId, Order>,
    last_member_id: i64,
    last_item_id: i64,
    last_category_id: i64,
    last_order_id: i64,
    last_delivery_id: i64,
}

fn next_id(last: &mut i64) -> i64 {
    *last += 1;
    *last
}

/// In-memory store, used when no database is configured and in tests
#[derive(Debug, Default)]
pub struct InMemoryStore {
    data: Mutex<StoreData>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

// =============================================================================
// Members
// =============================================================================

#[async_trait]
impl Repository<Member> for InMemoryStore {
    async fn save(&self, mut member: Member) -> Result<Member, RepositoryError> {
        let mut data = self.data.lock().await;

        let taken = data
            .members
            .values()
            .any(|other| other.username() == member.username() && other.id() != member.id());
        if taken {
            return Err(RepositoryError::UniqueViolation(member.username().to_string()));
        }

        let id = match member.id() {
            Some(id) if data.members.contains_key(&id) => id,
            Some(id) => return Err(RepositoryError::not_found("Member", id)),
            None => {
                let id = MemberId::new(next_id(&mut data.last_member_id));
                member.assign_id(id);
                id
            }
        };

        data.members.insert(id, member.clone());
        Ok(member)
    }

    async fn find_by_id(&self, id: MemberId) -> Result<Option<Member>, RepositoryError> {
        let data = self.data.lock().await;
        Ok(data.members.get(&id).cloned())
    }

    async fn delete(&self, member: &Member) -> Result<(), RepositoryError> {
        let id = member
            .id()
            .ok_or_else(|| RepositoryError::not_found("Member", "<unsaved>"))?;
        let mut data = self.data.lock().await;

        if data.orders.values().any(|order| order.member_id() == id) {
            return Err(RepositoryError::still_referenced("Member", id));
        }
        data.members
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| RepositoryError::not_found("Member", id))
    }
}

#[async_trait]
impl MemberRepository for InMemoryStore {
    async fn exists_by_username(&self, username: &str) -> Result<bool, RepositoryError> {
        let data = self.data.lock().await;
        Ok(data.members.values().any(|member| member.username() == username))
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<Member>, RepositoryError> {
        let data = self.data.lock().await;
        Ok(data
            .members
            .values()
            .find(|member| member.username() == username)
            .cloned())
    }
}

// =============================================================================
// Items
// =============================================================================

#[async_trait]
impl Repository<Item> for InMemoryStore {
    async fn save(&self, mut item: Item) -> Result<Item, RepositoryError> {
        let mut data = self.data.lock().await;

        if let Some(missing) = item
            .categories()
            .iter()
            .find(|category| !data.categories.contains(**category))
        {
            return Err(RepositoryError::not_found("Category", missing));
        }

        let id = match item.id() {
            Some(id) if data.items.contains_key(&id) => id,
            Some(id) => return Err(RepositoryError::not_found("Item", id)),
            None => {
                let id = ItemId::new(next_id(&mut data.last_item_id));
                item.assign_id(id);
                id
            }
        };

        data.items.insert(id, item.clone());
        Ok(item)
    }

    async fn find_by_id(&self, id: ItemId) -> Result<Option<Item>, RepositoryError> {
        let data = self.data.lock().await;
        Ok(data.items.get(&id).cloned())
    }

    async fn delete(&self, item: &Item) -> Result<(), RepositoryError> {
        let id = item
            .id()
            .ok_or_else(|| RepositoryError::not_found("Item", "<unsaved>"))?;
        let mut data = self.data.lock().await;

        if data.orders.values().any(|order| order.contains(id)) {
            return Err(RepositoryError::still_referenced("Item", id));
        }
        data.items
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| RepositoryError::not_found("Item", id))
    }
}

#[async_trait]
impl ItemRepository for InMemoryStore {
    async fn find_all(&self) -> Result<Vec<Item>, RepositoryError> {
        let data = self.data.lock().await;
        Ok(data.items.values().cloned().collect())
    }

    async fn find_all_by_category(
        &self,
        category: CategoryId,
    ) -> Result<Vec<Item>, RepositoryError> {
        let data = self.data.lock().await;
        Ok(data
            .items
            .values()
            .filter(|item| item.in_category(category))
            .cloned()
            .collect())
    }
}

// =============================================================================
// Categories
// =============================================================================

#[async_trait]
impl Repository<Category> for InMemoryStore {
    async fn save(&self, mut category: Category) -> Result<Category, RepositoryError> {
        let mut data = self.data.lock().await;

        match category.id() {
            Some(id) if data.categories.contains(id) => {}
            Some(id) => return Err(RepositoryError::not_found("Category", id)),
            None => {
                let id = CategoryId::new(next_id(&mut data.last_category_id));
                category.assign_id(id);
            }
        }

        data.categories.insert(category.clone())?;
        Ok(category)
    }

    async fn find_by_id(&self, id: CategoryId) -> Result<Option<Category>, RepositoryError> {
        let data = self.data.lock().await;
        Ok(data.categories.get(id).cloned())
    }

    async fn delete(&self, category: &Category) -> Result<(), RepositoryError> {
        let id = category
            .id()
            .ok_or_else(|| RepositoryError::not_found("Category", "<unsaved>"))?;
        let mut data = self.data.lock().await;

        data.categories.remove(id)?;
        for item in data.items.values_mut() {
            item.remove_category(id);
        }
        Ok(())
    }
}

#[async_trait]
impl CategoryRepository for InMemoryStore {
    async fn find_by_name(&self, name: &str) -> Result<Option<Category>, RepositoryError> {
        let data = self.data.lock().await;
        Ok(data.categories.find_by_name(name).cloned())
    }

    async fn find_all_by_name(&self, name: &str) -> Result<Vec<Category>, RepositoryError> {
        let data = self.data.lock().await;
        Ok(data
            .categories
            .find_all_by_name(name)
            .into_iter()
            .cloned()
            .collect())
    }

    async fn find_all_by_parent_name(
        &self,
        name: &str,
    ) -> Result<Vec<Category>, RepositoryError> {
        let data = self.data.lock().await;
        Ok(data
            .categories
            .find_all_by_parent_name(name)
            .into_iter()
            .cloned()
            .collect())
    }

    async fn load_tree(&self) -> Result<CategoryTree, RepositoryError> {
        let data = self.data.lock().await;
        Ok(data.categories.clone())
    }

    async fn attach(
        &self,
        parent: CategoryId,
        child: CategoryId,
    ) -> Result<Category, RepositoryError> {
        let mut data = self.data.lock().await;
        data.categories.attach(parent, child)?;
        data.categories
            .get(child)
            .cloned()
            .ok_or_else(|| RepositoryError::not_found("Category", child))
    }

    async fn detach(&self, child: CategoryId) -> Result<Category, RepositoryError> {
        let mut data = self.data.lock().await;
        data.categories.detach(child)?;
        data.categories
            .get(child)
            .cloned()
            .ok_or_else(|| RepositoryError::not_found("Category", child))
    }
}

// =============================================================================
// Orders
// =============================================================================

#[async_trait]
impl Repository<Order> for InMemoryStore {
    async fn save(&self, mut order: Order) -> Result<Order, RepositoryError> {
        let mut guard = self.data.lock().await;
        let data = &mut *guard;

        if !data.members.contains_key(&order.member_id()) {
            return Err(RepositoryError::not_found("Member", order.member_id()));
        }
        for line in order.order_items() {
            if !data.items.contains_key(&line.item_id()) {
                return Err(RepositoryError::not_found("Item", line.item_id()));
            }
            // A line belongs to exactly one order.
            let owned_elsewhere = data
                .orders
                .values()
                .any(|other| other.id() != order.id() && other.owns(line.id()));
            if owned_elsewhere {
                return Err(RepositoryError::UniqueViolation(line.id().to_string()));
            }
        }

        let id = match order.id() {
            Some(id) => {
                let stored = data
                    .orders
                    .get(&id)
                    .ok_or_else(|| RepositoryError::not_found("Order", id))?;
                order.ensure_can_overwrite(Some(stored))?;
                id
            }
            None => {
                order.ensure_can_overwrite(None)?;
                let id = OrderId::new(next_id(&mut data.last_order_id));
                order.assign_id(id);
                id
            }
        };
        if order.delivery().id().is_none() {
            order.assign_delivery_id(DeliveryId::new(next_id(&mut data.last_delivery_id)));
        }

        data.orders.insert(id, order.clone());
        Ok(order)
    }

    async fn find_by_id(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let data = self.data.lock().await;
        Ok(data.orders.get(&id).cloned())
    }

    async fn delete(&self, order: &Order) -> Result<(), RepositoryError> {
        let id = order
            .id()
            .ok_or_else(|| RepositoryError::not_found("Order", "<unsaved>"))?;
        let mut data = self.data.lock().await;
        data.orders
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| RepositoryError::not_found("Order", id))
    }
}

#[async_trait]
impl OrderRepository for InMemoryStore {
    async fn find_all_by_member(&self, member: MemberId) -> Result<Vec<Order>, RepositoryError> {
        let data = self.data.lock().await;
        Ok(data
            .orders
            .values()
            .filter(|order| order.member_id() == member)
            .cloned()
            .collect())
    }

    async fn find_by_order_item(&self, id: OrderItemId) -> Result<Option<Order>, RepositoryError> {
        let data = self.data.lock().await;
        Ok(data.orders.values().find(|order| order.owns(id)).cloned())
    }

    async fn place_order(&self, id: OrderId, auditor: &str) -> Result<Order, RepositoryError> {
        let mut guard = self.data.lock().await;
        let data = &mut *guard;

        let order = data
            .orders
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::not_found("Order", id))?;
        order.place_order(&mut data.items)?;
        order.audit_fields_mut().touch(auditor, Utc::now());
        Ok(order.clone())
    }

    async fn cancel_order(&self, id: OrderId, auditor: &str) -> Result<Order, RepositoryError> {
        let mut guard = self.data.lock().await;
        let data = &mut *guard;

        let order = data
            .orders
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::not_found("Order", id))?;
        order.cancel_order(&mut data.items)?;
        order.audit_fields_mut().touch(auditor, Utc::now());
        Ok(order.clone())
    }
}
