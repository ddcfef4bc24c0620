//! Order Aggregate
//!
//! An order owns its lines and its delivery. Lines are snapshots: the price is
//! copied from the catalog when the line is built and never follows later
//! catalog changes.
//!
//! Lifecycle: IN_CART → ORDERED → RETURNED. Placing takes stock from every
//! referenced item, cancelling gives it back; both are all-or-nothing.

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::domain::status::stable_code_enum;
use crate::domain::{
    AuditFields, Auditable, DeliveryId, DomainError, ItemId, MemberId, OrderId, OrderItemId,
};

use super::{Aggregate, Delivery, Item};

stable_code_enum! {
    /// Order status, persisted as its stable code
    pub enum OrderStatus default Ordered {
        Ordered => "OS001",
        InCart => "OS002",
        Returned => "OS003",
    }
}

// =============================================================================
// OrderItem
// =============================================================================

/// One purchased item at a fixed price and quantity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderItem {
    id: OrderItemId,
    item_id: ItemId,
    order_price: u32,
    count: u32,
}

impl OrderItem {
    /// Snapshot `item` at `order_price` for `count` units.
    ///
    /// The item must already be saved so the line can reference it.
    pub fn new(item: &Item, order_price: u32, count: u32) -> Result<Self, DomainError> {
        if count == 0 {
            return Err(DomainError::InvalidQuantity(
                "order line count must be positive".to_string(),
            ));
        }
        let item_id = item
            .id()
            .ok_or_else(|| DomainError::validation("item", "must be saved before ordering"))?;

        Ok(Self {
            id: OrderItemId::new(),
            item_id,
            order_price,
            count,
        })
    }

    /// Rebuild a line from stored state
    pub fn from_db_state(id: OrderItemId, item_id: ItemId, order_price: u32, count: u32) -> Self {
        Self {
            id,
            item_id,
            order_price,
            count,
        }
    }

    pub fn id(&self) -> OrderItemId {
        self.id
    }

    pub fn item_id(&self) -> ItemId {
        self.item_id
    }

    pub fn order_price(&self) -> u32 {
        self.order_price
    }

    pub fn count(&self) -> u32 {
        self.count
    }

    /// order_price × count
    pub fn line_total(&self) -> u64 {
        u64::from(self.order_price) * u64::from(self.count)
    }
}

// =============================================================================
// Inventory
// =============================================================================

/// Stock lookup used while placing and cancelling an order
pub trait Inventory {
    fn item(&self, id: ItemId) -> Option<&Item>;

    fn item_mut(&mut self, id: ItemId) -> Option<&mut Item>;
}

impl Inventory for HashMap<ItemId, Item> {
    fn item(&self, id: ItemId) -> Option<&Item> {
        self.get(&id)
    }

    fn item_mut(&mut self, id: ItemId) -> Option<&mut Item> {
        self.get_mut(&id)
    }
}

impl Inventory for BTreeMap<ItemId, Item> {
    fn item(&self, id: ItemId) -> Option<&Item> {
        self.get(&id)
    }

    fn item_mut(&mut self, id: ItemId) -> Option<&mut Item> {
        self.get_mut(&id)
    }
}

// =============================================================================
// Order
// =============================================================================

/// Order Aggregate Root
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    id: Option<OrderId>,
    member_id: MemberId,
    order_items: Vec<OrderItem>,
    delivery: Delivery,
    order_date: NaiveDate,
    status: OrderStatus,
    #[serde(default)]
    audit: AuditFields,
}

impl Order {
    /// Open a cart for `member_id`, shipping with `delivery`
    pub fn new(member_id: MemberId, delivery: Delivery) -> Self {
        Self {
            id: None,
            member_id,
            order_items: Vec::new(),
            delivery,
            order_date: Utc::now().date_naive(),
            status: OrderStatus::InCart,
            audit: AuditFields::default(),
        }
    }

    /// Rebuild an order from stored state
    pub fn from_db_state(
        id: OrderId,
        member_id: MemberId,
        order_items: Vec<OrderItem>,
        delivery: Delivery,
        order_date: NaiveDate,
        status: OrderStatus,
        audit: AuditFields,
    ) -> Self {
        Self {
            id: Some(id),
            member_id,
            order_items,
            delivery,
            order_date,
            status,
            audit,
        }
    }

    // =========================================================================
    // Commands
    // =========================================================================

    /// Attach a line to this order.
    ///
    /// A line that is already attached is returned unchanged, whatever the
    /// order's state. New lines are only accepted while the order is in the cart.
    pub fn add_order_item(&mut self, order_item: OrderItem) -> Result<&OrderItem, DomainError> {
        if let Some(index) = self.position(order_item.id) {
            return Ok(&self.order_items[index]);
        }
        if self.status != OrderStatus::InCart {
            return Err(DomainError::invalid_state("Order", self.status, "add item to"));
        }

        self.order_items.push(order_item);
        let index = self.order_items.len() - 1;
        Ok(&self.order_items[index])
    }

    /// Snapshot `item` at `order_price` and attach it as a new line
    pub fn add_item(
        &mut self,
        item: &Item,
        order_price: u32,
        count: u32,
    ) -> Result<&OrderItem, DomainError> {
        let line = OrderItem::new(item, order_price, count)?;
        self.add_order_item(line)
    }

    /// IN_CART → ORDERED, taking stock for every line.
    ///
    /// Every line is checked before any stock moves; on error neither the order
    /// nor the inventory is modified.
    pub fn place_order(&mut self, inventory: &mut impl Inventory) -> Result<(), DomainError> {
        if self.status != OrderStatus::InCart {
            return Err(DomainError::invalid_state("Order", self.status, "place"));
        }
        if self.order_items.is_empty() {
            return Err(DomainError::validation("order_items", "order has no lines"));
        }

        let requirements = self.stock_requirements();
        for (&item_id, &requested) in &requirements {
            let item = inventory
                .item(item_id)
                .ok_or_else(|| DomainError::not_found("Item", item_id))?;
            if u64::from(item.stock_quantity()) < requested {
                return Err(DomainError::insufficient_stock(
                    item_id,
                    requested,
                    item.stock_quantity(),
                ));
            }
        }

        for (item_id, requested) in requirements {
            let item = inventory
                .item_mut(item_id)
                .ok_or_else(|| DomainError::not_found("Item", item_id))?;
            item.adjust_stock(-(requested as i64))?;
        }

        self.status = OrderStatus::Ordered;
        Ok(())
    }

    /// ORDERED → RETURNED, giving back the stock taken when placed.
    pub fn cancel_order(&mut self, inventory: &mut impl Inventory) -> Result<(), DomainError> {
        if self.status != OrderStatus::Ordered {
            return Err(DomainError::invalid_state("Order", self.status, "cancel"));
        }

        let requirements = self.stock_requirements();
        for (&item_id, &returned) in &requirements {
            let item = inventory
                .item(item_id)
                .ok_or_else(|| DomainError::not_found("Item", item_id))?;
            if u64::from(item.stock_quantity()) + returned > u64::from(u32::MAX) {
                return Err(DomainError::InvalidQuantity(format!(
                    "restoring {} units would overflow stock of item {}",
                    returned, item_id
                )));
            }
        }

        for (item_id, returned) in requirements {
            let item = inventory
                .item_mut(item_id)
                .ok_or_else(|| DomainError::not_found("Item", item_id))?;
            item.adjust_stock(returned as i64)?;
        }

        self.status = OrderStatus::Returned;
        Ok(())
    }

    /// Check that this copy may be written over `stored`, the version currently
    /// held by the store (`None` when the order is new).
    ///
    /// Status only moves through [`Order::place_order`] and
    /// [`Order::cancel_order`], which the store runs together with the stock
    /// change, so a plain save may never change it. A new order must start in
    /// the cart, and lines are frozen once the order leaves it.
    pub fn ensure_can_overwrite(&self, stored: Option<&Order>) -> Result<(), DomainError> {
        let Some(stored) = stored else {
            if self.status != OrderStatus::InCart {
                return Err(DomainError::invalid_state("Order", self.status, "create"));
            }
            return Ok(());
        };

        if self.status != stored.status {
            return Err(DomainError::invalid_state(
                "Order",
                stored.status,
                "change status of",
            ));
        }
        if stored.status != OrderStatus::InCart && self.order_items != stored.order_items {
            return Err(DomainError::invalid_state("Order", stored.status, "change lines of"));
        }
        Ok(())
    }

    pub fn delivery_mut(&mut self) -> &mut Delivery {
        &mut self.delivery
    }

    pub(crate) fn assign_delivery_id(&mut self, id: DeliveryId) {
        self.delivery.assign_id(id);
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Σ order_price × count over every line
    pub fn total_price(&self) -> u64 {
        self.order_items.iter().map(OrderItem::line_total).sum()
    }

    /// Units required per item, summed over lines that reference the same item
    pub fn stock_requirements(&self) -> BTreeMap<ItemId, u64> {
        let mut requirements = BTreeMap::new();
        for line in &self.order_items {
            *requirements.entry(line.item_id).or_insert(0) += u64::from(line.count);
        }
        requirements
    }

    /// Check if the line `id` belongs to this order
    pub fn owns(&self, id: OrderItemId) -> bool {
        self.position(id).is_some()
    }

    /// Check if any line references `item_id`
    pub fn contains(&self, item_id: ItemId) -> bool {
        self.order_items.iter().any(|line| line.item_id == item_id)
    }

    pub fn order_item(&self, id: OrderItemId) -> Option<&OrderItem> {
        self.position(id).map(|index| &self.order_items[index])
    }

    fn position(&self, id: OrderItemId) -> Option<usize> {
        self.order_items.iter().position(|line| line.id == id)
    }

    // =========================================================================
    // Getters
    // =========================================================================

    pub fn member_id(&self) -> MemberId {
        self.member_id
    }

    pub fn order_items(&self) -> &[OrderItem] {
        &self.order_items
    }

    pub fn delivery(&self) -> &Delivery {
        &self.delivery
    }

    pub fn order_date(&self) -> NaiveDate {
        self.order_date
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }
}

impl Aggregate for Order {
    type Id = OrderId;

    fn aggregate_type() -> &'static str {
        "Order"
    }

    fn id(&self) -> Option<OrderId> {
        self.id
    }

    fn assign_id(&mut self, id: OrderId) {
        self.id = Some(id);
    }
}

impl Auditable for Order {
    fn audit_fields(&self) -> &AuditFields {
        &self.audit
    }

    fn audit_fields_mut(&mut self) -> &mut AuditFields {
        &mut self.audit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Address, StableCode};

    fn saved(mut item: Item, id: i64) -> Item {
        item.assign_id(ItemId::new(id));
        item
    }

    fn inventory(items: Vec<Item>) -> HashMap<ItemId, Item> {
        items
            .into_iter()
            .map(|item| (item.id().unwrap(), item))
            .collect()
    }

    fn cart() -> Order {
        let delivery = Delivery::new(Address::new("Incheon", "Gulporo", "21328"));
        Order::new(MemberId::new(1), delivery)
    }

    fn book_x(stock: u32) -> Item {
        saved(Item::book("X", 1000, stock, "Kim", "978-89-000"), 1)
    }

    #[test]
    fn test_order_status_codes() {
        assert_eq!(OrderStatus::Ordered.code(), "OS001");
        assert_eq!(OrderStatus::InCart.code(), "OS002");
        assert_eq!(OrderStatus::Returned.code(), "OS003");
        for (status, code) in OrderStatus::CODES {
            assert_eq!(code.parse::<OrderStatus>().unwrap(), *status);
        }
    }

    #[test]
    fn test_absent_status_encodes_ordered() {
        assert_eq!(OrderStatus::encode(None), "OS001");
    }

    #[test]
    fn test_new_order_is_in_cart() {
        let order = cart();
        assert_eq!(order.status(), OrderStatus::InCart);
        assert_eq!(order.total_price(), 0);
        assert!(order.is_new());
    }

    #[test]
    fn test_order_item_rejects_zero_count() {
        let result = OrderItem::new(&book_x(5), 1000, 0);
        assert!(matches!(result, Err(DomainError::InvalidQuantity(_))));
    }

    #[test]
    fn test_order_item_requires_saved_item() {
        let unsaved = Item::book("X", 1000, 5, "Kim", "978-89-000");
        let result = OrderItem::new(&unsaved, 1000, 1);
        assert!(matches!(result, Err(DomainError::Validation { field: "item", .. })));
    }

    #[test]
    fn test_add_order_item_is_idempotent() {
        let mut order = cart();
        let line = OrderItem::new(&book_x(5), 1000, 2).unwrap();

        order.add_order_item(line.clone()).unwrap();
        order.add_order_item(line.clone()).unwrap();

        assert_eq!(order.order_items().len(), 1);
        assert!(order.owns(line.id()));
        assert_eq!(order.total_price(), 2000);
    }

    #[test]
    fn test_distinct_lines_for_same_item_are_kept() {
        let mut order = cart();
        let book = book_x(5);

        order.add_item(&book, 1000, 1).unwrap();
        order.add_item(&book, 1000, 1).unwrap();

        assert_eq!(order.order_items().len(), 2);
        assert_eq!(order.stock_requirements().get(&ItemId::new(1)), Some(&2));
    }

    #[test]
    fn test_total_price_independent_of_insertion_order() {
        let book = book_x(10);
        let album = saved(Item::album("Y", 300, 10, "Artist", ""), 2);
        let movie = saved(Item::movie("Z", 7000, 10, "Director", "Actor"), 3);
        let lines = vec![
            OrderItem::new(&book, 1000, 2).unwrap(),
            OrderItem::new(&album, 300, 3).unwrap(),
            OrderItem::new(&movie, 7000, 1).unwrap(),
        ];

        let mut forward = cart();
        for line in lines.iter().cloned() {
            forward.add_order_item(line).unwrap();
        }
        let mut backward = cart();
        for line in lines.iter().rev().cloned() {
            backward.add_order_item(line).unwrap();
        }

        assert_eq!(forward.total_price(), 2000 + 900 + 7000);
        assert_eq!(forward.total_price(), backward.total_price());
    }

    #[test]
    fn test_price_snapshot_ignores_catalog_changes() {
        let mut book = book_x(5);
        let mut order = cart();
        order.add_item(&book, book.price(), 1).unwrap();

        book.change_price(5000);

        assert_eq!(order.order_items()[0].order_price(), 1000);
        assert_eq!(order.total_price(), 1000);
    }

    #[test]
    fn test_place_order_takes_stock() {
        let mut items = inventory(vec![book_x(5)]);
        let mut order = cart();
        order.add_item(&items[&ItemId::new(1)], 1000, 2).unwrap();

        order.place_order(&mut items).unwrap();

        assert_eq!(order.status(), OrderStatus::Ordered);
        assert_eq!(items[&ItemId::new(1)].stock_quantity(), 3);
        assert_eq!(order.total_price(), 2000);
    }

    #[test]
    fn test_place_order_with_insufficient_stock_changes_nothing() {
        let mut items = inventory(vec![book_x(1)]);
        let mut order = cart();
        order.add_item(&items[&ItemId::new(1)], 1000, 2).unwrap();

        let result = order.place_order(&mut items);

        assert_eq!(
            result,
            Err(DomainError::insufficient_stock(ItemId::new(1), 2, 1))
        );
        assert_eq!(items[&ItemId::new(1)].stock_quantity(), 1);
        assert_eq!(order.status(), OrderStatus::InCart);
    }

    #[test]
    fn test_place_order_is_all_or_nothing_across_lines() {
        let album = saved(Item::album("Y", 300, 0, "Artist", ""), 2);
        let mut items = inventory(vec![book_x(5), album]);
        let mut order = cart();
        order.add_item(&items[&ItemId::new(1)], 1000, 2).unwrap();
        order.add_item(&items[&ItemId::new(2)], 300, 1).unwrap();

        assert!(order.place_order(&mut items).is_err());
        assert_eq!(items[&ItemId::new(1)].stock_quantity(), 5);
        assert_eq!(order.status(), OrderStatus::InCart);
    }

    #[test]
    fn test_place_order_sums_repeated_items() {
        let mut items = inventory(vec![book_x(3)]);
        let mut order = cart();
        order.add_item(&items[&ItemId::new(1)], 1000, 2).unwrap();
        order.add_item(&items[&ItemId::new(1)], 1000, 2).unwrap();

        let result = order.place_order(&mut items);

        assert_eq!(
            result,
            Err(DomainError::insufficient_stock(ItemId::new(1), 4, 3))
        );
        assert_eq!(items[&ItemId::new(1)].stock_quantity(), 3);
    }

    #[test]
    fn test_place_order_outside_cart_rejected() {
        let mut items = inventory(vec![book_x(5)]);
        let mut order = cart();
        order.add_item(&items[&ItemId::new(1)], 1000, 2).unwrap();
        order.place_order(&mut items).unwrap();

        let result = order.place_order(&mut items);

        assert!(matches!(
            result,
            Err(DomainError::InvalidState { operation: "place", .. })
        ));
        assert_eq!(items[&ItemId::new(1)].stock_quantity(), 3);
        assert_eq!(order.status(), OrderStatus::Ordered);
    }

    #[test]
    fn test_place_empty_order_rejected() {
        let mut items = inventory(vec![]);
        let mut order = cart();

        assert!(order.place_order(&mut items).is_err());
        assert_eq!(order.status(), OrderStatus::InCart);
    }

    #[test]
    fn test_place_order_with_unknown_item_rejected() {
        let mut items = inventory(vec![book_x(5)]);
        let mut order = cart();
        order.add_item(&saved(Item::book("Gone", 1, 1, "a", "b"), 99), 1, 1).unwrap();

        assert!(matches!(
            order.place_order(&mut items),
            Err(DomainError::NotFound { entity: "Item", .. })
        ));
    }

    #[test]
    fn test_cancel_order_restores_stock() {
        let mut items = inventory(vec![book_x(5)]);
        let mut order = cart();
        order.add_item(&items[&ItemId::new(1)], 1000, 2).unwrap();
        order.place_order(&mut items).unwrap();

        order.cancel_order(&mut items).unwrap();

        assert_eq!(order.status(), OrderStatus::Returned);
        assert_eq!(items[&ItemId::new(1)].stock_quantity(), 5);
    }

    #[test]
    fn test_cancel_order_requires_ordered() {
        let mut items = inventory(vec![book_x(5)]);
        let mut order = cart();
        order.add_item(&items[&ItemId::new(1)], 1000, 2).unwrap();

        assert!(matches!(
            order.cancel_order(&mut items),
            Err(DomainError::InvalidState { operation: "cancel", .. })
        ));
        assert_eq!(items[&ItemId::new(1)].stock_quantity(), 5);
    }

    #[test]
    fn test_new_lines_rejected_after_placing() {
        let mut items = inventory(vec![book_x(5)]);
        let mut order = cart();
        let line = OrderItem::new(&items[&ItemId::new(1)], 1000, 1).unwrap();
        order.add_order_item(line.clone()).unwrap();
        order.place_order(&mut items).unwrap();

        // re-adding the attached line is still a no-op
        assert!(order.add_order_item(line).is_ok());
        assert!(order.add_item(&items[&ItemId::new(1)], 1000, 1).is_err());
        assert_eq!(order.order_items().len(), 1);
    }

    #[test]
    fn test_stale_cart_cannot_overwrite_placed_order() {
        let mut items = inventory(vec![book_x(5)]);
        let mut order = cart();
        order.add_item(&items[&ItemId::new(1)], 1000, 2).unwrap();
        let stale = order.clone();
        order.place_order(&mut items).unwrap();

        assert!(matches!(
            stale.ensure_can_overwrite(Some(&order)),
            Err(DomainError::InvalidState { operation: "change status of", .. })
        ));
        assert!(order.ensure_can_overwrite(Some(&order)).is_ok());
    }

    #[test]
    fn test_lines_frozen_once_placed() {
        let mut items = inventory(vec![book_x(5)]);
        let mut order = cart();
        order.add_item(&items[&ItemId::new(1)], 1000, 2).unwrap();
        order.place_order(&mut items).unwrap();

        let mut rewritten = order.clone();
        rewritten.order_items.clear();

        assert!(matches!(
            rewritten.ensure_can_overwrite(Some(&order)),
            Err(DomainError::InvalidState { operation: "change lines of", .. })
        ));
    }

    #[test]
    fn test_cart_lines_may_change_before_placing() {
        let items = inventory(vec![book_x(5)]);
        let stored = cart();
        let mut edited = stored.clone();
        edited.add_item(&items[&ItemId::new(1)], 1000, 1).unwrap();

        assert!(edited.ensure_can_overwrite(Some(&stored)).is_ok());
    }

    #[test]
    fn test_new_order_must_start_in_cart() {
        let mut items = inventory(vec![book_x(5)]);
        let mut order = cart();
        order.add_item(&items[&ItemId::new(1)], 1000, 1).unwrap();
        assert!(order.ensure_can_overwrite(None).is_ok());

        order.place_order(&mut items).unwrap();
        assert!(matches!(
            order.ensure_can_overwrite(None),
            Err(DomainError::InvalidState { operation: "create", .. })
        ));
    }

    #[test]
    fn test_order_json_uses_status_codes() {
        let order = cart();
        let json = serde_json::to_value(&order).unwrap();

        assert_eq!(json["status"], "OS002");
        assert_eq!(json["delivery"]["status"], "D0000");
    }
}
