//! Command definitions
//!
//! Commands represent intentions to change the system state.

use serde::{Deserialize, Serialize};

use crate::aggregate::ItemKind;
use crate::domain::{Address, CategoryId, ItemId, MemberId, OrderId};

// =========================================================================
// Members
// =========================================================================

/// Candidate member submitted at sign-up
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignUpCommand {
    pub username: String,
    pub password: String,
    pub name: String,
    #[serde(default)]
    pub address: Option<Address>,
}

impl SignUpCommand {
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            name: name.into(),
            address: None,
        }
    }

    pub fn with_address(mut self, address: Address) -> Self {
        self.address = Some(address);
        self
    }
}

// =========================================================================
// Orders
// =========================================================================

/// One requested line of a new order
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct OrderLineCommand {
    pub item_id: ItemId,
    pub count: u32,
}

/// Command to open an order (cart) for a member
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOrderCommand {
    pub member_id: MemberId,
    pub lines: Vec<OrderLineCommand>,
    /// Delivery address; the member's own address when absent
    #[serde(default)]
    pub address: Option<Address>,
}

impl CreateOrderCommand {
    pub fn new(member_id: MemberId) -> Self {
        Self {
            member_id,
            lines: Vec::new(),
            address: None,
        }
    }

    pub fn with_line(mut self, item_id: ItemId, count: u32) -> Self {
        self.lines.push(OrderLineCommand { item_id, count });
        self
    }

    pub fn with_address(mut self, address: Address) -> Self {
        self.address = Some(address);
        self
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PlaceOrderCommand {
    pub order_id: OrderId,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CancelOrderCommand {
    pub order_id: OrderId,
}

// =========================================================================
// Catalog
// =========================================================================

/// Command to add an item to the catalog
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterItemCommand {
    pub name: String,
    pub price: u32,
    pub stock_quantity: u32,
    #[serde(flatten)]
    pub kind: ItemKind,
    #[serde(default)]
    pub categories: Vec<CategoryId>,
}

impl RegisterItemCommand {
    pub fn new(name: impl Into<String>, price: u32, stock_quantity: u32, kind: ItemKind) -> Self {
        Self {
            name: name.into(),
            price,
            stock_quantity,
            kind,
            categories: Vec::new(),
        }
    }

    pub fn in_category(mut self, category: CategoryId) -> Self {
        self.categories.push(category);
        self
    }
}

/// Command to create a category, optionally under a parent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCategoryCommand {
    pub name: String,
    #[serde(default)]
    pub parent: Option<CategoryId>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AttachCategoryCommand {
    pub parent: CategoryId,
    pub child: CategoryId,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CategorizeItemCommand {
    pub item_id: ItemId,
    pub category_id: CategoryId,
}
