//! Catalog items
//!
//! Every item shares the same base fields and behaviour (priced, stockable,
//! categorizable); variants differ only in descriptive metadata, carried by
//! [`ItemKind`]. The kind is fixed when the item is created.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::domain::{AuditFields, Auditable, CategoryId, DomainError, ItemId};

use super::Aggregate;

/// Variant-specific metadata, tagged with the single-character discriminator
/// used by the single-table persisted shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "dtype")]
pub enum ItemKind {
    #[serde(rename = "B")]
    Book { author: String, isbn: String },

    #[serde(rename = "A")]
    Album { artist: String, etc: String },

    #[serde(rename = "M")]
    Movie { director: String, actor: String },
}

impl ItemKind {
    /// Discriminator stored alongside the item
    pub fn discriminator(&self) -> &'static str {
        match self {
            ItemKind::Book { .. } => "B",
            ItemKind::Album { .. } => "A",
            ItemKind::Movie { .. } => "M",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ItemKind::Book { .. } => "book",
            ItemKind::Album { .. } => "album",
            ItemKind::Movie { .. } => "movie",
        }
    }
}

/// Catalog item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    id: Option<ItemId>,
    name: String,
    price: u32,
    stock_quantity: u32,
    categories: BTreeSet<CategoryId>,
    #[serde(flatten)]
    kind: ItemKind,
    #[serde(default)]
    audit: AuditFields,
}

impl Item {
    pub fn new(name: impl Into<String>, price: u32, stock_quantity: u32, kind: ItemKind) -> Self {
        Self {
            id: None,
            name: name.into(),
            price,
            stock_quantity,
            categories: BTreeSet::new(),
            kind,
            audit: AuditFields::default(),
        }
    }

    pub fn book(
        name: impl Into<String>,
        price: u32,
        stock_quantity: u32,
        author: impl Into<String>,
        isbn: impl Into<String>,
    ) -> Self {
        Self::new(
            name,
            price,
            stock_quantity,
            ItemKind::Book {
                author: author.into(),
                isbn: isbn.into(),
            },
        )
    }

    pub fn album(
        name: impl Into<String>,
        price: u32,
        stock_quantity: u32,
        artist: impl Into<String>,
        etc: impl Into<String>,
    ) -> Self {
        Self::new(
            name,
            price,
            stock_quantity,
            ItemKind::Album {
                artist: artist.into(),
                etc: etc.into(),
            },
        )
    }

    pub fn movie(
        name: impl Into<String>,
        price: u32,
        stock_quantity: u32,
        director: impl Into<String>,
        actor: impl Into<String>,
    ) -> Self {
        Self::new(
            name,
            price,
            stock_quantity,
            ItemKind::Movie {
                director: director.into(),
                actor: actor.into(),
            },
        )
    }

    /// Rebuild an item from stored state
    pub fn from_db_state(
        id: ItemId,
        name: String,
        price: u32,
        stock_quantity: u32,
        categories: BTreeSet<CategoryId>,
        kind: ItemKind,
        audit: AuditFields,
    ) -> Self {
        Self {
            id: Some(id),
            name,
            price,
            stock_quantity,
            categories,
            kind,
            audit,
        }
    }

    /// Add the item to a category. Returns `false` if it was already there.
    pub fn add_category(&mut self, category: CategoryId) -> bool {
        self.categories.insert(category)
    }

    pub fn remove_category(&mut self, category: CategoryId) -> bool {
        self.categories.remove(&category)
    }

    /// Change stock by `delta`, returning the new quantity.
    ///
    /// Fails with [`DomainError::InsufficientStock`] if the result would be negative.
    pub fn adjust_stock(&mut self, delta: i64) -> Result<u32, DomainError> {
        let next = i64::from(self.stock_quantity)
            .checked_add(delta)
            .ok_or_else(|| {
                DomainError::InvalidQuantity(format!("stock change {} out of range", delta))
            })?;
        if next < 0 {
            return Err(DomainError::InsufficientStock {
                item_id: self.id,
                requested: delta.unsigned_abs(),
                available: self.stock_quantity,
            });
        }

        self.stock_quantity = u32::try_from(next)
            .map_err(|_| DomainError::InvalidQuantity(format!("stock {} out of range", next)))?;
        Ok(self.stock_quantity)
    }

    pub fn remove_stock(&mut self, quantity: u32) -> Result<u32, DomainError> {
        self.adjust_stock(-i64::from(quantity))
    }

    pub fn add_stock(&mut self, quantity: u32) -> Result<u32, DomainError> {
        self.adjust_stock(i64::from(quantity))
    }

    pub fn change_price(&mut self, price: u32) {
        self.price = price;
    }

    // =========================================================================
    // Getters
    // =========================================================================

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn price(&self) -> u32 {
        self.price
    }

    pub fn stock_quantity(&self) -> u32 {
        self.stock_quantity
    }

    pub fn categories(&self) -> &BTreeSet<CategoryId> {
        &self.categories
    }

    pub fn in_category(&self, category: CategoryId) -> bool {
        self.categories.contains(&category)
    }

    pub fn kind(&self) -> &ItemKind {
        &self.kind
    }
}

impl Aggregate for Item {
    type Id = ItemId;

    fn aggregate_type() -> &'static str {
        "Item"
    }

    fn id(&self) -> Option<ItemId> {
        self.id
    }

    fn assign_id(&mut self, id: ItemId) {
        self.id = Some(id);
    }
}

impl Auditable for Item {
    fn audit_fields(&self) -> &AuditFields {
        &self.audit
    }

    fn audit_fields_mut(&mut self) -> &mut AuditFields {
        &mut self.audit
    }
}
