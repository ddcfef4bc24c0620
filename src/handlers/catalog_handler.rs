//! Catalog Handler
//!
//! Maintains catalog items and the category tree.

use std::sync::Arc;

use crate::aggregate::{Aggregate, Category, Item};
use crate::audit::{AuditAction, AuditLogBuilder, AuditLogService};
use crate::domain::{CategoryId, OperationContext};
use crate::error::{AppError, AppResult};
use crate::repository::{CategoryRepository, ItemRepository};

use super::{AttachCategoryCommand, CategorizeItemCommand, CreateCategoryCommand, RegisterItemCommand};

/// Handler for catalog maintenance
#[derive(Clone)]
pub struct CatalogHandler {
    items: Arc<dyn ItemRepository>,
    categories: Arc<dyn CategoryRepository>,
    audit: AuditLogService,
}

impl CatalogHandler {
    pub fn new(
        items: Arc<dyn ItemRepository>,
        categories: Arc<dyn CategoryRepository>,
        audit: AuditLogService,
    ) -> Self {
        Self {
            items,
            categories,
            audit,
        }
    }

    /// Add an item to the catalog
    pub async fn register_item(
        &self,
        command: RegisterItemCommand,
        context: &OperationContext,
    ) -> AppResult<Item> {
        let mut item = Item::new(command.name, command.price, command.stock_quantity, command.kind);
        for category in command.categories {
            item.add_category(category);
        }

        self.audit.stamp(&mut item, context);
        let item = self.items.save(item).await?;
        let item_id = item
            .id()
            .ok_or_else(|| AppError::Internal("saved item has no id".to_string()))?;

        self.audit.log(
            AuditLogBuilder::new(AuditAction::ItemRegistered)
                .resource_type(Item::aggregate_type())
                .resource_id(item_id)
                .after_state(&item),
            context,
        );

        tracing::info!(
            item_id = %item_id,
            kind = item.kind().label(),
            stock = item.stock_quantity(),
            "Item registered"
        );

        Ok(item)
    }

    /// Create a category, attaching it under `parent` when given
    pub async fn create_category(
        &self,
        command: CreateCategoryCommand,
        context: &OperationContext,
    ) -> AppResult<Category> {
        let category = self.categories.save(Category::new(command.name)).await?;
        let category_id = category
            .id()
            .ok_or_else(|| AppError::Internal("saved category has no id".to_string()))?;

        tracing::debug!(category_id = %category_id, name = %category.name(), "Category created");

        match command.parent {
            Some(parent) => {
                self.attach_category(
                    AttachCategoryCommand {
                        parent,
                        child: category_id,
                    },
                    context,
                )
                .await
            }
            None => Ok(category),
        }
    }

    /// Attach a category under another, rejecting cycles
    pub async fn attach_category(
        &self,
        command: AttachCategoryCommand,
        context: &OperationContext,
    ) -> AppResult<Category> {
        let child = self.categories.attach(command.parent, command.child).await?;

        self.audit.log(
            AuditLogBuilder::new(AuditAction::CategoryAttached)
                .resource_type(Category::aggregate_type())
                .resource_id(command.child)
                .after_state(&child),
            context,
        );

        tracing::info!(
            parent = %command.parent,
            child = %command.child,
            "Category attached"
        );

        Ok(child)
    }

    /// Add an item to a category; a no-op if it is already there
    pub async fn categorize_item(
        &self,
        command: CategorizeItemCommand,
        context: &OperationContext,
    ) -> AppResult<Item> {
        let mut item = self
            .items
            .find_by_id(command.item_id)
            .await?
            .ok_or_else(|| AppError::not_found("Item", command.item_id))?;

        if !item.add_category(command.category_id) {
            return Ok(item);
        }

        self.audit.stamp(&mut item, context);
        Ok(self.items.save(item).await?)
    }

    /// Direct children of every category called `name`
    pub async fn subcategories(&self, name: &str) -> AppResult<Vec<Category>> {
        Ok(self.categories.find_all_by_parent_name(name).await?)
    }

    pub async fn items_in_category(&self, category: CategoryId) -> AppResult<Vec<Item>> {
        Ok(self.items.find_all_by_category(category).await?)
    }
}
