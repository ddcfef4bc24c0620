//! Order Handlers
//!
//! Open a cart from a member and catalog lines, then place or cancel it.
//! Stock moves happen inside the store so they commit together with the
//! status change and the audit stamp; nothing is saved afterwards.

use std::sync::Arc;

use crate::aggregate::{Aggregate, Delivery, Order};
use crate::audit::{AuditAction, AuditLogBuilder, AuditLogService};
use crate::domain::{DomainError, OperationContext};
use crate::error::{AppError, AppResult};
use crate::repository::{ItemRepository, MemberRepository, OrderRepository, RepositoryError};

use super::{CancelOrderCommand, CreateOrderCommand, PlaceOrderCommand};

// =========================================================================
// CreateOrderHandler
// =========================================================================

/// Handler for opening an order
#[derive(Clone)]
pub struct CreateOrderHandler {
    members: Arc<dyn MemberRepository>,
    items: Arc<dyn ItemRepository>,
    orders: Arc<dyn OrderRepository>,
    audit: AuditLogService,
}

impl CreateOrderHandler {
    pub fn new(
        members: Arc<dyn MemberRepository>,
        items: Arc<dyn ItemRepository>,
        orders: Arc<dyn OrderRepository>,
        audit: AuditLogService,
    ) -> Self {
        Self {
            members,
            items,
            orders,
            audit,
        }
    }

    /// Execute the create order command.
    ///
    /// Each line snapshots the item's current catalog price.
    pub async fn execute(
        &self,
        command: CreateOrderCommand,
        context: &OperationContext,
    ) -> AppResult<Order> {
        let member = self
            .members
            .find_by_id(command.member_id)
            .await?
            .ok_or_else(|| AppError::not_found("Member", command.member_id))?;

        let address = command
            .address
            .or_else(|| member.address().cloned())
            .ok_or_else(|| DomainError::validation("address", "no delivery address given"))?;

        let mut order = Order::new(command.member_id, Delivery::new(address));
        for line in &command.lines {
            let item = self
                .items
                .find_by_id(line.item_id)
                .await?
                .ok_or_else(|| AppError::not_found("Item", line.item_id))?;
            order.add_item(&item, item.price(), line.count)?;
        }

        self.audit.stamp(&mut order, context);
        let order = self.orders.save(order).await?;
        let order_id = order
            .id()
            .ok_or_else(|| AppError::Internal("saved order has no id".to_string()))?;

        self.audit.log(
            AuditLogBuilder::new(AuditAction::OrderCreated)
                .resource_type(Order::aggregate_type())
                .resource_id(order_id)
                .after_state(&order),
            context,
        );

        tracing::info!(
            order_id = %order_id,
            member_id = %order.member_id(),
            lines = order.order_items().len(),
            total_price = order.total_price(),
            "Order created"
        );

        Ok(order)
    }
}

// =========================================================================
// PlaceOrderHandler / CancelOrderHandler
// =========================================================================

/// Handler for placing an order
#[derive(Clone)]
pub struct PlaceOrderHandler {
    orders: Arc<dyn OrderRepository>,
    audit: AuditLogService,
}

impl PlaceOrderHandler {
    pub fn new(orders: Arc<dyn OrderRepository>, audit: AuditLogService) -> Self {
        Self { orders, audit }
    }

    /// Execute the place order command
    pub async fn execute(
        &self,
        command: PlaceOrderCommand,
        context: &OperationContext,
    ) -> AppResult<Order> {
        let auditor = self.audit.auditor_for(context);
        let order = match self.orders.place_order(command.order_id, &auditor).await {
            Ok(order) => order,
            Err(RepositoryError::Domain(e @ DomainError::InsufficientStock { .. })) => {
                tracing::warn!(order_id = %command.order_id, error = %e, "Order not placed");
                return Err(e.into());
            }
            Err(e) => return Err(e.into()),
        };
        log_transition(&self.audit, &order, AuditAction::OrderPlaced, context);

        tracing::info!(
            order_id = %command.order_id,
            total_price = order.total_price(),
            "Order placed"
        );

        Ok(order)
    }
}

/// Handler for cancelling an order
#[derive(Clone)]
pub struct CancelOrderHandler {
    orders: Arc<dyn OrderRepository>,
    audit: AuditLogService,
}

impl CancelOrderHandler {
    pub fn new(orders: Arc<dyn OrderRepository>, audit: AuditLogService) -> Self {
        Self { orders, audit }
    }

    /// Execute the cancel order command
    pub async fn execute(
        &self,
        command: CancelOrderCommand,
        context: &OperationContext,
    ) -> AppResult<Order> {
        let auditor = self.audit.auditor_for(context);
        let order = self.orders.cancel_order(command.order_id, &auditor).await?;
        log_transition(&self.audit, &order, AuditAction::OrderCancelled, context);

        tracing::info!(order_id = %command.order_id, "Order cancelled");

        Ok(order)
    }
}

/// Log a transition the store has already committed
fn log_transition(
    audit: &AuditLogService,
    order: &Order,
    action: AuditAction,
    context: &OperationContext,
) {
    let builder = AuditLogBuilder::new(action)
        .resource_type(Order::aggregate_type())
        .after_state(order);
    let builder = match order.id() {
        Some(id) => builder.resource_id(id),
        None => builder,
    };
    audit.log(builder, context);
}
