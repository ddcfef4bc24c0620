//! Audit Log Service
//!
//! Stamps who created and last modified an entity, and records business
//! actions as structured `tracing` events on the `audit` target. Retention is
//! left to whatever subscriber collects that target.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::net::IpAddr;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::{Auditable, OperationContext};

/// Auditor recorded when no principal is known
pub const ANONYMOUS_AUDITOR: &str = "anonymous";

// =========================================================================
// Auditor lookup
// =========================================================================

/// Supplies the acting principal for audit fields
pub trait AuditorAware: Debug + Send + Sync {
    fn current_auditor(&self, context: &OperationContext) -> Option<String>;
}

/// Uses the username of the logged-in principal carried by the request
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggedInUsernameAuditor;

impl AuditorAware for LoggedInUsernameAuditor {
    fn current_auditor(&self, context: &OperationContext) -> Option<String> {
        context
            .principal
            .as_deref()
            .map(str::trim)
            .filter(|principal| !principal.is_empty())
            .map(str::to_string)
    }
}

// =========================================================================
// Entries
// =========================================================================

/// Audit action types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditAction {
    MemberRegistered,
    ItemRegistered,
    CategoryAttached,
    OrderCreated,
    OrderPlaced,
    OrderCancelled,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::MemberRegistered => "member.registered",
            AuditAction::ItemRegistered => "item.registered",
            AuditAction::CategoryAttached => "category.attached",
            AuditAction::OrderCreated => "order.created",
            AuditAction::OrderPlaced => "order.placed",
            AuditAction::OrderCancelled => "order.cancelled",
        }
    }
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Recorded audit log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: Uuid,
    pub auditor: String,
    pub correlation_id: Option<Uuid>,
    pub action: String,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    pub after_state: Option<serde_json::Value>,
    pub client_ip: Option<IpAddr>,
    pub created_at: DateTime<Utc>,
}

/// Builder for creating audit log entries
#[derive(Debug, Clone)]
pub struct AuditLogBuilder {
    action: String,
    resource_type: Option<String>,
    resource_id: Option<String>,
    after_state: Option<serde_json::Value>,
}

impl AuditLogBuilder {
    pub fn new(action: AuditAction) -> Self {
        Self {
            action: action.as_str().to_string(),
            resource_type: None,
            resource_id: None,
            after_state: None,
        }
    }

    pub fn resource_type(mut self, resource_type: &str) -> Self {
        self.resource_type = Some(resource_type.to_string());
        self
    }

    pub fn resource_id(mut self, resource_id: impl ToString) -> Self {
        self.resource_id = Some(resource_id.to_string());
        self
    }

    /// Snapshot of the resource after the action
    pub fn after_state<T: Serialize>(mut self, state: &T) -> Self {
        self.after_state = serde_json::to_value(state).ok();
        self
    }
}

// =========================================================================
// Service
// =========================================================================

/// Audit Log Service
#[derive(Debug, Clone)]
pub struct AuditLogService {
    auditor: Arc<dyn AuditorAware>,
}

impl Default for AuditLogService {
    fn default() -> Self {
        Self::new(Arc::new(LoggedInUsernameAuditor))
    }
}

impl AuditLogService {
    pub fn new(auditor: Arc<dyn AuditorAware>) -> Self {
        Self { auditor }
    }

    /// The acting principal, or [`ANONYMOUS_AUDITOR`]
    pub fn auditor_for(&self, context: &OperationContext) -> String {
        self.auditor
            .current_auditor(context)
            .unwrap_or_else(|| ANONYMOUS_AUDITOR.to_string())
    }

    /// Fill the entity's audit fields for a save made now
    pub fn stamp<T: Auditable>(&self, entity: &mut T, context: &OperationContext) {
        let auditor = self.auditor_for(context);
        entity.audit_fields_mut().touch(&auditor, Utc::now());
    }

    /// Record an action and emit it on the `audit` target
    pub fn log(&self, builder: AuditLogBuilder, context: &OperationContext) -> AuditLogEntry {
        let entry = AuditLogEntry {
            id: Uuid::new_v4(),
            auditor: self.auditor_for(context),
            correlation_id: context.correlation_id,
            action: builder.action,
            resource_type: builder.resource_type,
            resource_id: builder.resource_id,
            after_state: builder.after_state,
            client_ip: context.client_ip,
            created_at: Utc::now(),
        };

        tracing::info!(
            target: "audit",
            audit_id = %entry.id,
            action = %entry.action,
            auditor = %entry.auditor,
            resource_type = entry.resource_type.as_deref().unwrap_or_default(),
            resource_id = entry.resource_id.as_deref().unwrap_or_default(),
            correlation_id = ?entry.correlation_id,
            client_ip = ?entry.client_ip,
            after_state = %entry
                .after_state
                .as_ref()
                .map(|state| state.to_string())
                .unwrap_or_default(),
            "Audit log entry created"
        );

        entry
    }
}

// =========================================================================
// Tests
// =========================================================================
