//! Audit fields carried by persisted entities.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who created and last modified an entity, and when.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditFields {
    pub created_by: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub last_modified_by: Option<String>,
    pub last_modified_at: Option<DateTime<Utc>>,
}

impl AuditFields {
    /// Record a modification; the first one also fills the creation fields.
    pub fn touch(&mut self, auditor: &str, at: DateTime<Utc>) {
        if self.created_at.is_none() {
            self.created_by = Some(auditor.to_string());
            self.created_at = Some(at);
        }
        self.last_modified_by = Some(auditor.to_string());
        self.last_modified_at = Some(at);
    }
}

/// Entities that carry [`AuditFields`].
pub trait Auditable {
    fn audit_fields(&self) -> &AuditFields;

    fn audit_fields_mut(&mut self) -> &mut AuditFields;
}
