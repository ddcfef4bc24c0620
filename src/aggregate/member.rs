//! Member Aggregate
//!
//! Shop account: credentials, profile name and home address.

use serde::Serialize;

use crate::domain::{Address, AuditFields, Auditable, DomainError, MemberId, PasswordHash};

use super::Aggregate;

/// Maximum username length
const MAX_USERNAME_LEN: usize = 50;

/// Member Aggregate
///
/// The username is unique across members. The store enforces it; sign-up
/// checks it first so the caller gets a clear error.
#[derive(Debug, Clone, Serialize)]
pub struct Member {
    id: Option<MemberId>,
    username: String,
    #[serde(skip_serializing)]
    password: PasswordHash,
    name: String,
    address: Option<Address>,
    audit: AuditFields,
}

impl Member {
    /// Build a new, unsaved member after validating the username and name
    pub fn register(
        username: impl Into<String>,
        password: PasswordHash,
        name: impl Into<String>,
        address: Option<Address>,
    ) -> Result<Self, DomainError> {
        let username = username.into().trim().to_string();
        let name = name.into();

        if username.is_empty() {
            return Err(DomainError::validation("username", "must not be empty"));
        }
        if username.chars().count() > MAX_USERNAME_LEN {
            return Err(DomainError::validation(
                "username",
                format!("must be at most {} characters", MAX_USERNAME_LEN),
            ));
        }
        if username.chars().any(char::is_whitespace) {
            return Err(DomainError::validation("username", "must not contain whitespace"));
        }
        if name.trim().is_empty() {
            return Err(DomainError::validation("name", "must not be empty"));
        }

        Ok(Self {
            id: None,
            username,
            password,
            name,
            address,
            audit: AuditFields::default(),
        })
    }

    /// Rebuild a member from stored state
    pub fn from_db_state(
        id: MemberId,
        username: String,
        password: PasswordHash,
        name: String,
        address: Option<Address>,
        audit: AuditFields,
    ) -> Self {
        Self {
            id: Some(id),
            username,
            password,
            name,
            address,
            audit,
        }
    }

    /// Replace the profile name and address
    pub fn update_profile(
        &mut self,
        name: impl Into<String>,
        address: Option<Address>,
    ) -> Result<(), DomainError> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DomainError::validation("name", "must not be empty"));
        }
        self.name = name;
        self.address = address;
        Ok(())
    }

    pub fn check_password(&self, raw: &str) -> bool {
        self.password.verify(raw)
    }

    // =========================================================================
    // Getters
    // =========================================================================

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &PasswordHash {
        &self.password
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> Option<&Address> {
        self.address.as_ref()
    }
}

impl Aggregate for Member {
    type Id = MemberId;

    fn aggregate_type() -> &'static str {
        "Member"
    }

    fn id(&self) -> Option<MemberId> {
        self.id
    }

    fn assign_id(&mut self, id: MemberId) {
        self.id = Some(id);
    }
}

impl Auditable for Member {
    fn audit_fields(&self) -> &AuditFields {
        &self.audit
    }

    fn audit_fields_mut(&mut self) -> &mut AuditFields {
        &mut self.audit
    }
}
