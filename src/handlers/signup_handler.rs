//! Sign-up Handler
//!
//! Registers members with a unique username.

use std::sync::Arc;

use crate::aggregate::{Aggregate, Member};
use crate::audit::{AuditAction, AuditLogBuilder, AuditLogService};
use crate::domain::{DomainError, OperationContext, PasswordHash};
use crate::error::{AppError, AppResult};
use crate::repository::{MemberRepository, RepositoryError};

use super::SignUpCommand;

/// Handler for member sign-up
#[derive(Clone)]
pub struct SignUpHandler {
    members: Arc<dyn MemberRepository>,
    audit: AuditLogService,
}

impl SignUpHandler {
    pub fn new(members: Arc<dyn MemberRepository>, audit: AuditLogService) -> Self {
        Self { members, audit }
    }

    /// Execute the sign-up command
    pub async fn execute(
        &self,
        command: SignUpCommand,
        context: &OperationContext,
    ) -> AppResult<Member> {
        let password = PasswordHash::hash(&command.password)?;
        let candidate = Member::register(command.username, password, command.name, command.address)?;
        self.register_member(candidate, context).await
    }

    /// Store a new member after checking the username is free.
    ///
    /// Two concurrent registrations can both pass the check; the store's
    /// uniqueness constraint rejects the second, reported the same way.
    pub async fn register_member(
        &self,
        mut candidate: Member,
        context: &OperationContext,
    ) -> AppResult<Member> {
        let username = candidate.username().to_string();

        if self.members.exists_by_username(&username).await? {
            tracing::warn!(username = %username, "Sign-up rejected: username already exists");
            return Err(DomainError::already_exists(username).into());
        }

        self.audit.stamp(&mut candidate, context);
        let member = match self.members.save(candidate).await {
            Ok(member) => member,
            Err(RepositoryError::UniqueViolation(_)) => {
                tracing::warn!(username = %username, "Sign-up lost race on username");
                return Err(DomainError::already_exists(username).into());
            }
            Err(e) => return Err(e.into()),
        };

        let member_id = member
            .id()
            .ok_or_else(|| AppError::Internal("saved member has no id".to_string()))?;
        self.audit.log(
            AuditLogBuilder::new(AuditAction::MemberRegistered)
                .resource_type(Member::aggregate_type())
                .resource_id(member_id)
                .after_state(&member),
            context,
        );

        tracing::info!(
            member_id = %member_id,
            username = %member.username(),
            "Member registered"
        );

        Ok(member)
    }
}
