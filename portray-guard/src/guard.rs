//! Request gating
//!
//! [`AccessGuard`] is what an HTTP layer calls before running a guarded
//! handler. It does not know about any web framework: a failed check comes
//! back as a [`GuardError`] carrying the status code to respond with.
//!
//! | Outcome | Status |
//! |---------|--------|
//! | No authenticated user | 401 |
//! | User lacks the required level | 403 |
//! | Role to remove does not exist | 404 |
//! | Role store could not be read | 500 |
//!
//! Role edits go through the same check: the actor must meet the
//! configured role-admin requirement (`roles:manage` by default).

use portray_grants::{GrammarError, Grant, Level, Scope, ScopeBuf};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

use crate::audit::{self, AuditEvent};
use crate::config::GuardConfig;
use crate::context::AccessContext;
use crate::store::{RoleRecord, RoleStore, StoreError};
use crate::user::User;

/// Level a guarded operation requires at a scope
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Requirement {
    pub scope: ScopeBuf,
    pub level: Level,
}

impl Requirement {
    pub fn new(section: impl Into<String>, level: Level) -> Self {
        Self {
            scope: ScopeBuf {
                section: section.into(),
                subsection: None,
            },
            level,
        }
    }

    pub fn with_subsection(mut self, subsection: impl Into<String>) -> Self {
        self.scope.subsection = Some(subsection.into());
        self
    }

    /// Parse `section[:subsection]:level`
    ///
    /// Uses the strict grant grammar and additionally requires exactly one
    /// level.
    ///
    /// ```rust
    /// use portray_grants::Level;
    /// use portray_guard::Requirement;
    ///
    /// let req = Requirement::parse("ports:terminals:manage").unwrap();
    /// assert_eq!(req.level, Level::Manage);
    /// assert!(Requirement::parse("ports:read,write").is_err());
    /// ```
    pub fn parse(raw: &str) -> Result<Self, GrammarError> {
        let grant = Grant::parse(raw)?;
        let mut levels = grant.levels.iter();
        match (levels.next(), levels.next()) {
            (Some(level), None) => Ok(Self {
                scope: ScopeBuf {
                    section: grant.section,
                    subsection: grant.subsection,
                },
                level,
            }),
            _ => Err(GrammarError::MultipleLevels(raw.to_string())),
        }
    }

    pub fn scope(&self) -> Scope<'_> {
        self.scope.as_scope()
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.scope, self.level)
    }
}

impl FromStr for Requirement {
    type Err = GrammarError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Why a guarded request may not proceed
#[derive(Debug, Error)]
pub enum GuardError {
    #[error("Authentication required")]
    Unauthenticated,

    #[error("Forbidden: '{level}' access to '{scope}' is required")]
    Forbidden { scope: ScopeBuf, level: Level },

    #[error("Role not found: {0}")]
    RoleNotFound(String),

    #[error("Role store failure: {0}")]
    Store(#[from] StoreError),
}

impl GuardError {
    /// HTTP status the boundary layer should answer with
    pub fn status_code(&self) -> u16 {
        match self {
            GuardError::Unauthenticated => 401,
            GuardError::Forbidden { .. } => 403,
            GuardError::RoleNotFound(_) => 404,
            GuardError::Store(_) => 500,
        }
    }

    /// Whether the request was refused, as opposed to failing
    pub fn is_denial(&self) -> bool {
        matches!(
            self,
            GuardError::Unauthenticated | GuardError::Forbidden { .. }
        )
    }
}

/// Gate for guarded operations
#[derive(Clone)]
pub struct AccessGuard {
    config: Arc<GuardConfig>,
}

impl AccessGuard {
    pub fn new(config: GuardConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    pub fn store(&self) -> &dyn RoleStore {
        self.config.store.as_ref()
    }

    /// Resolve the access context for an authenticated user
    pub fn resolve(&self, user: &User) -> Result<AccessContext, GuardError> {
        Ok(AccessContext::resolve(
            user,
            self.store(),
            &self.config.evaluator,
        )?)
    }

    /// Check `requirement` for the current user
    ///
    /// On success the resolved context is returned so the handler can ask
    /// further questions without touching the store again.
    pub fn check(
        &self,
        user: Option<&User>,
        requirement: &Requirement,
    ) -> Result<AccessContext, GuardError> {
        let Some(user) = user else {
            tracing::warn!(requirement = %requirement, "Rejected unauthenticated request");
            self.record(audit::unauthenticated(requirement));
            return Err(GuardError::Unauthenticated);
        };

        let ctx = self.resolve(user)?;

        if ctx.can(requirement.scope(), requirement.level) {
            tracing::debug!(
                user = %user.id,
                requirement = %requirement,
                admin = ctx.is_admin(),
                "Access granted"
            );
            self.record(audit::access_granted(&user.id, requirement, ctx.is_admin()));
            return Ok(ctx);
        }

        let reason = if ctx.is_visible(requirement.scope()) {
            "level not granted"
        } else {
            "no grant for scope"
        };
        tracing::warn!(
            user = %user.id,
            role = user.role.as_deref().unwrap_or("-"),
            requirement = %requirement,
            reason,
            "Access denied"
        );
        self.record(audit::access_denied(&user.id, requirement, reason));

        Err(GuardError::Forbidden {
            scope: requirement.scope.clone(),
            level: requirement.level,
        })
    }

    /// Create or replace a role on behalf of `actor`
    ///
    /// The actor must meet the role-admin requirement. Unchanged grant
    /// lists are not written.
    pub fn save_role(&self, actor: &User, role: RoleRecord) -> Result<(), GuardError> {
        self.check(Some(actor), &self.config.role_admin)?;

        let previous = self.store().get(&role.name)?;
        if let Some(prev) = &previous {
            if !prev.has_changed(&role.grants) {
                tracing::debug!(role = %role.name, "Role grants unchanged");
                return Ok(());
            }
        }

        let event = audit::role_saved(
            &actor.id,
            &role.name,
            previous.as_ref().map(|p| p.grants_hash.as_str()),
            &role.grants_hash,
            role.grants.len(),
        );
        let (name, grant_count) = (role.name.clone(), role.grants.len());

        self.store().set(role)?;
        tracing::info!(role = %name, actor = %actor.id, grants = grant_count, "Role saved");
        self.record(event);
        Ok(())
    }

    /// Delete a role on behalf of `actor`
    pub fn remove_role(&self, actor: &User, name: &str) -> Result<(), GuardError> {
        self.check(Some(actor), &self.config.role_admin)?;

        let existing = self
            .store()
            .get(name)?
            .ok_or_else(|| GuardError::RoleNotFound(name.to_string()))?;

        self.store().remove(name)?;
        tracing::info!(role = %name, actor = %actor.id, "Role removed");
        self.record(audit::role_removed(&actor.id, name, &existing.grants_hash));
        Ok(())
    }

    fn record(&self, event: AuditEvent) {
        if let Err(e) = self.config.audit.record(event) {
            tracing::warn!(error = %e, "Failed to record audit event");
        }
    }

    /// Flush buffered audit events
    pub fn flush_audit(&self) {
        if let Err(e) = self.config.audit.flush() {
            tracing::warn!(error = %e, "Failed to flush audit sink");
        }
    }
}

impl fmt::Debug for AccessGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessGuard")
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{AuditEventType, MemoryAuditSink};
    use crate::config::GuardConfigBuilder;
    use crate::store::MemoryRoleStore;

    fn guard_with(audit: Arc<MemoryAuditSink>) -> AccessGuard {
        let store = MemoryRoleStore::with_roles([
            ("operations", vec!["ports:read,write", "ports:terminals:read"]),
            ("finance", vec!["contracts:read"]),
            ("clerk", vec!["ports:read"]),
            ("access_admin", vec!["roles:manage"]),
        ])
        .unwrap();

        let config = GuardConfigBuilder::new()
            .store(store)
            .shared_audit(audit)
            .build()
            .unwrap();
        AccessGuard::new(config)
    }

    #[test]
    fn test_requirement_parse() {
        let req = Requirement::parse("ports:write").unwrap();
        assert_eq!(req, Requirement::new("ports", Level::Write));
        assert_eq!(req.to_string(), "ports:write");

        let req: Requirement = "ports:terminals:read".parse().unwrap();
        assert_eq!(req.scope.subsection.as_deref(), Some("terminals"));

        assert!(matches!(
            Requirement::parse("ports:read,write"),
            Err(GrammarError::MultipleLevels(_))
        ));
        assert!(Requirement::parse("ports").is_err());
        assert!(Requirement::parse("ports:").is_err());
    }

    #[test]
    fn test_unauthenticated_is_401() {
        let audit = Arc::new(MemoryAuditSink::new());
        let guard = guard_with(audit.clone());

        let err = guard
            .check(None, &Requirement::new("ports", Level::Read))
            .unwrap_err();
        assert!(matches!(err, GuardError::Unauthenticated));
        assert_eq!(err.status_code(), 401);
        assert_eq!(audit.find_by_type(AuditEventType::Unauthenticated).len(), 1);
    }

    #[test]
    fn test_denied_is_403_with_message() {
        let audit = Arc::new(MemoryAuditSink::new());
        let guard = guard_with(audit.clone());
        let user = User::new("u-1").with_role("operations");

        let req = Requirement::new("ports", Level::Manage);
        let err = guard.check(Some(&user), &req).unwrap_err();

        assert_eq!(err.status_code(), 403);
        assert!(err.is_denial());
        assert_eq!(
            err.to_string(),
            "Forbidden: 'manage' access to 'ports' is required"
        );

        let denied = audit.find_by_type(AuditEventType::AccessDenied);
        assert_eq!(denied.len(), 1);
        assert_eq!(denied[0].user.as_deref(), Some("u-1"));
    }

    #[test]
    fn test_granted_returns_context() {
        let audit = Arc::new(MemoryAuditSink::new());
        let guard = guard_with(audit.clone());
        let user = User::new("u-1").with_role("operations");

        let ctx = guard
            .check(Some(&user), &Requirement::new("ports", Level::Write))
            .unwrap();
        assert!(ctx.can(Scope::subsection("ports", "terminals"), Level::Read));
        assert_eq!(audit.find_by_type(AuditEventType::AccessGranted).len(), 1);
    }

    #[test]
    fn test_admin_passes_without_role() {
        let audit = Arc::new(MemoryAuditSink::new());
        let guard = guard_with(audit);
        let admin = User::new("root").system_admin();

        let req = Requirement::new("users", Level::Manage).with_subsection("invites");
        assert!(guard.check(Some(&admin), &req).is_ok());
    }

    #[test]
    fn test_save_role_records_change_once() {
        let audit = Arc::new(MemoryAuditSink::new());
        let guard = guard_with(audit.clone());
        let admin = User::new("root").system_admin();

        let role = RoleRecord::new("finance", ["contracts:read,write"]).unwrap();
        guard.save_role(&admin, role.clone()).unwrap();
        guard.save_role(&admin, role).unwrap();

        let saved = audit.find_by_type(AuditEventType::RoleSaved);
        assert_eq!(saved.len(), 1);

        let clerk = User::new("u-5").with_role("finance");
        assert!(guard
            .check(Some(&clerk), &Requirement::new("contracts", Level::Write))
            .is_ok());
    }

    #[test]
    fn test_remove_role() {
        let audit = Arc::new(MemoryAuditSink::new());
        let guard = guard_with(audit.clone());
        let admin = User::new("root").system_admin();

        guard.remove_role(&admin, "finance").unwrap();
        let err = guard.remove_role(&admin, "finance").unwrap_err();
        assert!(matches!(err, GuardError::RoleNotFound(ref name) if name == "finance"));
        assert_eq!(err.status_code(), 404);
        assert_eq!(err.to_string(), "Role not found: finance");
        assert!(!err.is_denial());
        assert_eq!(audit.find_by_type(AuditEventType::RoleRemoved).len(), 1);

        let clerk = User::new("u-5").with_role("finance");
        let err = guard
            .check(Some(&clerk), &Requirement::new("contracts", Level::Read))
            .unwrap_err();
        assert_eq!(err.status_code(), 403);
    }

    #[test]
    fn test_role_edits_require_role_admin() {
        let audit = Arc::new(MemoryAuditSink::new());
        let guard = guard_with(audit.clone());
        let clerk = User::new("u-7").with_role("clerk");

        let escalation =
            RoleRecord::new("clerk", ["*:*:read,write,manage", "*:read,write,manage"]).unwrap();
        let err = guard.save_role(&clerk, escalation).unwrap_err();
        assert_eq!(err.status_code(), 403);
        assert_eq!(
            err.to_string(),
            "Forbidden: 'manage' access to 'roles' is required"
        );

        let err = guard.remove_role(&clerk, "finance").unwrap_err();
        assert_eq!(err.status_code(), 403);

        // Nothing was written
        let invites = Requirement::new("users", Level::Manage).with_subsection("invites");
        assert!(guard.check(Some(&clerk), &invites).is_err());
        assert!(guard.store().get("finance").unwrap().is_some());
        assert!(audit.find_by_type(AuditEventType::RoleSaved).is_empty());
        assert!(audit.find_by_type(AuditEventType::RoleRemoved).is_empty());
    }

    #[test]
    fn test_role_admin_grant_allows_edits() {
        let audit = Arc::new(MemoryAuditSink::new());
        let guard = guard_with(audit.clone());
        let editor = User::new("u-8").with_role("access_admin");

        guard
            .save_role(&editor, RoleRecord::new("clerk", ["ports:read,write"]).unwrap())
            .unwrap();
        let saved = audit.find_by_type(AuditEventType::RoleSaved);
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].user.as_deref(), Some("u-8"));

        let clerk = User::new("u-7").with_role("clerk");
        assert!(guard
            .check(Some(&clerk), &Requirement::new("ports", Level::Write))
            .is_ok());
    }
}
