//! Per-request access context
//!
//! Resolved once per request or render from the authenticated user and
//! the role store, then passed explicitly to whatever needs to ask
//! permission questions. Grants are decoded once at resolution time.

use portray_grants::{Evaluator, Grant, Level, LevelFlags, Principal, Scope, ScopeBuf};
use serde::Serialize;

use crate::store::{RoleStore, StoreError};
use crate::user::User;

/// A user's principal and decoded grants
#[derive(Debug, Clone)]
pub struct AccessContext {
    user_id: String,
    principal: Principal,
    grants: Vec<Grant>,
    evaluator: Evaluator,
}

impl AccessContext {
    /// Resolve the grants for `user`
    ///
    /// Admins skip the store lookup since their grants are never consulted.
    /// A role missing from the store resolves to no grants.
    pub fn resolve(
        user: &User,
        store: &dyn RoleStore,
        evaluator: &Evaluator,
    ) -> Result<Self, StoreError> {
        let principal = user.principal();

        let grants = match principal.role.as_deref() {
            _ if evaluator.is_admin(&principal) => Vec::new(),
            Some(role) => {
                let grants = store.grants_for(role)?;
                if grants.is_empty() {
                    tracing::debug!(user = %user.id, role = %role, "Role has no grants");
                }
                grants
            }
            None => Vec::new(),
        };

        Ok(Self::from_parts(&user.id, principal, grants, evaluator.clone()))
    }

    /// Build a context from already-resolved parts
    pub fn from_parts(
        user_id: impl Into<String>,
        principal: Principal,
        grants: Vec<Grant>,
        evaluator: Evaluator,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            principal,
            grants,
            evaluator,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    pub fn grants(&self) -> &[Grant] {
        &self.grants
    }

    pub fn is_admin(&self) -> bool {
        self.evaluator.is_admin(&self.principal)
    }

    /// Whether the user holds `level` at `scope`
    pub fn can(&self, scope: Scope<'_>, level: Level) -> bool {
        self.evaluator
            .has_exact_level(&self.grants, &self.principal, scope, level)
    }

    /// Per-level flags at `scope`
    pub fn levels(&self, scope: Scope<'_>) -> LevelFlags {
        self.evaluator.levels_for(&self.grants, &self.principal, scope)
    }

    /// Whether a control for `scope` should be shown at all
    pub fn is_visible(&self, scope: Scope<'_>) -> bool {
        self.evaluator
            .has_any_access(&self.grants, &self.principal, scope)
    }

    /// Whether a navigation entry for `section` has anything under it
    pub fn is_section_visible(&self, section: &str) -> bool {
        self.evaluator
            .has_access_in_section(&self.grants, &self.principal, section)
    }

    /// Capability snapshot for a set of scopes, for UI consumers
    pub fn capabilities(&self, scopes: &[ScopeBuf]) -> Vec<ScopeCapability> {
        scopes
            .iter()
            .map(|scope| ScopeCapability {
                scope: scope.clone(),
                visible: self.is_visible(scope.as_scope()),
                levels: self.levels(scope.as_scope()),
            })
            .collect()
    }
}

/// What the UI may render for one scope
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScopeCapability {
    #[serde(flatten)]
    pub scope: ScopeBuf,
    pub visible: bool,
    pub levels: LevelFlags,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{compute_grants_hash, MemoryRoleStore, RoleRecord};

    fn store() -> MemoryRoleStore {
        let store = MemoryRoleStore::with_roles([(
            "operations",
            ["ports:read,write", "ports:terminals:read,manage"],
        )])
        .unwrap();

        // Empty level lists only arrive from legacy data, never via RoleRecord::new
        let legacy = vec!["contracts:".to_string()];
        store
            .set(RoleRecord {
                name: "auditor".into(),
                grants_hash: compute_grants_hash(&legacy),
                grants: legacy,
                updated_at: chrono::Utc::now(),
            })
            .unwrap();
        store
    }

    #[test]
    fn test_resolve_and_query() {
        let user = User::new("u-1").with_role("operations");
        let ctx = AccessContext::resolve(&user, &store(), &Evaluator::default()).unwrap();

        assert_eq!(ctx.grants().len(), 2);
        assert!(ctx.can(Scope::section("ports"), Level::Write));
        assert!(!ctx.can(Scope::section("ports"), Level::Manage));
        assert!(ctx.can(Scope::subsection("ports", "terminals"), Level::Manage));
        assert!(!ctx.is_visible(Scope::section("customers")));
        assert!(ctx.is_section_visible("ports"));
    }

    #[test]
    fn test_unknown_role_holds_nothing() {
        let user = User::new("u-2").with_role("ghost");
        let ctx = AccessContext::resolve(&user, &store(), &Evaluator::default()).unwrap();

        assert!(ctx.grants().is_empty());
        assert!(!ctx.is_visible(Scope::section("ports")));
    }

    #[test]
    fn test_admin_skips_grants() {
        let user = User::new("root").with_role("operations").system_admin();
        let ctx = AccessContext::resolve(&user, &store(), &Evaluator::default()).unwrap();

        assert!(ctx.is_admin());
        assert!(ctx.grants().is_empty());
        assert!(ctx.can(Scope::subsection("users", "invites"), Level::Manage));
    }

    #[test]
    fn test_empty_level_grant_is_visible_but_grants_nothing() {
        let user = User::new("u-3").with_role("auditor");
        let ctx = AccessContext::resolve(&user, &store(), &Evaluator::default()).unwrap();
        let scope = Scope::section("contracts");

        assert!(ctx.is_visible(scope));
        assert!(!ctx.can(scope, Level::Read));
    }

    #[test]
    fn test_capabilities_snapshot() {
        let user = User::new("u-1").with_role("operations");
        let ctx = AccessContext::resolve(&user, &store(), &Evaluator::default()).unwrap();

        let caps = ctx.capabilities(&[
            Scope::section("ports").to_owned_scope(),
            Scope::subsection("ports", "terminals").to_owned_scope(),
        ]);

        assert!(caps[0].visible);
        assert!(caps[0].levels.write && !caps[0].levels.manage);
        assert!(caps[1].levels.manage && !caps[1].levels.write);

        let json = serde_json::to_value(&caps[1]).unwrap();
        assert_eq!(json["section"], "ports");
        assert_eq!(json["subsection"], "terminals");
        assert_eq!(json["levels"]["manage"], true);
    }
}
