//! Permission evaluator
//!
//! Answers "may this principal do X at this scope" against a role's grant
//! list. Evaluation is pure: no I/O, no shared state, no errors. A grant
//! that cannot be decoded, or a scope nothing matches, just yields `false`.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;

use crate::grant::{Grant, Scope};
use crate::level::{Level, LevelFlags, LevelSet};

/// Role name that bypasses every grant check
pub const SYSTEM_ADMIN_ROLE: &str = "system_admin";

/// Identity facts the evaluator needs about the caller
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    /// Role name, if the user has one
    #[serde(default)]
    pub role: Option<String>,
    /// Global override flag on the user record
    #[serde(default)]
    pub is_system_admin: bool,
}

impl Principal {
    pub fn with_role(role: impl Into<String>) -> Self {
        Self {
            role: Some(role.into()),
            is_system_admin: false,
        }
    }

    pub fn system_admin() -> Self {
        Self {
            role: None,
            is_system_admin: true,
        }
    }
}

/// How held levels satisfy a requested level
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LevelPolicy {
    /// A grant must list the requested level itself
    #[default]
    Literal,
    /// A held level also satisfies every lower level
    Hierarchical,
}

/// Anything that can be viewed as a decoded grant
///
/// Raw strings are decoded on each call; pre-decoded [`Grant`]s are used
/// as-is.
pub trait GrantRef {
    fn grant(&self) -> Cow<'_, Grant>;
}

impl GrantRef for Grant {
    fn grant(&self) -> Cow<'_, Grant> {
        Cow::Borrowed(self)
    }
}

impl GrantRef for str {
    fn grant(&self) -> Cow<'_, Grant> {
        Cow::Owned(Grant::decode(self))
    }
}

impl GrantRef for String {
    fn grant(&self) -> Cow<'_, Grant> {
        Cow::Owned(Grant::decode(self))
    }
}

impl<T: GrantRef + ?Sized> GrantRef for &T {
    fn grant(&self) -> Cow<'_, Grant> {
        (**self).grant()
    }
}

/// Configurable evaluator
///
/// The free functions in this module use `Evaluator::default()`: reserved
/// role [`SYSTEM_ADMIN_ROLE`] and [`LevelPolicy::Literal`].
///
/// # Example
///
/// ```rust
/// use portray_grants::{Evaluator, Level, LevelPolicy, Principal, Scope};
///
/// let grants = ["ports:manage"];
/// let ops = Principal::with_role("operations");
/// let scope = Scope::section("ports");
///
/// assert!(!Evaluator::default().has_exact_level(&grants, &ops, scope, Level::Read));
///
/// let evaluator = Evaluator::default().with_policy(LevelPolicy::Hierarchical);
/// assert!(evaluator.has_exact_level(&grants, &ops, scope, Level::Read));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluator {
    admin_role: Cow<'static, str>,
    policy: LevelPolicy,
}

impl Default for Evaluator {
    fn default() -> Self {
        Self {
            admin_role: Cow::Borrowed(SYSTEM_ADMIN_ROLE),
            policy: LevelPolicy::Literal,
        }
    }
}

impl Evaluator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the reserved admin role name
    pub fn with_admin_role(mut self, role: impl Into<Cow<'static, str>>) -> Self {
        self.admin_role = role.into();
        self
    }

    pub fn with_policy(mut self, policy: LevelPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn admin_role(&self) -> &str {
        &self.admin_role
    }

    pub fn policy(&self) -> LevelPolicy {
        self.policy
    }

    /// Admin override: the user flag or the reserved role name
    pub fn is_admin(&self, principal: &Principal) -> bool {
        principal.is_system_admin || principal.role.as_deref() == Some(self.admin_role())
    }

    /// Whether any grant covering `scope` confers `level`
    pub fn has_exact_level<G: GrantRef>(
        &self,
        grants: &[G],
        principal: &Principal,
        scope: Scope<'_>,
        level: Level,
    ) -> bool {
        if self.is_admin(principal) {
            return true;
        }
        self.matched_levels(grants, scope)
            .is_some_and(|held| self.effective(held).contains(level))
    }

    /// Per-level result over the union of grants covering `scope`
    pub fn levels_for<G: GrantRef>(
        &self,
        grants: &[G],
        principal: &Principal,
        scope: Scope<'_>,
    ) -> LevelFlags {
        if self.is_admin(principal) {
            return LevelFlags::all();
        }
        let held = self.matched_levels(grants, scope).unwrap_or_default();
        self.effective(held).flags()
    }

    /// Whether any grant covers `scope`, whatever levels it lists
    pub fn has_any_access<G: GrantRef>(
        &self,
        grants: &[G],
        principal: &Principal,
        scope: Scope<'_>,
    ) -> bool {
        self.is_admin(principal) || self.matched_levels(grants, scope).is_some()
    }

    /// Whether any grant sits under `section`, at section or subsection level
    pub fn has_access_in_section<G: GrantRef>(
        &self,
        grants: &[G],
        principal: &Principal,
        section: &str,
    ) -> bool {
        self.is_admin(principal) || grants.iter().any(|g| g.grant().within_section(section))
    }

    /// Union of the level sets of all grants covering `scope`, `None` when
    /// no grant covers it
    fn matched_levels<G: GrantRef>(&self, grants: &[G], scope: Scope<'_>) -> Option<LevelSet> {
        grants
            .iter()
            .map(GrantRef::grant)
            .filter(|grant| grant.matches(&scope))
            .fold(None, |acc: Option<LevelSet>, grant| {
                Some(acc.unwrap_or_default().union(&grant.levels))
            })
    }

    fn effective(&self, held: LevelSet) -> LevelSet {
        match self.policy {
            LevelPolicy::Literal => held,
            LevelPolicy::Hierarchical => held.with_implied(),
        }
    }
}

/// [`Evaluator::has_exact_level`] with default settings
pub fn has_exact_level<G: GrantRef>(
    grants: &[G],
    principal: &Principal,
    scope: Scope<'_>,
    level: Level,
) -> bool {
    Evaluator::default().has_exact_level(grants, principal, scope, level)
}

/// [`Evaluator::levels_for`] with default settings
pub fn levels_for<G: GrantRef>(grants: &[G], principal: &Principal, scope: Scope<'_>) -> LevelFlags {
    Evaluator::default().levels_for(grants, principal, scope)
}

/// [`Evaluator::has_any_access`] with default settings
pub fn has_any_access<G: GrantRef>(grants: &[G], principal: &Principal, scope: Scope<'_>) -> bool {
    Evaluator::default().has_any_access(grants, principal, scope)
}
