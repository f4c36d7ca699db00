//! portray-guard: request gating for PortRay permissions
//!
//! Wraps the pure evaluator from `portray-grants` with what a request
//! pipeline needs around it:
//!
//! - [`store`]: where role grant lists live
//! - [`context`]: the current user's grants, resolved once per request
//! - [`guard`]: allow/deny with 401/403 semantics, role mutations
//! - [`audit`]: record of decisions and role changes
//! - [`config`]: builder, settings file, presets
//!
//! ```rust
//! use portray_grants::Level;
//! use portray_guard::{AccessGuard, GuardConfigBuilder, MemoryRoleStore, Requirement, User};
//!
//! let store = MemoryRoleStore::with_roles([("operations", ["ports:read,write"])]).unwrap();
//! let guard = AccessGuard::new(GuardConfigBuilder::new().store(store).build().unwrap());
//!
//! let user = User::new("u-1").with_role("operations");
//! assert!(guard.check(Some(&user), &Requirement::new("ports", Level::Write)).is_ok());
//!
//! let err = guard.check(Some(&user), &Requirement::new("ports", Level::Manage)).unwrap_err();
//! assert_eq!(err.status_code(), 403);
//! ```

pub mod audit;
pub mod config;
pub mod context;
pub mod guard;
pub mod store;
pub mod user;

pub use audit::{
    AuditError, AuditEvent, AuditEventType, AuditSink, CompositeAuditSink, FileAuditSink,
    MemoryAuditSink, NullAuditSink,
};
pub use config::{ConfigError, GuardConfig, GuardConfigBuilder, GuardPresets, GuardSettings};
pub use context::{AccessContext, ScopeCapability};
pub use guard::{AccessGuard, GuardError, Requirement};
pub use store::{
    FileRoleStore, MemoryRoleStore, ReadOnlyRoleStore, RoleRecord, RoleStore, StoreError,
};
pub use user::User;
