//! portray-grants: permission grammar and evaluator for PortRay
//!
//! Roles carry a list of grant strings such as `ports:read,write` or
//! `ports:terminals:read,manage`. This crate decodes those strings and
//! answers access questions against them. It performs no I/O; callers
//! resolve the current user and role once and pass them in.
//!
//! ```rust
//! use portray_grants::{has_exact_level, levels_for, Level, Principal, Scope};
//!
//! let grants = ["ports:read,write", "ports:terminals:read,manage"];
//! let user = Principal::with_role("harbour-master");
//!
//! assert!(has_exact_level(&grants, &user, Scope::section("ports"), Level::Write));
//! assert!(!has_exact_level(&grants, &user, Scope::section("ports"), Level::Manage));
//!
//! let flags = levels_for(&grants, &user, Scope::subsection("ports", "terminals"));
//! assert!(flags.read && flags.manage && !flags.write);
//! ```

pub mod error;
pub mod evaluator;
pub mod grant;
pub mod level;

pub use error::GrammarError;
pub use evaluator::{
    has_any_access, has_exact_level, levels_for, Evaluator, GrantRef, LevelPolicy, Principal,
    SYSTEM_ADMIN_ROLE,
};
pub use grant::{Grant, Scope, ScopeBuf, WILDCARD};
pub use level::{Level, LevelFlags, LevelSet};
