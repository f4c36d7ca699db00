//! # portray
//!
//! Operator tooling for PortRay permissions: the `portray` CLI and its
//! logging setup. The grammar and evaluator live in `portray-grants`, the
//! request guard and role storage in `portray-guard`; both are re-exported
//! here.
//!
//! ```rust
//! use portray::commands::decode;
//!
//! let report = decode("ports:terminals:read,manage");
//! assert!(report.parseable);
//! assert!(report.levels.manage);
//! assert!(!report.levels.write);
//! ```

pub mod commands;
pub mod tracing_support;

pub use portray_grants as grants;
pub use portray_guard as guard;

pub use tracing_support::{
    init_subscriber, init_subscriber_with_config, TracingConfig, TracingFormat,
};
