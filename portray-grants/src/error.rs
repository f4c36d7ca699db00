//! Grammar errors
//!
//! Only raised by the strict parsers used when grants are authored.
//! Evaluation never fails: malformed grants simply match nothing.

use thiserror::Error;

/// Reason a grant or requirement string was rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GrammarError {
    #[error("Expected 2 or 3 ':'-separated fields, found {0}")]
    FieldCount(usize),

    #[error("Section must not be empty")]
    EmptySection,

    #[error("Subsection must not be empty")]
    EmptySubsection,

    #[error("Level list must not be empty")]
    EmptyLevels,

    #[error("Unknown permission level: '{0}'")]
    UnknownLevel(String),

    #[error("Requirement must name exactly one level, found '{0}'")]
    MultipleLevels(String),
}
