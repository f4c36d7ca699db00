//! Grant grammar
//!
//! A grant is stored on a role as a flat string:
//!
//! ```text
//! section:levels               ports:read,write
//! section:subsection:levels    ports:terminals:read,manage
//! ```
//!
//! `levels` is a comma-separated subset of `read`, `write`, `manage`.
//! `*` in the section or subsection position matches any name.
//!
//! Two decoders exist. [`Grant::decode`] is total and is what evaluation
//! uses: anything it cannot make sense of becomes a grant that matches
//! nothing. [`Grant::parse`] is strict and is meant for the moment a role
//! is created or edited, so bad data is rejected before it is stored.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::GrammarError;
use crate::level::{Level, LevelSet};

/// Matches any section or subsection name
pub const WILDCARD: &str = "*";

/// Decoded permission grant
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Grant {
    /// Top-level capability area, or `*`
    pub section: String,
    /// Nested capability area; `None` for section-level grants
    pub subsection: Option<String>,
    /// Levels conferred at this scope
    pub levels: LevelSet,
    unparseable: bool,
}

impl Grant {
    /// Section-level grant
    pub fn new(section: impl Into<String>, levels: impl IntoIterator<Item = Level>) -> Self {
        Self {
            section: section.into(),
            subsection: None,
            levels: levels.into_iter().collect(),
            unparseable: false,
        }
    }

    /// Narrow the grant to a subsection
    pub fn with_subsection(mut self, subsection: impl Into<String>) -> Self {
        self.subsection = Some(subsection.into());
        self
    }

    /// Grant that never matches anything
    pub fn unparseable() -> Self {
        Self {
            section: String::new(),
            subsection: None,
            levels: LevelSet::empty(),
            unparseable: true,
        }
    }

    /// Tolerant decoder used during evaluation
    ///
    /// Never fails. Two fields decode as `section:levels`, three as
    /// `section:subsection:levels`; any other field count yields
    /// [`Grant::unparseable`]. Unknown level tokens are dropped, so `"x:"`
    /// decodes to section `x` with no levels.
    ///
    /// ```rust
    /// use portray_grants::{Grant, Level};
    ///
    /// let grant = Grant::decode("ports:terminals:read,manage");
    /// assert_eq!(grant.section, "ports");
    /// assert_eq!(grant.subsection.as_deref(), Some("terminals"));
    /// assert!(grant.levels.contains(Level::Manage));
    ///
    /// assert!(Grant::decode("ports").is_unparseable());
    /// ```
    pub fn decode(raw: &str) -> Self {
        let fields: Vec<&str> = raw.split(':').collect();
        match fields.as_slice() {
            [section, levels] => Self {
                section: (*section).to_string(),
                subsection: None,
                levels: LevelSet::from_list(levels),
                unparseable: false,
            },
            [section, subsection, levels] => Self {
                section: (*section).to_string(),
                subsection: Some((*subsection).to_string()),
                levels: LevelSet::from_list(levels),
                unparseable: false,
            },
            _ => Self::unparseable(),
        }
    }

    /// Strict decoder for authoring
    pub fn parse(raw: &str) -> Result<Self, GrammarError> {
        let fields: Vec<&str> = raw.split(':').collect();
        let (section, subsection, levels) = match fields.as_slice() {
            [section, levels] => (*section, None, *levels),
            [section, subsection, levels] => (*section, Some(*subsection), *levels),
            other => return Err(GrammarError::FieldCount(other.len())),
        };

        if section.is_empty() {
            return Err(GrammarError::EmptySection);
        }
        if subsection == Some("") {
            return Err(GrammarError::EmptySubsection);
        }

        Ok(Self {
            section: section.to_string(),
            subsection: subsection.map(str::to_string),
            levels: LevelSet::parse_list(levels)?,
            unparseable: false,
        })
    }

    /// Canonical string form, levels ordered read, write, manage
    pub fn encode(&self) -> String {
        self.to_string()
    }

    /// Whether this grant came from a string [`Grant::decode`] could not read
    ///
    /// An empty section is still a decoded grant; it only matches requests
    /// for the empty section.
    pub fn is_unparseable(&self) -> bool {
        self.unparseable
    }

    /// Whether this grant covers the requested scope, ignoring levels
    ///
    /// A subsection request needs a grant carrying that subsection (or
    /// `*`). A section request needs a section-only grant. The two never
    /// cross.
    pub fn matches(&self, scope: &Scope<'_>) -> bool {
        if self.is_unparseable() || !name_matches(&self.section, scope.section) {
            return false;
        }
        match (scope.subsection, self.subsection.as_deref()) {
            (Some(requested), Some(held)) => name_matches(held, requested),
            (None, None) => true,
            _ => false,
        }
    }

    /// Whether this grant sits anywhere under `section`
    pub fn within_section(&self, section: &str) -> bool {
        !self.is_unparseable() && name_matches(&self.section, section)
    }
}

fn name_matches(held: &str, requested: &str) -> bool {
    held == WILDCARD || held == requested
}

impl fmt::Display for Grant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.subsection {
            Some(sub) => write!(f, "{}:{}:{}", self.section, sub, self.levels),
            None => write!(f, "{}:{}", self.section, self.levels),
        }
    }
}

impl FromStr for Grant {
    type Err = GrammarError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<Grant> for String {
    fn from(grant: Grant) -> Self {
        grant.encode()
    }
}

impl TryFrom<String> for Grant {
    type Error = GrammarError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

/// Scope named by an access request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Scope<'a> {
    pub section: &'a str,
    pub subsection: Option<&'a str>,
}

impl<'a> Scope<'a> {
    /// Section-level scope
    pub fn section(section: &'a str) -> Self {
        Self {
            section,
            subsection: None,
        }
    }

    /// Subsection-level scope
    pub fn subsection(section: &'a str, subsection: &'a str) -> Self {
        Self {
            section,
            subsection: Some(subsection),
        }
    }

    pub fn to_owned_scope(&self) -> ScopeBuf {
        ScopeBuf {
            section: self.section.to_string(),
            subsection: self.subsection.map(str::to_string),
        }
    }
}

impl fmt::Display for Scope<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.subsection {
            Some(sub) => write!(f, "{}:{}", self.section, sub),
            None => f.write_str(self.section),
        }
    }
}

/// Owned [`Scope`], for requirements declared ahead of time
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScopeBuf {
    pub section: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subsection: Option<String>,
}

impl ScopeBuf {
    pub fn as_scope(&self) -> Scope<'_> {
        Scope {
            section: &self.section,
            subsection: self.subsection.as_deref(),
        }
    }
}

impl fmt::Display for ScopeBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.as_scope(), f)
    }
}
