//! Permission levels and level sets

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::GrammarError;

/// Degree of access conferred at a scope
///
/// Levels are ordered `Read < Write < Manage`. The ordering is only
/// consulted by [`LevelPolicy::Hierarchical`](crate::LevelPolicy); grant
/// matching under the default policy is a literal membership test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Read,
    Write,
    Manage,
}

impl Level {
    /// All levels, lowest first
    pub const ALL: [Level; 3] = [Level::Read, Level::Write, Level::Manage];

    /// Wire name of the level
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Read => "read",
            Level::Write => "write",
            Level::Manage => "manage",
        }
    }

    /// Levels satisfied by holding this level under hierarchical evaluation
    ///
    /// ```rust
    /// use portray_grants::Level;
    ///
    /// assert_eq!(Level::Write.implied(), &[Level::Read, Level::Write]);
    /// ```
    pub fn implied(&self) -> &'static [Level] {
        match self {
            Level::Read => &[Level::Read],
            Level::Write => &[Level::Read, Level::Write],
            Level::Manage => &[Level::Read, Level::Write, Level::Manage],
        }
    }

    fn bit(self) -> u8 {
        match self {
            Level::Read => 0b001,
            Level::Write => 0b010,
            Level::Manage => 0b100,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Level {
    type Err = GrammarError;

    /// Exact, case-sensitive match on the wire names
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "read" => Ok(Level::Read),
            "write" => Ok(Level::Write),
            "manage" => Ok(Level::Manage),
            other => Err(GrammarError::UnknownLevel(other.to_string())),
        }
    }
}

/// Set of levels held at one scope
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct LevelSet(u8);

impl LevelSet {
    /// Empty set
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Set holding every level
    pub const fn all() -> Self {
        Self(0b111)
    }

    /// Decode a comma-separated level list, dropping tokens that are not
    /// exactly `read`, `write` or `manage`
    pub fn from_list(list: &str) -> Self {
        list.split(',')
            .filter_map(|token| token.parse::<Level>().ok())
            .collect()
    }

    /// Strict counterpart of [`LevelSet::from_list`]
    pub fn parse_list(list: &str) -> Result<Self, GrammarError> {
        if list.is_empty() {
            return Err(GrammarError::EmptyLevels);
        }
        list.split(',').map(str::parse::<Level>).collect()
    }

    pub fn insert(&mut self, level: Level) {
        self.0 |= level.bit();
    }

    pub fn contains(&self, level: Level) -> bool {
        self.0 & level.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn union(&self, other: &LevelSet) -> LevelSet {
        LevelSet(self.0 | other.0)
    }

    /// Close the set under [`Level::implied`]
    pub fn with_implied(&self) -> LevelSet {
        self.iter().flat_map(|l| l.implied().iter().copied()).collect()
    }

    /// Iterate members lowest first
    pub fn iter(&self) -> impl Iterator<Item = Level> + '_ {
        Level::ALL.into_iter().filter(|l| self.contains(*l))
    }

    /// Per-level membership flags
    pub fn flags(&self) -> LevelFlags {
        LevelFlags {
            read: self.contains(Level::Read),
            write: self.contains(Level::Write),
            manage: self.contains(Level::Manage),
        }
    }
}

impl FromIterator<Level> for LevelSet {
    fn from_iter<I: IntoIterator<Item = Level>>(iter: I) -> Self {
        let mut set = LevelSet::empty();
        for level in iter {
            set.insert(level);
        }
        set
    }
}

impl fmt::Display for LevelSet {
    /// Canonical comma-separated form, lowest level first
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for level in self.iter() {
            if !first {
                f.write_str(",")?;
            }
            f.write_str(level.as_str())?;
            first = false;
        }
        Ok(())
    }
}

/// One boolean per level, each computed independently
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelFlags {
    pub read: bool,
    pub write: bool,
    pub manage: bool,
}

impl LevelFlags {
    /// Every level granted
    pub const fn all() -> Self {
        Self {
            read: true,
            write: true,
            manage: true,
        }
    }

    pub fn get(&self, level: Level) -> bool {
        match level {
            Level::Read => self.read,
            Level::Write => self.write,
            Level::Manage => self.manage,
        }
    }

    pub fn any(&self) -> bool {
        self.read || self.write || self.manage
    }
}
