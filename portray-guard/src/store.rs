//! Role storage
//!
//! Roles are the only persistent input to permission evaluation. The
//! store trait keeps the guard independent of where roles live; the
//! provided implementations cover a JSON file, memory, and a read-only
//! wrapper.

use chrono::{DateTime, Utc};
use portray_grants::{Grant, GrammarError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use thiserror::Error;

/// Error type for role store operations
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Failed to read role store: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse role store: {0}")]
    ParseError(#[from] serde_json::Error),

    #[error("Invalid grant '{grant}': {source}")]
    InvalidGrant {
        grant: String,
        #[source]
        source: GrammarError,
    },

    #[error("Role not found: {0}")]
    NotFound(String),

    #[error("Store is read-only")]
    ReadOnly,

    #[error("Role store lock poisoned")]
    Poisoned,
}

/// Stored role with its grant strings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleRecord {
    /// Role name, referenced by users
    pub name: String,
    /// Grant strings as authored
    pub grants: Vec<String>,
    /// Digest of the canonical grant list
    pub grants_hash: String,
    /// Last time the grant list was written
    pub updated_at: DateTime<Utc>,
}

impl RoleRecord {
    /// Create a role, rejecting any grant the strict grammar refuses
    pub fn new<I, S>(name: impl Into<String>, grants: I) -> Result<Self, StoreError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let grants: Vec<String> = grants.into_iter().map(Into::into).collect();
        for raw in &grants {
            Grant::parse(raw).map_err(|source| StoreError::InvalidGrant {
                grant: raw.clone(),
                source,
            })?;
        }

        Ok(Self {
            name: name.into(),
            grants_hash: compute_grants_hash(&grants),
            grants,
            updated_at: Utc::now(),
        })
    }

    /// Decode every grant for evaluation
    pub fn decoded(&self) -> Vec<Grant> {
        self.grants.iter().map(|g| Grant::decode(g)).collect()
    }

    /// Whether `grants` differs from what this record holds
    ///
    /// Order and level ordering inside a grant do not count as changes.
    pub fn has_changed(&self, grants: &[String]) -> bool {
        self.grants_hash != compute_grants_hash(grants)
    }
}

/// Order-independent digest of a grant list
pub fn compute_grants_hash(grants: &[String]) -> String {
    let mut canonical: Vec<String> = grants
        .iter()
        .map(|raw| Grant::parse(raw).map(|g| g.encode()).unwrap_or_else(|_| raw.clone()))
        .collect();
    canonical.sort();
    canonical.dedup();

    let mut hasher = blake3::Hasher::new();
    for grant in &canonical {
        hasher.update(grant.as_bytes());
        hasher.update(b"\n");
    }
    hasher.finalize().to_hex().to_string()
}

/// Trait for role storage
pub trait RoleStore: Send + Sync {
    /// Get a role by name
    fn get(&self, name: &str) -> Result<Option<RoleRecord>, StoreError>;

    /// Insert or replace a role
    fn set(&self, role: RoleRecord) -> Result<(), StoreError>;

    /// Remove a role
    fn remove(&self, name: &str) -> Result<(), StoreError>;

    /// List all roles
    fn list(&self) -> Result<Vec<RoleRecord>, StoreError>;

    /// Remove all roles
    fn clear(&self) -> Result<(), StoreError>;

    /// Decoded grants for a role; an unknown role holds nothing
    fn grants_for(&self, name: &str) -> Result<Vec<Grant>, StoreError> {
        Ok(self
            .get(name)?
            .map(|role| role.decoded())
            .unwrap_or_default())
    }
}

// ============================================================================
// File-based Role Store
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RoleFileData {
    version: u32,
    roles: BTreeMap<String, RoleRecord>,
}

impl RoleFileData {
    fn new() -> Self {
        Self {
            version: 1,
            roles: BTreeMap::new(),
        }
    }
}

/// Role store backed by a JSON file
///
/// Default: `~/.config/<app>/roles.json`
pub struct FileRoleStore {
    path: PathBuf,
    data: RwLock<RoleFileData>,
}

impl FileRoleStore {
    /// Open the store at `path`, starting empty if the file does not exist
    pub fn new(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();

        let data = if path.exists() {
            let reader = BufReader::new(File::open(&path)?);
            serde_json::from_reader(reader)?
        } else {
            RoleFileData::new()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    /// Open the store in the default location for an application
    pub fn default_for_app(app_name: &str) -> Result<Self, StoreError> {
        Self::new(default_config_dir(app_name).join("roles.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn save(&self, data: &RoleFileData) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let writer = BufWriter::new(File::create(&self.path)?);
        serde_json::to_writer_pretty(writer, data)?;
        Ok(())
    }

    /// Apply `f` to a copy, persist it, and only then make it visible
    fn update(&self, f: impl FnOnce(&mut RoleFileData)) -> Result<(), StoreError> {
        let mut data = self.data.write().map_err(|_| StoreError::Poisoned)?;
        let mut next = data.clone();
        f(&mut next);
        self.save(&next)?;
        *data = next;
        Ok(())
    }
}

impl RoleStore for FileRoleStore {
    fn get(&self, name: &str) -> Result<Option<RoleRecord>, StoreError> {
        let data = self.data.read().map_err(|_| StoreError::Poisoned)?;
        Ok(data.roles.get(name).cloned())
    }

    fn set(&self, role: RoleRecord) -> Result<(), StoreError> {
        self.update(|data| {
            data.roles.insert(role.name.clone(), role);
        })
    }

    fn remove(&self, name: &str) -> Result<(), StoreError> {
        self.update(|data| {
            data.roles.remove(name);
        })
    }

    fn list(&self) -> Result<Vec<RoleRecord>, StoreError> {
        let data = self.data.read().map_err(|_| StoreError::Poisoned)?;
        Ok(data.roles.values().cloned().collect())
    }

    fn clear(&self) -> Result<(), StoreError> {
        self.update(|data| data.roles.clear())
    }
}

impl std::fmt::Debug for FileRoleStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileRoleStore")
            .field("path", &self.path)
            .finish()
    }
}

/// `<config_dir>/<app>`, falling back to `./.config/<app>`
pub(crate) fn default_config_dir(app_name: &str) -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from(".config"))
        .join(app_name)
}

// ============================================================================
// In-Memory Role Store
// ============================================================================

/// In-memory role store for tests and seeded fixtures
#[derive(Default)]
pub struct MemoryRoleStore {
    data: RwLock<BTreeMap<String, RoleRecord>>,
}

impl MemoryRoleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from `(role, grants)` pairs
    pub fn with_roles<I, G, S>(roles: I) -> Result<Self, StoreError>
    where
        I: IntoIterator<Item = (S, G)>,
        G: IntoIterator,
        G::Item: Into<String>,
        S: Into<String>,
    {
        let store = Self::new();
        for (name, grants) in roles {
            store.set(RoleRecord::new(name, grants)?)?;
        }
        Ok(store)
    }

    pub fn len(&self) -> usize {
        self.data.read().map(|d| d.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RoleStore for MemoryRoleStore {
    fn get(&self, name: &str) -> Result<Option<RoleRecord>, StoreError> {
        let data = self.data.read().map_err(|_| StoreError::Poisoned)?;
        Ok(data.get(name).cloned())
    }

    fn set(&self, role: RoleRecord) -> Result<(), StoreError> {
        let mut data = self.data.write().map_err(|_| StoreError::Poisoned)?;
        data.insert(role.name.clone(), role);
        Ok(())
    }

    fn remove(&self, name: &str) -> Result<(), StoreError> {
        let mut data = self.data.write().map_err(|_| StoreError::Poisoned)?;
        data.remove(name);
        Ok(())
    }

    fn list(&self) -> Result<Vec<RoleRecord>, StoreError> {
        let data = self.data.read().map_err(|_| StoreError::Poisoned)?;
        Ok(data.values().cloned().collect())
    }

    fn clear(&self) -> Result<(), StoreError> {
        let mut data = self.data.write().map_err(|_| StoreError::Poisoned)?;
        data.clear();
        Ok(())
    }
}

impl std::fmt::Debug for MemoryRoleStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryRoleStore")
            .field("count", &self.len())
            .finish()
    }
}

// ============================================================================
// Read-Only Role Store
// ============================================================================

/// Read-only wrapper for any role store
///
/// For deployments where roles are provisioned out of band and must not
/// change at runtime.
#[derive(Debug)]
pub struct ReadOnlyRoleStore<S: RoleStore> {
    inner: S,
}

impl<S: RoleStore> ReadOnlyRoleStore<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
}

impl<S: RoleStore> RoleStore for ReadOnlyRoleStore<S> {
    fn get(&self, name: &str) -> Result<Option<RoleRecord>, StoreError> {
        self.inner.get(name)
    }

    fn set(&self, _role: RoleRecord) -> Result<(), StoreError> {
        Err(StoreError::ReadOnly)
    }

    fn remove(&self, _name: &str) -> Result<(), StoreError> {
        Err(StoreError::ReadOnly)
    }

    fn list(&self) -> Result<Vec<RoleRecord>, StoreError> {
        self.inner.list()
    }

    fn clear(&self) -> Result<(), StoreError> {
        Err(StoreError::ReadOnly)
    }
}
