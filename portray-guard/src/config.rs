//! Guard configuration and presets
//!
//! A [`GuardConfig`] bundles the evaluator settings, the role store and the
//! audit sink. Build one by hand with [`GuardConfigBuilder`], from a JSON
//! settings file with [`GuardSettings`], or take a [`GuardPresets`] entry.
//!
//! ```rust,ignore
//! use portray_guard::{AccessGuard, GuardPresets};
//!
//! // Roles and audit log under ~/.config/portray/
//! let guard = AccessGuard::new(GuardPresets::production("portray")?);
//!
//! // Roles provisioned out of band, never written at runtime
//! let guard = AccessGuard::new(GuardPresets::read_only("portray", Some("/etc/portray/roles.json".into()))?);
//! ```

use portray_grants::{Evaluator, Level, LevelPolicy, SYSTEM_ADMIN_ROLE};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use crate::audit::{AuditSink, FileAuditSink, MemoryAuditSink, NullAuditSink};
use crate::guard::Requirement;
use crate::store::{
    default_config_dir, FileRoleStore, MemoryRoleStore, ReadOnlyRoleStore, RoleStore,
};

/// Section guarding role edits, at `manage`, unless configured otherwise
pub const ROLE_ADMIN_SECTION: &str = "roles";

/// Everything an [`AccessGuard`](crate::AccessGuard) needs
pub struct GuardConfig {
    pub evaluator: Evaluator,
    pub store: Arc<dyn RoleStore>,
    pub audit: Arc<dyn AuditSink>,
    /// What an actor must hold to create, edit or remove roles
    pub role_admin: Requirement,
}

fn default_role_admin() -> Requirement {
    Requirement::new(ROLE_ADMIN_SECTION, Level::Manage)
}

impl std::fmt::Debug for GuardConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuardConfig")
            .field("evaluator", &self.evaluator)
            .field("role_admin", &self.role_admin.to_string())
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to initialize role store: {0}")]
    StoreInit(String),

    #[error("Failed to initialize audit: {0}")]
    AuditInit(String),

    #[error("Failed to read settings from {path}: {source}")]
    Settings {
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// File-backed settings
///
/// ```json
/// {
///   "admin_role": "system_admin",
///   "level_policy": "literal",
///   "roles_path": "/var/lib/portray/roles.json",
///   "audit_path": "/var/log/portray/audit.jsonl",
///   "read_only": false,
///   "role_admin": "roles:manage"
/// }
/// ```
///
/// Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardSettings {
    /// Reserved role that bypasses grant checks
    pub admin_role: Option<String>,
    pub level_policy: LevelPolicy,
    /// Role file; defaults to `<config_dir>/<app>/roles.json`
    pub roles_path: Option<PathBuf>,
    /// JSONL audit file; no audit log when absent
    pub audit_path: Option<PathBuf>,
    /// Refuse role writes at runtime
    pub read_only: bool,
    /// Requirement for role edits; defaults to `roles:manage`
    pub role_admin: Option<String>,
}

impl GuardSettings {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        let file = File::open(path).map_err(|e| ConfigError::Settings {
            path: path.to_path_buf(),
            source: Box::new(e),
        })?;
        serde_json::from_reader(BufReader::new(file)).map_err(|e| ConfigError::Settings {
            path: path.to_path_buf(),
            source: Box::new(e),
        })
    }
}

/// Builder for [`GuardConfig`]
pub struct GuardConfigBuilder {
    app_name: Option<String>,
    admin_role: Option<String>,
    level_policy: LevelPolicy,
    role_admin: Option<Requirement>,
    store: Option<Arc<dyn RoleStore>>,
    audit: Option<Arc<dyn AuditSink>>,
}

impl GuardConfigBuilder {
    pub fn new() -> Self {
        Self {
            app_name: None,
            admin_role: None,
            level_policy: LevelPolicy::default(),
            role_admin: None,
            store: None,
            audit: None,
        }
    }

    /// Builder seeded from settings; stores and sinks named there are opened
    pub fn from_settings(settings: GuardSettings) -> Result<Self, ConfigError> {
        let mut builder = Self::new().level_policy(settings.level_policy);
        if let Some(role) = settings.admin_role {
            builder = builder.admin_role(role);
        }
        if let Some(raw) = &settings.role_admin {
            let requirement = Requirement::parse(raw).map_err(|e| {
                ConfigError::InvalidConfig(format!("role_admin '{raw}': {e}"))
            })?;
            builder = builder.role_admin(requirement);
        }

        if let Some(path) = &settings.roles_path {
            let store =
                FileRoleStore::new(path).map_err(|e| ConfigError::StoreInit(e.to_string()))?;
            builder = if settings.read_only {
                builder.store(ReadOnlyRoleStore::new(store))
            } else {
                builder.store(store)
            };
        } else if settings.read_only {
            return Err(ConfigError::InvalidConfig(
                "read_only requires roles_path".into(),
            ));
        }

        if let Some(path) = &settings.audit_path {
            let audit =
                FileAuditSink::new(path).map_err(|e| ConfigError::AuditInit(e.to_string()))?;
            builder = builder.audit(audit);
        }

        Ok(builder)
    }

    /// Application name, used for default paths
    pub fn app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = Some(name.into());
        self
    }

    pub fn admin_role(mut self, role: impl Into<String>) -> Self {
        self.admin_role = Some(role.into());
        self
    }

    pub fn level_policy(mut self, policy: LevelPolicy) -> Self {
        self.level_policy = policy;
        self
    }

    /// Requirement an actor must meet to edit roles
    pub fn role_admin(mut self, requirement: Requirement) -> Self {
        self.role_admin = Some(requirement);
        self
    }

    pub fn store(mut self, store: impl RoleStore + 'static) -> Self {
        self.store = Some(Arc::new(store));
        self
    }

    pub fn shared_store(mut self, store: Arc<dyn RoleStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn audit(mut self, audit: impl AuditSink + 'static) -> Self {
        self.audit = Some(Arc::new(audit));
        self
    }

    /// Audit sink the caller keeps a handle to
    pub fn shared_audit(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Build the configuration
    ///
    /// Without an explicit store, the role file in the application's config
    /// directory is opened. Without an explicit sink, events are discarded.
    pub fn build(self) -> Result<GuardConfig, ConfigError> {
        let admin_role = self
            .admin_role
            .unwrap_or_else(|| SYSTEM_ADMIN_ROLE.to_string());
        if admin_role.is_empty() {
            return Err(ConfigError::InvalidConfig(
                "admin role name must not be empty".into(),
            ));
        }

        let store: Arc<dyn RoleStore> = match self.store {
            Some(store) => store,
            None => {
                let app_name = self.app_name.as_deref().unwrap_or("portray");
                let store = FileRoleStore::default_for_app(app_name)
                    .map_err(|e| ConfigError::StoreInit(e.to_string()))?;
                Arc::new(store)
            }
        };

        Ok(GuardConfig {
            evaluator: Evaluator::new()
                .with_admin_role(admin_role)
                .with_policy(self.level_policy),
            store,
            audit: self.audit.unwrap_or_else(|| Arc::new(NullAuditSink)),
            role_admin: self.role_admin.unwrap_or_else(default_role_admin),
        })
    }
}

impl Default for GuardConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Ready-made configurations
pub struct GuardPresets;

impl GuardPresets {
    /// Writable role file and JSONL audit log under the config directory
    pub fn production(app_name: &str) -> Result<GuardConfig, ConfigError> {
        let dir = default_config_dir(app_name);

        let store = FileRoleStore::new(dir.join("roles.json"))
            .map_err(|e| ConfigError::StoreInit(e.to_string()))?;
        let audit = FileAuditSink::new(dir.join("audit.jsonl"))
            .map_err(|e| ConfigError::AuditInit(e.to_string()))?;

        GuardConfigBuilder::new().store(store).audit(audit).build()
    }

    /// Read-only role file, JSONL audit log under the config directory
    pub fn read_only(
        app_name: &str,
        roles_file: Option<PathBuf>,
    ) -> Result<GuardConfig, ConfigError> {
        let dir = default_config_dir(app_name);
        let roles_file = roles_file.unwrap_or_else(|| dir.join("roles.json"));

        let store = FileRoleStore::new(&roles_file)
            .map_err(|e| ConfigError::StoreInit(e.to_string()))?;
        let audit = FileAuditSink::new(dir.join("audit.jsonl"))
            .map_err(|e| ConfigError::AuditInit(e.to_string()))?;

        GuardConfigBuilder::new()
            .store(ReadOnlyRoleStore::new(store))
            .audit(audit)
            .build()
    }

    /// In-memory roles, audit events discarded, nothing touches disk
    pub fn testing() -> GuardConfig {
        GuardConfig {
            evaluator: Evaluator::default(),
            store: Arc::new(MemoryRoleStore::new()),
            audit: Arc::new(NullAuditSink),
            role_admin: default_role_admin(),
        }
    }

    /// In-memory roles plus a handle to the in-memory audit buffer
    pub fn testing_with_audit() -> (GuardConfig, Arc<MemoryAuditSink>) {
        let audit = Arc::new(MemoryAuditSink::new());
        let config = GuardConfig {
            evaluator: Evaluator::default(),
            store: Arc::new(MemoryRoleStore::new()),
            audit: audit.clone(),
            role_admin: default_role_admin(),
        };
        (config, audit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::RoleRecord;

    #[test]
    fn test_builder_defaults() {
        let config = GuardConfigBuilder::new()
            .store(MemoryRoleStore::new())
            .build()
            .unwrap();

        assert_eq!(config.evaluator.admin_role(), SYSTEM_ADMIN_ROLE);
        assert_eq!(config.evaluator.policy(), LevelPolicy::Literal);
        assert_eq!(config.role_admin.to_string(), "roles:manage");
    }

    #[test]
    fn test_builder_rejects_empty_admin_role() {
        let result = GuardConfigBuilder::new()
            .store(MemoryRoleStore::new())
            .admin_role("")
            .build();
        assert!(matches!(result, Err(ConfigError::InvalidConfig(_))));
    }

    #[test]
    fn test_testing_preset() {
        let config = GuardPresets::testing();
        assert!(config.store.list().unwrap().is_empty());
        assert!(config.audit.is_healthy());
    }

    #[test]
    fn test_testing_preset_audit_is_observable() {
        let (config, audit) = GuardPresets::testing_with_audit();
        let guard = crate::AccessGuard::new(config);

        let req = Requirement::new("ports", Level::Read);
        assert!(guard.check(None, &req).is_err());
        assert!(guard.check(Some(&crate::User::new("u-1")), &req).is_err());

        assert_eq!(audit.count(), 2);
        assert_eq!(audit.find_by_user("u-1").len(), 1);
    }

    #[test]
    fn test_settings_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let settings_path = dir.path().join("guard.json");
        let roles_path = dir.path().join("roles.json");
        std::fs::write(
            &settings_path,
            serde_json::json!({
                "admin_role": "superuser",
                "level_policy": "hierarchical",
                "roles_path": roles_path,
                "read_only": true,
                "role_admin": "admin:roles:write"
            })
            .to_string(),
        )
        .unwrap();

        let settings = GuardSettings::load(&settings_path).unwrap();
        assert_eq!(settings.level_policy, LevelPolicy::Hierarchical);
        assert!(settings.audit_path.is_none());

        let config = GuardConfigBuilder::from_settings(settings)
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(config.evaluator.admin_role(), "superuser");
        assert_eq!(config.evaluator.policy(), LevelPolicy::Hierarchical);
        assert_eq!(
            config.role_admin,
            Requirement::new("admin", Level::Write).with_subsection("roles")
        );

        let role = RoleRecord::new("ops", ["ports:read"]).unwrap();
        assert!(config.store.set(role).is_err());
    }

    #[test]
    fn test_settings_read_only_requires_path() {
        let settings = GuardSettings {
            read_only: true,
            ..GuardSettings::default()
        };
        assert!(matches!(
            GuardConfigBuilder::from_settings(settings),
            Err(ConfigError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_settings_rejects_bad_role_admin() {
        let settings = GuardSettings {
            role_admin: Some("roles:read,manage".into()),
            ..GuardSettings::default()
        };
        assert!(matches!(
            GuardConfigBuilder::from_settings(settings),
            Err(ConfigError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_settings_missing_file() {
        let err = GuardSettings::load("/nonexistent/portray/guard.json").unwrap_err();
        assert!(matches!(err, ConfigError::Settings { .. }));
    }
}
