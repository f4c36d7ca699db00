//! Operator commands behind the `portray` binary
//!
//! Each command returns a serializable report; the binary prints it as JSON.

use anyhow::{bail, Context};
use portray_grants::{Grant, LevelFlags, LevelPolicy, ScopeBuf};
use portray_guard::store::compute_grants_hash;
use portray_guard::{
    AccessGuard, FileRoleStore, GuardConfigBuilder, GuardSettings, Requirement, RoleStore,
    ScopeCapability, User,
};
use serde::Serialize;
use std::path::PathBuf;

/// How a single grant string is read
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DecodeReport {
    pub input: String,
    /// False when the string has neither 2 nor 3 fields
    pub parseable: bool,
    pub section: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subsection: Option<String>,
    pub levels: LevelFlags,
    /// Canonical encoding, for parseable grants
    #[serde(skip_serializing_if = "Option::is_none")]
    pub canonical: Option<String>,
    /// Why authoring tools would reject the string
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strict_error: Option<String>,
}

pub fn decode(raw: &str) -> DecodeReport {
    let grant = Grant::decode(raw);
    let parseable = !grant.is_unparseable();

    DecodeReport {
        input: raw.to_string(),
        parseable,
        canonical: parseable.then(|| grant.encode()),
        strict_error: Grant::parse(raw).err().map(|e| e.to_string()),
        levels: grant.levels.flags(),
        section: grant.section,
        subsection: grant.subsection,
    }
}

/// Where the guard gets its roles and settings
#[derive(Debug, Clone, Default)]
pub struct GuardOptions {
    pub settings: Option<PathBuf>,
    pub roles: Option<PathBuf>,
    pub admin_role: Option<String>,
    pub hierarchical: bool,
}

/// Build a guard from a settings file and/or a role file
///
/// An explicit role file overrides the one named in settings. With
/// neither, the role file in the default config directory is used.
pub fn open_guard(options: &GuardOptions) -> anyhow::Result<AccessGuard> {
    let mut builder = match &options.settings {
        Some(path) => GuardConfigBuilder::from_settings(GuardSettings::load(path)?)?,
        None => GuardConfigBuilder::new().app_name("portray"),
    };

    if let Some(path) = &options.roles {
        let store = FileRoleStore::new(path)
            .with_context(|| format!("Failed to open role file {}", path.display()))?;
        builder = builder.store(store);
    }
    if let Some(role) = &options.admin_role {
        builder = builder.admin_role(role.clone());
    }
    if options.hierarchical {
        builder = builder.level_policy(LevelPolicy::Hierarchical);
    }

    Ok(AccessGuard::new(builder.build()?))
}

/// Outcome of a guard check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckReport {
    pub user: String,
    pub requirement: String,
    pub allowed: bool,
    pub status: u16,
    pub admin_override: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

pub fn check(
    guard: &AccessGuard,
    user: &User,
    requirement: &Requirement,
) -> anyhow::Result<CheckReport> {
    let mut report = CheckReport {
        user: user.id.clone(),
        requirement: requirement.to_string(),
        allowed: false,
        status: 200,
        admin_override: false,
        message: None,
    };

    match guard.check(Some(user), requirement) {
        Ok(ctx) => {
            report.allowed = true;
            report.admin_override = ctx.is_admin();
        }
        Err(e) if e.is_denial() => {
            report.status = e.status_code();
            report.message = Some(e.to_string());
        }
        Err(e) => return Err(e.into()),
    }
    Ok(report)
}

/// Parse `section` or `section:subsection`
pub fn parse_scope(raw: &str) -> anyhow::Result<ScopeBuf> {
    let fields: Vec<&str> = raw.split(':').collect();
    let (section, subsection) = match fields.as_slice() {
        [section] => (*section, None),
        [section, subsection] => (*section, Some(*subsection)),
        _ => bail!("Scope must be 'section' or 'section:subsection', got '{raw}'"),
    };
    if section.is_empty() || subsection.is_some_and(str::is_empty) {
        bail!("Scope '{raw}' has an empty field");
    }

    Ok(ScopeBuf {
        section: section.to_string(),
        subsection: subsection.map(str::to_string),
    })
}

pub fn levels(
    guard: &AccessGuard,
    user: &User,
    scopes: &[ScopeBuf],
) -> anyhow::Result<Vec<ScopeCapability>> {
    Ok(guard.resolve(user)?.capabilities(scopes))
}

/// Problem found in a stored role
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoleIssue {
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grant: Option<String>,
    pub problem: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub roles: usize,
    pub grants: usize,
    pub issues: Vec<RoleIssue>,
}

impl ValidationReport {
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

/// Check every stored grant against the strict grammar
///
/// Grants that fail here still evaluate at runtime, but match less than
/// their author probably intended (or nothing at all).
pub fn validate(store: &dyn RoleStore) -> anyhow::Result<ValidationReport> {
    let mut report = ValidationReport::default();

    for role in store.list()? {
        report.roles += 1;
        report.grants += role.grants.len();

        for grant in &role.grants {
            if let Err(e) = Grant::parse(grant) {
                report.issues.push(RoleIssue {
                    role: role.name.clone(),
                    grant: Some(grant.clone()),
                    problem: e.to_string(),
                });
            }
        }

        if compute_grants_hash(&role.grants) != role.grants_hash {
            report.issues.push(RoleIssue {
                role: role.name.clone(),
                grant: None,
                problem: "stored grants hash does not match grants".to_string(),
            });
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use portray_grants::Level;
    use portray_guard::RoleRecord;

    fn roles_file(dir: &tempfile::TempDir) -> PathBuf {
        let path = dir.path().join("roles.json");
        let store = FileRoleStore::new(&path).unwrap();
        store
            .set(RoleRecord::new("operations", ["ports:read,write", "ports:terminals:read"]).unwrap())
            .unwrap();
        path
    }

    #[test]
    fn test_decode_report() {
        let report = decode("ports:terminals:manage,read");
        assert!(report.parseable);
        assert_eq!(report.subsection.as_deref(), Some("terminals"));
        assert_eq!(report.canonical.as_deref(), Some("ports:terminals:read,manage"));
        assert!(report.strict_error.is_none());

        let report = decode("ports:read:write:manage");
        assert!(!report.parseable);
        assert!(!report.levels.any());
        assert!(report.canonical.is_none());
        assert!(report.strict_error.is_some());

        // Two fields with an empty section still decode
        let report = decode(":read");
        assert!(report.parseable);
        assert_eq!(report.section, "");
        assert!(report.levels.read);
        assert_eq!(report.canonical.as_deref(), Some(":read"));
        assert!(report.strict_error.is_some());

        // Decodes tolerantly but would be refused at authoring time
        let report = decode("ports:read,admin");
        assert!(report.parseable);
        assert!(report.levels.read);
        assert!(report.strict_error.is_some());
    }

    #[test]
    fn test_check_allowed_and_denied() {
        let dir = tempfile::tempdir().unwrap();
        let guard = open_guard(&GuardOptions {
            roles: Some(roles_file(&dir)),
            ..GuardOptions::default()
        })
        .unwrap();
        let user = User::new("cli").with_role("operations");

        let report = check(&guard, &user, &Requirement::new("ports", Level::Write)).unwrap();
        assert!(report.allowed);
        assert_eq!(report.status, 200);

        let report = check(&guard, &user, &"ports:terminals:write".parse().unwrap()).unwrap();
        assert!(!report.allowed);
        assert_eq!(report.status, 403);
        assert_eq!(
            report.message.as_deref(),
            Some("Forbidden: 'write' access to 'ports:terminals' is required")
        );
    }

    #[test]
    fn test_check_custom_admin_role() {
        let dir = tempfile::tempdir().unwrap();
        let guard = open_guard(&GuardOptions {
            roles: Some(roles_file(&dir)),
            admin_role: Some("root".into()),
            ..GuardOptions::default()
        })
        .unwrap();

        let report = check(
            &guard,
            &User::new("cli").with_role("root"),
            &Requirement::new("users", Level::Manage),
        )
        .unwrap();
        assert!(report.allowed);
        assert!(report.admin_override);
    }

    #[test]
    fn test_parse_scope() {
        assert_eq!(parse_scope("ports").unwrap().to_string(), "ports");
        assert_eq!(
            parse_scope("ports:terminals").unwrap().subsection.as_deref(),
            Some("terminals")
        );
        assert!(parse_scope("").is_err());
        assert!(parse_scope("ports:").is_err());
        assert!(parse_scope("a:b:c").is_err());
    }

    #[test]
    fn test_levels() {
        let dir = tempfile::tempdir().unwrap();
        let guard = open_guard(&GuardOptions {
            roles: Some(roles_file(&dir)),
            ..GuardOptions::default()
        })
        .unwrap();
        let user = User::new("cli").with_role("operations");
        let scopes = [parse_scope("ports").unwrap(), parse_scope("contracts").unwrap()];

        let caps = levels(&guard, &user, &scopes).unwrap();
        assert!(caps[0].visible);
        assert!(caps[0].levels.write);
        assert!(!caps[1].visible);
    }

    #[test]
    fn test_validate_reports_bad_grants() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileRoleStore::new(roles_file(&dir)).unwrap();
        let mut legacy = RoleRecord::new("legacy", ["contracts:read"]).unwrap();
        legacy.grants.insert(0, "contracts:".to_string());
        legacy.grants_hash = compute_grants_hash(&legacy.grants);
        store.set(legacy).unwrap();

        let report = validate(&store).unwrap();
        assert_eq!(report.roles, 2);
        assert_eq!(report.grants, 4);
        assert!(!report.is_clean());
        assert_eq!(report.issues.len(), 1);
        assert_eq!(report.issues[0].role, "legacy");
        assert_eq!(report.issues[0].grant.as_deref(), Some("contracts:"));
    }

    #[test]
    fn test_validate_detects_stale_hash() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileRoleStore::new(roles_file(&dir)).unwrap();
        let mut role = store.get("operations").unwrap().unwrap();
        role.grants.push("contracts:read".into());
        store.set(role).unwrap();

        let report = validate(&store).unwrap();
        assert_eq!(report.issues.len(), 1);
        assert!(report.issues[0].grant.is_none());
    }
}
