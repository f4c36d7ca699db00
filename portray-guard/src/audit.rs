//! Audit trail for access decisions and role changes
//!
//! Every guard decision and role mutation is turned into an [`AuditEvent`]
//! and handed to an [`AuditSink`]. Sinks are pluggable; the ones provided
//! write JSON Lines to a file, keep a bounded in-memory buffer, discard
//! everything, or fan out to several sinks.

use chrono::{SecondsFormat, Utc};
use portray_grants::Level;
use serde::Serialize;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};
use thiserror::Error;

use crate::guard::Requirement;

/// Audit event
#[derive(Debug, Clone, Serialize)]
pub struct AuditEvent {
    /// RFC 3339 timestamp, UTC
    pub timestamp: String,
    pub event_type: AuditEventType,
    /// Acting user, absent for unauthenticated requests
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    /// Scope the event concerns, in grant notation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    pub details: AuditDetails,
}

impl AuditEvent {
    pub fn new(event_type: AuditEventType, details: AuditDetails) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            event_type,
            user: None,
            scope: None,
            details,
        }
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    AccessGranted,
    AccessDenied,
    /// Guarded resource requested without a user
    Unauthenticated,
    RoleSaved,
    RoleRemoved,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum AuditDetails {
    Access {
        level: Level,
        /// Allowed through the system admin override
        admin_override: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        reason: Option<String>,
    },
    Role {
        role: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        old_hash: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        new_hash: Option<String>,
        grant_count: usize,
    },
}

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("Failed to write audit log: {0}")]
    WriteError(#[from] std::io::Error),

    #[error("Failed to serialize audit event: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Audit sink not available: {0}")]
    Unavailable(String),
}

/// Destination for audit events
///
/// # Example
///
/// ```rust
/// use portray_guard::audit::{AuditError, AuditEvent, AuditSink};
///
/// struct StderrSink;
///
/// impl AuditSink for StderrSink {
///     fn record(&self, event: AuditEvent) -> Result<(), AuditError> {
///         eprintln!("{}", serde_json::to_string(&event)?);
///         Ok(())
///     }
///
///     fn flush(&self) -> Result<(), AuditError> {
///         Ok(())
///     }
/// }
/// ```
pub trait AuditSink: Send + Sync {
    fn record(&self, event: AuditEvent) -> Result<(), AuditError>;

    fn flush(&self) -> Result<(), AuditError>;

    fn is_healthy(&self) -> bool {
        true
    }
}

// ============================================================================
// Sinks
// ============================================================================

/// JSON Lines file sink
pub struct FileAuditSink {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
}

impl FileAuditSink {
    /// Open `path` for appending, creating parent directories
    pub fn new(path: impl AsRef<Path>) -> Result<Self, AuditError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        Ok(Self {
            path,
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn writer(&self) -> Result<std::sync::MutexGuard<'_, BufWriter<File>>, AuditError> {
        self.writer
            .lock()
            .map_err(|_| AuditError::Unavailable("audit writer lock poisoned".into()))
    }
}

impl AuditSink for FileAuditSink {
    fn record(&self, event: AuditEvent) -> Result<(), AuditError> {
        let json = serde_json::to_string(&event)?;
        let mut writer = self.writer()?;
        writeln!(writer, "{}", json)?;
        Ok(())
    }

    fn flush(&self) -> Result<(), AuditError> {
        self.writer()?.flush()?;
        Ok(())
    }

    fn is_healthy(&self) -> bool {
        self.path.parent().map(|p| p.exists()).unwrap_or(true)
    }
}

impl fmt::Debug for FileAuditSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileAuditSink")
            .field("path", &self.path)
            .finish()
    }
}

/// Bounded in-memory sink; the oldest event is dropped when full
pub struct MemoryAuditSink {
    events: RwLock<Vec<AuditEvent>>,
    max_events: usize,
}

impl MemoryAuditSink {
    /// Sink holding up to 1000 events
    pub fn new() -> Self {
        Self::with_capacity(1000)
    }

    pub fn with_capacity(max_events: usize) -> Self {
        Self {
            events: RwLock::new(Vec::with_capacity(max_events.min(1000))),
            max_events,
        }
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.read().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn count(&self) -> usize {
        self.events.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn clear(&self) {
        if let Ok(mut events) = self.events.write() {
            events.clear();
        }
    }

    pub fn find_by_type(&self, event_type: AuditEventType) -> Vec<AuditEvent> {
        self.find(|e| e.event_type == event_type)
    }

    pub fn find_by_user(&self, user: &str) -> Vec<AuditEvent> {
        self.find(|e| e.user.as_deref() == Some(user))
    }

    fn find(&self, predicate: impl Fn(&AuditEvent) -> bool) -> Vec<AuditEvent> {
        self.events
            .read()
            .map(|events| events.iter().filter(|e| predicate(*e)).cloned().collect())
            .unwrap_or_default()
    }
}

impl Default for MemoryAuditSink {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, event: AuditEvent) -> Result<(), AuditError> {
        if self.max_events == 0 {
            return Ok(());
        }
        let mut events = self
            .events
            .write()
            .map_err(|_| AuditError::Unavailable("audit buffer lock poisoned".into()))?;
        if events.len() >= self.max_events {
            events.remove(0);
        }
        events.push(event);
        Ok(())
    }

    fn flush(&self) -> Result<(), AuditError> {
        Ok(())
    }
}

impl fmt::Debug for MemoryAuditSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryAuditSink")
            .field("count", &self.count())
            .field("max_events", &self.max_events)
            .finish()
    }
}

/// Discards all events
#[derive(Debug, Default)]
pub struct NullAuditSink;

impl AuditSink for NullAuditSink {
    fn record(&self, _event: AuditEvent) -> Result<(), AuditError> {
        Ok(())
    }

    fn flush(&self) -> Result<(), AuditError> {
        Ok(())
    }
}

/// Writes every event to each inner sink
///
/// Stops at the first failing sink.
#[derive(Default)]
pub struct CompositeAuditSink {
    sinks: Vec<Box<dyn AuditSink>>,
}

impl CompositeAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink(mut self, sink: impl AuditSink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }
}

impl AuditSink for CompositeAuditSink {
    fn record(&self, event: AuditEvent) -> Result<(), AuditError> {
        for sink in &self.sinks {
            sink.record(event.clone())?;
        }
        Ok(())
    }

    fn flush(&self) -> Result<(), AuditError> {
        for sink in &self.sinks {
            sink.flush()?;
        }
        Ok(())
    }

    fn is_healthy(&self) -> bool {
        self.sinks.iter().all(|s| s.is_healthy())
    }
}

impl fmt::Debug for CompositeAuditSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeAuditSink")
            .field("sink_count", &self.sinks.len())
            .finish()
    }
}

// ============================================================================
// Event constructors
// ============================================================================

pub fn access_granted(user: &str, requirement: &Requirement, admin_override: bool) -> AuditEvent {
    AuditEvent::new(
        AuditEventType::AccessGranted,
        AuditDetails::Access {
            level: requirement.level,
            admin_override,
            reason: None,
        },
    )
    .with_user(user)
    .with_scope(requirement.scope.to_string())
}

pub fn access_denied(user: &str, requirement: &Requirement, reason: &str) -> AuditEvent {
    AuditEvent::new(
        AuditEventType::AccessDenied,
        AuditDetails::Access {
            level: requirement.level,
            admin_override: false,
            reason: Some(reason.to_string()),
        },
    )
    .with_user(user)
    .with_scope(requirement.scope.to_string())
}

pub fn unauthenticated(requirement: &Requirement) -> AuditEvent {
    AuditEvent::new(
        AuditEventType::Unauthenticated,
        AuditDetails::Access {
            level: requirement.level,
            admin_override: false,
            reason: Some("no authenticated user".into()),
        },
    )
    .with_scope(requirement.scope.to_string())
}

pub fn role_saved(
    actor: &str,
    role: &str,
    old_hash: Option<&str>,
    new_hash: &str,
    grant_count: usize,
) -> AuditEvent {
    AuditEvent::new(
        AuditEventType::RoleSaved,
        AuditDetails::Role {
            role: role.to_string(),
            old_hash: old_hash.map(str::to_string),
            new_hash: Some(new_hash.to_string()),
            grant_count,
        },
    )
    .with_user(actor)
}

pub fn role_removed(actor: &str, role: &str, old_hash: &str) -> AuditEvent {
    AuditEvent::new(
        AuditEventType::RoleRemoved,
        AuditDetails::Role {
            role: role.to_string(),
            old_hash: Some(old_hash.to_string()),
            new_hash: None,
            grant_count: 0,
        },
    )
    .with_user(actor)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn requirement() -> Requirement {
        "ports:terminals:write".parse().unwrap()
    }

    #[test]
    fn test_memory_sink() {
        let sink = MemoryAuditSink::new();
        sink.record(access_granted("u-1", &requirement(), false)).unwrap();

        assert_eq!(sink.count(), 1);
        let events = sink.find_by_type(AuditEventType::AccessGranted);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].scope.as_deref(), Some("ports:terminals"));
        assert_eq!(sink.find_by_user("u-1").len(), 1);
    }

    #[test]
    fn test_memory_sink_eviction() {
        let sink = MemoryAuditSink::with_capacity(2);
        for i in 0..3 {
            sink.record(access_denied(&format!("u-{}", i), &requirement(), "no grant"))
                .unwrap();
        }

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].user.as_deref(), Some("u-1"));
        assert_eq!(events[1].user.as_deref(), Some("u-2"));
    }

    #[test]
    fn test_composite_sink_and_null_sink() {
        let sink = CompositeAuditSink::new()
            .with_sink(NullAuditSink)
            .with_sink(MemoryAuditSink::new());

        assert!(sink.record(unauthenticated(&requirement())).is_ok());
        assert!(sink.flush().is_ok());
        assert!(sink.is_healthy());
    }

    #[test]
    fn test_event_serialization() {
        let event = access_denied("u-9", &requirement(), "no grant");
        let json = serde_json::to_value(&event).unwrap();

        assert_eq!(json["event_type"], "access_denied");
        assert_eq!(json["user"], "u-9");
        assert_eq!(json["details"]["type"], "access");
        assert_eq!(json["details"]["level"], "write");
        assert_eq!(json["details"]["reason"], "no grant");

        let event = role_removed("root", "operations", "abc");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["details"]["type"], "role");
        assert!(json["details"].get("new_hash").is_none());
    }

    #[test]
    fn test_file_sink() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("audit.jsonl");

        let sink = FileAuditSink::new(&path).unwrap();
        sink.record(unauthenticated(&requirement())).unwrap();
        sink.record(access_granted("u-1", &requirement(), true)).unwrap();
        sink.flush().unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("unauthenticated"));
        assert!(lines[1].contains(r#""admin_override":true"#));
    }
}
