//! Authenticated user record, as handed over by the session layer

use portray_grants::Principal;
use serde::{Deserialize, Serialize};

/// The parts of a user record the guard reads
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Name of the role whose grants apply
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub is_system_admin: bool,
}

impl User {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn system_admin(mut self) -> Self {
        self.is_system_admin = true;
        self
    }

    pub fn principal(&self) -> Principal {
        Principal {
            role: self.role.clone(),
            is_system_admin: self.is_system_admin,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_session_payload() {
        let user: User = serde_json::from_str(
            r#"{"id":"u-17","email":"ops@portray.io","role":"operations","isSystemAdmin":false}"#,
        )
        .unwrap();

        assert_eq!(user.role.as_deref(), Some("operations"));
        assert_eq!(user.principal(), Principal::with_role("operations"));
    }

    #[test]
    fn test_missing_fields_default() {
        let user: User = serde_json::from_str(r#"{"id":"u-1"}"#).unwrap();
        assert_eq!(user.role, None);
        assert!(!user.is_system_admin);
    }
}
