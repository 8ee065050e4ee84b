//! Authenticated caller identity.
//!
//! The server middleware validates the bearer token and injects a
//! `CurrentUser` into request extensions; services take it explicitly.
//! There is no implicit or thread-local identity anywhere in the codebase.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::RegistryError;
use crate::types::UserRole;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentUser {
    pub user_id: Uuid,
    pub org_id: Uuid,
    pub email: String,
    pub role: UserRole,
}

impl CurrentUser {
    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }

    /// Reject callers below `min` in the role order
    /// viewer < reviewer < editor < admin.
    pub fn require_role(&self, min: UserRole) -> Result<(), RegistryError> {
        if self.role >= min {
            Ok(())
        } else {
            Err(RegistryError::Forbidden(format!(
                "requires role {min} or above"
            )))
        }
    }

    pub fn require_admin(&self) -> Result<(), RegistryError> {
        self.require_role(UserRole::Admin)
    }
}

/// Claims shape expected from the external identity provider.
/// Deserialized by the server JWT middleware; token issuance lives outside
/// this system.
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenClaims {
    pub sub: Uuid,
    pub org: Uuid,
    pub email: String,
    pub role: UserRole,
    #[serde(default)]
    pub exp: Option<i64>,
}

impl TokenClaims {
    pub fn into_current_user(self) -> CurrentUser {
        CurrentUser {
            user_id: self.sub,
            org_id: self.org,
            email: self.email,
            role: self.role,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(role: UserRole) -> CurrentUser {
        CurrentUser {
            user_id: Uuid::new_v4(),
            org_id: Uuid::new_v4(),
            email: "t@example.com".into(),
            role,
        }
    }

    #[test]
    fn role_order_is_total() {
        assert!(UserRole::Viewer < UserRole::Reviewer);
        assert!(UserRole::Reviewer < UserRole::Editor);
        assert!(UserRole::Editor < UserRole::Admin);
    }

    #[test]
    fn editor_cannot_pass_admin_gate() {
        assert!(user(UserRole::Editor).require_admin().is_err());
        assert!(user(UserRole::Admin).require_admin().is_ok());
    }

    #[test]
    fn viewer_passes_viewer_gate() {
        assert!(user(UserRole::Viewer).require_role(UserRole::Viewer).is_ok());
        assert!(user(UserRole::Viewer)
            .require_role(UserRole::Editor)
            .is_err());
    }
}
