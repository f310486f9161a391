//! Explicit caller identity threaded through every core operation.
//!
//! The request layer authenticates the caller and builds an
//! [`AuthorizationContext`]; the core only checks the role against the
//! permission table in [`crate::permissions`].

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::AppError;
use crate::permissions;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Admin,
    Teacher,
    Parent,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::Teacher => "TEACHER",
            Role::Parent => "PARENT",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "teacher" => Ok(Role::Teacher),
            "parent" => Ok(Role::Parent),
            other => Err(AppError::validation(
                "role",
                format!("unknown role '{}'", other),
            )),
        }
    }
}

/// Who is calling, as established by the request layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationContext {
    pub user_id: Uuid,
    pub role: Role,
}

impl AuthorizationContext {
    pub fn new(user_id: Uuid, role: Role) -> Self {
        Self { user_id, role }
    }

    pub fn admin(user_id: Uuid) -> Self {
        Self::new(user_id, Role::Admin)
    }

    pub fn teacher(user_id: Uuid) -> Self {
        Self::new(user_id, Role::Teacher)
    }

    pub fn parent(user_id: Uuid) -> Self {
        Self::new(user_id, Role::Parent)
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.role == role
    }

    /// Fails with [`AppError::Forbidden`] unless the caller's role is granted
    /// `permission`.
    pub fn require(&self, permission: &'static str) -> Result<(), AppError> {
        if permissions::allowed_roles(permission).contains(&self.role) {
            Ok(())
        } else {
            Err(AppError::Forbidden {
                role: self.role,
                permission,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;

    #[test]
    fn test_role_parsing() {
        assert_eq!("admin".parse::<Role>().unwrap(), Role::Admin);
        assert_eq!("TEACHER".parse::<Role>().unwrap(), Role::Teacher);
        assert_eq!(" Parent ".parse::<Role>().unwrap(), Role::Parent);
        assert!("principal".parse::<Role>().is_err());
    }

    #[test]
    fn test_admin_only_permissions() {
        let admin = AuthorizationContext::admin(Uuid::new_v4());
        let teacher = AuthorizationContext::teacher(Uuid::new_v4());

        assert!(admin.require(permissions::BATCHES_UPDATE_CAPACITY).is_ok());
        let err = teacher
            .require(permissions::BATCHES_UPDATE_CAPACITY)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Forbidden);
        assert!(err.to_string().contains("batches:update_capacity"));
    }

    #[test]
    fn test_staff_permissions() {
        let allowed = [Role::Admin, Role::Teacher];
        for role in allowed {
            let ctx = AuthorizationContext::new(Uuid::new_v4(), role);
            assert!(ctx.require(permissions::BATCHES_ASSIGN_STUDENTS).is_ok());
            assert!(ctx.require(permissions::TESTS_RECORD).is_ok());
            assert!(ctx.require(permissions::PAYMENTS_DECIDE).is_ok());
        }

        let parent = AuthorizationContext::parent(Uuid::new_v4());
        assert!(parent.require(permissions::BATCHES_ASSIGN_STUDENTS).is_err());
        assert!(parent.require(permissions::PAYMENTS_DECIDE).is_err());
    }

    #[test]
    fn test_read_permissions_open_to_every_role() {
        for role in [Role::Admin, Role::Teacher, Role::Parent] {
            let ctx = AuthorizationContext::new(Uuid::new_v4(), role);
            assert!(ctx.require(permissions::SUMMARIES_READ).is_ok());
            assert!(ctx.require(permissions::PAYMENTS_SUBMIT).is_ok());
        }
    }

    #[test]
    fn test_unknown_permission_denied() {
        let admin = AuthorizationContext::admin(Uuid::new_v4());
        assert!(admin.require("reports:export").is_err());
    }
}
