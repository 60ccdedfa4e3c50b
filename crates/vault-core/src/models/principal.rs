//! Authenticated caller identity.
//!
//! The authentication boundary verifies credentials and hands the registry
//! one of these values; the registry only inspects the variant.

use super::{Archive, Role, User};
use crate::error::{Result, VaultError};
use serde::{Deserialize, Serialize};

/// An already-verified caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Principal {
    Admin { user_id: u64, email: String },
    User { user_id: u64, email: String },
    /// Capability derived from an archive token, not an account.
    ArchiveUser { archive_id: u64, archive_name: String },
}

impl Principal {
    /// Principal for a logged-in account.
    pub fn for_user(user: &User) -> Self {
        match user.role {
            Role::Admin => Principal::Admin {
                user_id: user.id,
                email: user.email.clone(),
            },
            Role::User => Principal::User {
                user_id: user.id,
                email: user.email.clone(),
            },
        }
    }

    /// Scoped principal for an archive token holder.
    pub fn for_archive(archive: &Archive) -> Self {
        Principal::ArchiveUser {
            archive_id: archive.id,
            archive_name: archive.name.clone(),
        }
    }

    pub fn role_str(&self) -> &'static str {
        match self {
            Principal::Admin { .. } => "admin",
            Principal::User { .. } => "user",
            Principal::ArchiveUser { .. } => "archive_user",
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Principal::Admin { .. })
    }

    /// Account id, if this principal is an account.
    pub fn user_id(&self) -> Option<u64> {
        match self {
            Principal::Admin { user_id, .. } | Principal::User { user_id, .. } => Some(*user_id),
            Principal::ArchiveUser { .. } => None,
        }
    }

    /// Archive this principal is confined to, if any.
    pub fn archive_scope(&self) -> Option<u64> {
        match self {
            Principal::ArchiveUser { archive_id, .. } => Some(*archive_id),
            _ => None,
        }
    }

    /// Fail with `Forbidden` unless this principal is an admin.
    pub fn require_admin(&self, action: &str) -> Result<u64> {
        match self {
            Principal::Admin { user_id, .. } => Ok(*user_id),
            _ => Err(VaultError::forbidden(format!("only admins can {}", action))),
        }
    }
}
