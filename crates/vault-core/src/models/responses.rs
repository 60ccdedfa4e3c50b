//! Read views returned by registry commands.

use super::{Archive, Model, Role, User};
use crate::config::RegistryConfig;
use serde::{Deserialize, Serialize};

/// A model joined with its uploader's email for listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelView {
    pub id: u64,
    pub name: String,
    pub description: String,
    pub file_url: String,
    pub file_name: String,
    pub file_size: u64,
    /// Uploader email; `None` when the uploader is unknown or gone.
    pub uploaded_by: Option<String>,
    pub archive_id: Option<u64>,
    pub created_at: String,
}

impl ModelView {
    pub fn new(model: &Model, uploader_email: Option<String>) -> Self {
        Self {
            id: model.id,
            name: model.name.clone(),
            description: model.description.clone(),
            file_url: model.file_url.clone(),
            file_name: model.file_name.clone(),
            file_size: model.file_size,
            uploaded_by: uploader_email,
            archive_id: model.archive_id,
            created_at: model
                .created_at
                .format(RegistryConfig::TIMESTAMP_FORMAT)
                .to_string(),
        }
    }
}

/// Archive listing entry for admins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveSummary {
    pub id: u64,
    pub name: String,
    pub token: String,
    pub count: usize,
    pub created_at: String,
}

impl ArchiveSummary {
    pub fn new(archive: &Archive, count: usize) -> Self {
        Self {
            id: archive.id,
            name: archive.name.clone(),
            token: archive.token.clone(),
            count,
            created_at: archive
                .created_at
                .format(RegistryConfig::TIMESTAMP_FORMAT)
                .to_string(),
        }
    }
}

/// Public account details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: u64,
    pub email: String,
    pub role: Role,
}

impl From<&User> for UserProfile {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            role: user.role,
        }
    }
}

/// Outcome of an archive delete.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveDeletion {
    pub archive: Archive,
    pub models_removed: usize,
    /// Files that could not be removed and were left on disk.
    pub orphaned_files: Vec<String>,
}
