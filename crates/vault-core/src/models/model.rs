//! Registry entities: models, archives and user accounts.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Account role. The archive principal is not an account and has no role here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    User,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A registered account.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: u64,
    pub email: String,
    /// Opaque hash produced by the authentication boundary.
    #[serde(skip_serializing, default)]
    pub credential_hash: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A token-gated folder grouping a subset of models.
///
/// `name` doubles as the directory name under the archive root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Archive {
    pub id: u64,
    pub name: String,
    pub token: String,
    pub created_at: DateTime<Utc>,
}

/// An uploaded 3D asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Model {
    pub id: u64,
    pub name: String,
    pub description: String,
    /// Stored file name, unique within its directory.
    pub file_name: String,
    pub file_url: String,
    pub file_size: u64,
    pub archive_id: Option<u64>,
    pub uploaded_by: Option<u64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A model before the in-memory index assigns it an id.
#[derive(Debug, Clone)]
pub struct ModelDraft {
    pub name: String,
    pub description: String,
    pub file_name: String,
    pub file_url: String,
    pub file_size: u64,
    pub archive_id: Option<u64>,
    pub uploaded_by: Option<u64>,
}

impl ModelDraft {
    /// Materialize the draft under `id`, stamping both timestamps with now.
    pub fn into_model(self, id: u64) -> Model {
        let now = Utc::now();
        Model {
            id,
            name: self.name,
            description: self.description,
            file_name: self.file_name,
            file_url: self.file_url,
            file_size: self.file_size,
            archive_id: self.archive_id,
            uploaded_by: self.uploaded_by,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Request to upload a model. The extension and name are validated by the registry.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub name: String,
    pub description: String,
    /// Client-side file name; only its final path component is kept.
    pub original_file_name: String,
    pub archive_id: Option<u64>,
    pub content: Vec<u8>,
}
