//! Builder for configuring Registry initialization.

use std::path::PathBuf;

use crate::blob::BlobStore;
use crate::error::{Result, VaultError};
use crate::index::RelationalIndex;
use crate::models::Role;
use crate::registry::Registry;

/// Builder for configuring [`Registry`] initialization.
///
/// # Example
///
/// ```rust,no_run
/// use model_vault::Registry;
///
/// # async fn run() -> model_vault::Result<()> {
/// let registry = Registry::builder("./data")
///     .db_path(Some("./3d_db.db".into()))
///     .auto_create_dirs(true)
///     .build()
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct RegistryBuilder {
    data_root: PathBuf,
    db_path: Option<PathBuf>,
    auto_create_dirs: bool,
    rehydrate: bool,
    seed_users: Vec<(String, String, Role)>,
}

impl RegistryBuilder {
    /// Create a new builder with the data root directory.
    pub fn new(data_root: impl Into<PathBuf>) -> Self {
        Self {
            data_root: data_root.into(),
            db_path: None,
            auto_create_dirs: true,
            rehydrate: true,
            seed_users: Vec::new(),
        }
    }

    /// Path of the SQLite database backing the relational index.
    ///
    /// With `None` the registry runs on the in-memory index alone.
    ///
    /// Default: `None`
    pub fn db_path(mut self, path: Option<PathBuf>) -> Self {
        self.db_path = path;
        self
    }

    /// Create `uploads/` and `model_archives/` under the data root if missing.
    ///
    /// Default: `true`
    pub fn auto_create_dirs(mut self, enable: bool) -> Self {
        self.auto_create_dirs = enable;
        self
    }

    /// Scan the data root and index what is already on disk.
    ///
    /// Default: `true`
    pub fn rehydrate(mut self, enable: bool) -> Self {
        self.rehydrate = enable;
        self
    }

    /// Add an account before rehydration runs, so discovered models can be
    /// attributed to it.
    pub fn with_user(
        mut self,
        email: impl Into<String>,
        credential_hash: impl Into<String>,
        role: Role,
    ) -> Self {
        self.seed_users
            .push((email.into(), credential_hash.into(), role));
        self
    }

    /// Build the Registry instance.
    ///
    /// A database that cannot be opened is logged and the registry starts
    /// in degraded mode; a failed rehydration is logged the same way.
    pub async fn build(self) -> Result<Registry> {
        let blobs = BlobStore::new(&self.data_root);

        if self.auto_create_dirs {
            blobs.ensure_dir(&BlobStore::uploads_dir()).await?;
            blobs.ensure_dir(&BlobStore::archives_dir()).await?;
        } else if !self.data_root.is_dir() {
            return Err(VaultError::Io {
                message: format!("Data root does not exist: {}", self.data_root.display()),
                path: Some(self.data_root.clone()),
                source: None,
            });
        }

        let relational = match &self.db_path {
            Some(path) => match RelationalIndex::open(path) {
                Ok(index) => index,
                Err(e) => {
                    tracing::warn!(
                        "Failed to open relational index at {}: {}; continuing without it",
                        path.display(),
                        e
                    );
                    RelationalIndex::unavailable()
                }
            },
            None => RelationalIndex::unavailable(),
        };

        let registry = Registry::from_parts(blobs, relational);

        for (email, credential_hash, role) in self.seed_users {
            registry.seed_user(&email, credential_hash, role)?;
        }

        if self.rehydrate {
            if let Err(e) = registry.rehydrate().await {
                tracing::warn!("Failed to rehydrate registry on startup: {}", e);
            }
        }

        Ok(registry)
    }
}

impl Registry {
    /// Start configuring a registry rooted at `data_root`.
    pub fn builder(data_root: impl Into<PathBuf>) -> RegistryBuilder {
        RegistryBuilder::new(data_root)
    }
}
