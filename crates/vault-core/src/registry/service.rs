//! Registry service: the commands exposed to the routing layer.
//!
//! Every mutating command follows the same order: blob write, then the
//! relational insert, then the in-memory insert. The relational index is
//! best-effort; its failures are logged and the command carries on with the
//! in-memory index alone. The in-memory lock is never held across I/O, so a
//! concurrent reader may briefly see a file on disk that is not yet listed,
//! or a listing that no longer has a file behind it.

use crate::blob::BlobStore;
use crate::config::{RegistryConfig, RoutesConfig};
use crate::error::{Result, VaultError};
use crate::index::{MemoryIndex, ModelLocation, ModelRow, RelationalIndex};
use crate::models::{
    Archive, ArchiveDeletion, ArchiveSummary, ModelDraft, ModelView, Principal, Role,
    UploadRequest, User, UserProfile,
};
use crate::naming;
use chrono::Utc;
use std::future::Future;
use std::path::{Path, PathBuf};

/// Registry of 3D models and token-gated archives.
///
/// Owns its state; construct one per data root with
/// [`RegistryBuilder`](crate::RegistryBuilder).
pub struct Registry {
    pub(super) blobs: BlobStore,
    pub(super) relational: RelationalIndex,
    pub(super) memory: MemoryIndex,
}

impl Registry {
    pub(crate) fn from_parts(blobs: BlobStore, relational: RelationalIndex) -> Self {
        Self {
            blobs,
            relational,
            memory: MemoryIndex::new(),
        }
    }

    /// Root directory of the blob store.
    pub fn data_root(&self) -> &Path {
        self.blobs.root()
    }

    /// Whether uploads are also being recorded in the relational index.
    pub fn has_relational_index(&self) -> bool {
        self.relational.is_available()
    }

    pub fn model_count(&self) -> usize {
        self.memory.model_count()
    }

    pub fn archive_count(&self) -> usize {
        self.memory.archive_count()
    }

    /// Id the next model will receive unless an external id is adopted.
    pub fn next_model_id(&self) -> u64 {
        self.memory.next_model_id()
    }

    // ========================================
    // Accounts
    // ========================================

    /// Register a `user`-role account.
    ///
    /// `credential_hash` is opaque to the registry; the authentication
    /// boundary produces and verifies it.
    pub fn register(&self, email: &str, credential_hash: String) -> Result<UserProfile> {
        let email = email.trim();
        if email.is_empty() || !email.contains('@') {
            return Err(VaultError::validation("email", "A valid email is required"));
        }

        let user = self.memory.insert_user(email, credential_hash, Role::User)?;
        Ok(UserProfile::from(&user))
    }

    /// Insert an account with an explicit role, used for bootstrap users.
    pub fn seed_user(&self, email: &str, credential_hash: String, role: Role) -> Result<User> {
        self.memory.insert_user(email, credential_hash, role)
    }

    /// Resolve an account login into a principal.
    ///
    /// `verify` receives the stored credential hash and may run a slow KDF.
    /// Unknown emails and rejected credentials fail the same way.
    pub async fn login<F, Fut>(&self, email: &str, verify: F) -> Result<Principal>
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = bool>,
    {
        let user = self
            .memory
            .user_by_email(email.trim())
            .ok_or(VaultError::InvalidCredentials)?;

        if !verify(user.credential_hash.clone()).await {
            return Err(VaultError::InvalidCredentials);
        }

        tracing::debug!("User {} logged in", user.id);
        Ok(Principal::for_user(&user))
    }

    /// Account details for a logged-in user.
    pub fn profile(&self, principal: &Principal) -> Result<UserProfile> {
        let user_id = principal
            .user_id()
            .ok_or_else(|| VaultError::forbidden("view profiles with an archive token"))?;
        let user = self
            .memory
            .user(user_id)
            .ok_or(VaultError::UserNotFound { id: user_id })?;
        Ok(UserProfile::from(&user))
    }

    // ========================================
    // Models
    // ========================================

    /// Persist an uploaded asset and register it.
    ///
    /// A failure writing the file is fatal and registers nothing. A failure
    /// recording the upload in the relational index is logged only.
    pub async fn upload_model(
        &self,
        principal: &Principal,
        request: UploadRequest,
    ) -> Result<ModelView> {
        let uploader = principal.require_admin("upload models")?;

        let original = naming::client_file_name(&request.original_file_name)?;
        if !naming::has_upload_extension(&original) {
            return Err(VaultError::validation(
                "file",
                "Only .glb and .gltf files are allowed",
            ));
        }

        let name = request.name.trim();
        if name.is_empty() {
            return Err(VaultError::validation("name", "Model name is required"));
        }

        let archive = match request.archive_id {
            Some(id) => Some(self.memory.archive(id).ok_or_else(|| {
                VaultError::ArchiveNotFound {
                    archive: id.to_string(),
                }
            })?),
            None => None,
        };

        let dir = match &archive {
            Some(a) => BlobStore::archive_dir(&a.name),
            None => BlobStore::uploads_dir(),
        };
        self.blobs.ensure_dir(&dir).await?;
        let stored = self
            .blobs
            .write_unique(&dir, &original, &request.content)
            .await?;

        let file_url = match &archive {
            Some(a) => RoutesConfig::archive_file_url(&a.name, &stored.file_name),
            None => RoutesConfig::upload_url(&stored.file_name),
        };

        let row = ModelRow {
            name: name.to_string(),
            description: request.description.clone(),
            file_name: stored.file_name.clone(),
            file_url: file_url.clone(),
            file_size: stored.size,
            archive_id: request.archive_id,
            uploaded_by: Some(uploader),
        };
        let external_id = match self.relational.insert_model(&row) {
            Ok(id) => Some(id),
            Err(e) => {
                tracing::warn!("Upload of {} not recorded durably: {}", stored.file_name, e);
                None
            }
        };

        let model = self.memory.insert_model(
            ModelDraft {
                name: row.name,
                description: row.description,
                file_name: row.file_name,
                file_url,
                file_size: stored.size,
                archive_id: request.archive_id,
                uploaded_by: Some(uploader),
            },
            external_id,
        );

        tracing::info!(
            "Uploaded model {} ({} bytes) as {}",
            model.id,
            model.file_size,
            model.file_name
        );

        let email = self.memory.user(uploader).map(|u| u.email);
        Ok(ModelView::new(&model, email))
    }

    /// Models visible to `principal`, ordered by id.
    ///
    /// An archive-scoped principal only ever sees its own archive, whatever
    /// filter it asks for.
    pub fn list_models(
        &self,
        principal: Option<&Principal>,
        archive_filter: Option<u64>,
    ) -> Vec<ModelView> {
        let scope = principal
            .and_then(Principal::archive_scope)
            .or(archive_filter);
        self.memory.list_models(scope)
    }

    /// Delete a model and its file.
    ///
    /// Works with the relational index unavailable: the location then comes
    /// from the in-memory entry.
    pub async fn delete_model(&self, principal: &Principal, id: u64) -> Result<()> {
        let admin_id = principal.require_admin("delete models")?;
        let still_admin = self
            .memory
            .user(admin_id)
            .is_some_and(|u| u.role == Role::Admin);
        if !still_admin {
            return Err(VaultError::forbidden("delete models"));
        }

        // Relational rows keep the model and archive ids of the boot that
        // wrote them, so the cached entry wins whenever there is one.
        let (location, dir) = match self.memory.model(id) {
            Some(model) => {
                let dir = model_dir(model.archive_id, |archive_id| {
                    self.memory.archive(archive_id).map(|a| a.name)
                });
                let location = ModelLocation {
                    file_name: model.file_name,
                    file_url: model.file_url,
                    archive_id: model.archive_id,
                };
                (location, dir)
            }
            None => {
                let recorded = match self.relational.model_location(id) {
                    Ok(location) => location,
                    Err(e) => {
                        tracing::warn!("Relational lookup of model {} failed: {}", id, e);
                        None
                    }
                };
                let location = recorded.ok_or(VaultError::ModelNotFound { id })?;
                let dir = model_dir(location.archive_id, |archive_id| {
                    match self.relational.archive_name(archive_id) {
                        Ok(Some(name)) => Some(name),
                        _ => self.memory.archive(archive_id).map(|a| a.name),
                    }
                });
                (location, dir)
            }
        };
        let path = dir
            .filter(|_| naming::is_safe_file_name(&location.file_name))
            .map(|dir| dir.join(&location.file_name));

        // Matching on the URL leaves rows of other uploads that reuse this id alone
        if self.relational.is_available() {
            if let Err(e) = self.relational.delete_by_file_urls(&[&location.file_url]) {
                tracing::warn!("Failed to delete relational row for model {}: {}", id, e);
            }
        }
        self.memory.remove_model(id);

        match path {
            Some(path) => match self.blobs.remove(&path).await {
                Ok(()) => {}
                Err(VaultError::FileNotFound(_)) => {
                    tracing::debug!("File for model {} was already gone", id);
                }
                Err(e) => tracing::warn!("Model {} deleted but file left on disk: {}", id, e),
            },
            None => tracing::warn!(
                "Model {} deleted but its file {} could not be located",
                id,
                location.file_name
            ),
        }

        tracing::info!("Deleted model: {}", id);
        Ok(())
    }

    // ========================================
    // Archives
    // ========================================

    /// Create an archive with a fresh access token.
    ///
    /// The name defaults to `ARSIP_<unix-seconds>`. The token is also written
    /// to `token.txt` in the archive directory so it survives restarts.
    pub async fn create_archive(
        &self,
        principal: &Principal,
        name: Option<&str>,
    ) -> Result<Archive> {
        principal.require_admin("create archives")?;

        let raw = match name.map(str::trim) {
            Some(n) if !n.is_empty() => n.to_string(),
            _ => naming::default_archive_name(Utc::now().timestamp()),
        };
        let name = naming::sanitize_archive_name(&raw)?;

        // Reserving the name first keeps two concurrent creates from both
        // writing token.txt.
        let archive = self.memory.insert_archive(&name, generate_token())?;

        let written = async {
            self.blobs.ensure_dir(&BlobStore::archive_dir(&name)).await?;
            self.blobs
                .write(&BlobStore::archive_token_path(&name), archive.token.as_bytes())
                .await
        }
        .await;

        if let Err(e) = written {
            self.memory.remove_archive(archive.id);
            return Err(e);
        }

        tracing::info!("Created archive {} ({})", archive.id, archive.name);
        Ok(archive)
    }

    /// Every archive with its token and model count.
    pub fn list_archives(&self, principal: &Principal) -> Result<Vec<ArchiveSummary>> {
        principal.require_admin("list archives")?;
        Ok(self
            .memory
            .list_archives()
            .iter()
            .map(|(archive, count)| ArchiveSummary::new(archive, *count))
            .collect())
    }

    /// Delete an archive, its models and its directory.
    ///
    /// File removal is best-effort; anything left behind is reported in
    /// [`ArchiveDeletion::orphaned_files`].
    pub async fn delete_archive(&self, principal: &Principal, id: u64) -> Result<ArchiveDeletion> {
        principal.require_admin("delete archives")?;
        let archive = self.memory.archive(id).ok_or_else(|| VaultError::ArchiveNotFound {
            archive: id.to_string(),
        })?;
        let dir = BlobStore::archive_dir(&archive.name);

        let removed = self.memory.remove_archive_models(id);
        let mut orphaned_files = Vec::new();

        for model in &removed {
            match self.blobs.remove(&dir.join(&model.file_name)).await {
                Ok(()) | Err(VaultError::FileNotFound(_)) => {}
                Err(e) => {
                    tracing::warn!("Failed to remove {}: {}", model.file_name, e);
                    orphaned_files.push(model.file_name.clone());
                }
            }
        }

        if let Err(e) = self.blobs.remove_dir_all(&dir).await {
            tracing::warn!("Failed to remove archive directory {}: {}", dir.display(), e);
            orphaned_files.push(archive.name.clone());
        }

        // Sweep models uploaded into the archive while it was being deleted.
        let stragglers = self
            .memory
            .remove_archive(id)
            .map(|(_, models)| models)
            .unwrap_or_default();

        if self.relational.is_available() {
            let urls: Vec<&str> = removed
                .iter()
                .chain(&stragglers)
                .map(|m| m.file_url.as_str())
                .collect();
            if let Err(e) = self.relational.delete_by_file_urls(&urls) {
                tracing::warn!("Failed to delete relational rows for archive {}: {}", id, e);
            }
        }

        tracing::info!(
            "Deleted archive {} ({} models)",
            archive.name,
            removed.len() + stragglers.len()
        );

        Ok(ArchiveDeletion {
            archive,
            models_removed: removed.len() + stragglers.len(),
            orphaned_files,
        })
    }

    /// Exchange an archive token for the archive it opens.
    pub fn archive_login(&self, token: &str) -> Result<Archive> {
        let token = token.trim();
        if token.is_empty() {
            return Err(VaultError::InvalidCredentials);
        }
        self.memory
            .archive_by_token(token)
            .ok_or(VaultError::InvalidCredentials)
    }

    /// Absolute path of a file inside the principal's archive.
    pub async fn archive_file(
        &self,
        principal: &Principal,
        archive_name: &str,
        file_name: &str,
    ) -> Result<PathBuf> {
        let Principal::ArchiveUser { archive_id, .. } = principal else {
            return Err(VaultError::forbidden("read archive files without an archive token"));
        };

        let archive = self
            .memory
            .archive(*archive_id)
            .ok_or_else(|| VaultError::forbidden("read files of a deleted archive"))?;
        if archive.name != archive_name {
            return Err(VaultError::forbidden(format!(
                "read files outside archive {}",
                archive.name
            )));
        }

        if !naming::is_safe_file_name(file_name) {
            return Err(VaultError::validation(
                "file",
                format!("Invalid file name: {}", file_name),
            ));
        }

        let relative = BlobStore::archive_dir(&archive.name).join(file_name);
        match self.blobs.file_size(&relative).await? {
            Some(_) => Ok(self.blobs.absolute(&relative)),
            None => Err(VaultError::FileNotFound(relative)),
        }
    }
}

/// Store-relative directory of a model's file.
///
/// `archive_name` resolves an archive id; unknown or unsafe names yield `None`.
fn model_dir(
    archive_id: Option<u64>,
    archive_name: impl FnOnce(u64) -> Option<String>,
) -> Option<PathBuf> {
    match archive_id {
        None => Some(BlobStore::uploads_dir()),
        Some(id) => archive_name(id)
            .filter(|name| naming::is_safe_file_name(name))
            .map(|name| BlobStore::archive_dir(&name)),
    }
}

/// Random hex access token for a new archive.
pub(super) fn generate_token() -> String {
    let bytes: [u8; RegistryConfig::ARCHIVE_TOKEN_BYTES] = rand::random();
    hex::encode(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn registry(temp_dir: &TempDir) -> Registry {
        let registry = Registry::from_parts(
            BlobStore::new(temp_dir.path()),
            RelationalIndex::in_memory().unwrap(),
        );
        registry
            .seed_user("admin@test.com", "pw".into(), Role::Admin)
            .unwrap();
        registry
            .seed_user("user@test.com", "pw".into(), Role::User)
            .unwrap();
        registry
    }

    fn admin() -> Principal {
        Principal::Admin {
            user_id: 1,
            email: "admin@test.com".into(),
        }
    }

    fn upload(name: &str, file: &str, archive_id: Option<u64>) -> UploadRequest {
        UploadRequest {
            name: name.to_string(),
            description: "desc".to_string(),
            original_file_name: file.to_string(),
            archive_id,
            content: vec![7u8; 64],
        }
    }

    #[test]
    fn test_generate_token_shape() {
        let token = generate_token();
        assert_eq!(token.len(), RegistryConfig::ARCHIVE_TOKEN_BYTES * 2);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(token, generate_token());
    }

    #[tokio::test]
    async fn test_register_and_login() {
        let temp_dir = TempDir::new().unwrap();
        let registry = registry(&temp_dir);

        let profile = registry.register("new@test.com", "hash".into()).unwrap();
        assert_eq!(profile.id, 3);
        assert_eq!(profile.role, Role::User);

        assert!(matches!(
            registry.register("new@test.com", "hash".into()),
            Err(VaultError::Conflict { .. })
        ));
        assert!(matches!(
            registry.register("not-an-email", "hash".into()),
            Err(VaultError::Validation { .. })
        ));

        let principal = registry
            .login("new@test.com", |h| async move { h == "hash" })
            .await
            .unwrap();
        assert_eq!(principal.user_id(), Some(3));
        assert!(matches!(
            registry.login("new@test.com", |_| async { false }).await,
            Err(VaultError::InvalidCredentials)
        ));
        assert!(matches!(
            registry.login("ghost@test.com", |_| async { true }).await,
            Err(VaultError::InvalidCredentials)
        ));
    }

    #[test]
    fn test_profile_rejects_archive_principal() {
        let temp_dir = TempDir::new().unwrap();
        let registry = registry(&temp_dir);

        assert_eq!(registry.profile(&admin()).unwrap().email, "admin@test.com");

        let scoped = Principal::ArchiveUser {
            archive_id: 1,
            archive_name: "Lab_A".into(),
        };
        assert!(matches!(
            registry.profile(&scoped),
            Err(VaultError::Forbidden { .. })
        ));
    }

    #[tokio::test]
    async fn test_upload_validation_precedes_side_effects() {
        let temp_dir = TempDir::new().unwrap();
        let registry = registry(&temp_dir);

        let err = registry
            .upload_model(&admin(), upload("scene", "scene.obj", None))
            .await
            .unwrap_err();
        assert!(matches!(err, VaultError::Validation { .. }));

        let err = registry
            .upload_model(&admin(), upload("scene", "scene.GLB", None))
            .await
            .unwrap_err();
        assert!(matches!(err, VaultError::Validation { .. }));

        let err = registry
            .upload_model(&admin(), upload("   ", "scene.glb", None))
            .await
            .unwrap_err();
        assert!(matches!(err, VaultError::Validation { .. }));

        let err = registry
            .upload_model(&admin(), upload("scene", "scene.glb", Some(42)))
            .await
            .unwrap_err();
        assert!(matches!(err, VaultError::ArchiveNotFound { .. }));

        let user = Principal::User {
            user_id: 2,
            email: "user@test.com".into(),
        };
        let err = registry
            .upload_model(&user, upload("scene", "scene.glb", None))
            .await
            .unwrap_err();
        assert!(matches!(err, VaultError::Forbidden { .. }));

        assert_eq!(registry.model_count(), 0);
        assert!(!temp_dir.path().join("uploads").exists());
    }

    #[tokio::test]
    async fn test_upload_adopts_relational_id() {
        let temp_dir = TempDir::new().unwrap();
        let registry = registry(&temp_dir);

        let view = registry
            .upload_model(&admin(), upload("scene", "scene.glb", None))
            .await
            .unwrap();
        assert_eq!(view.id, 1);
        assert_eq!(view.file_size, 64);
        assert_eq!(view.uploaded_by.as_deref(), Some("admin@test.com"));
        assert!(view.file_url.starts_with("/uploads/"));
        assert!(temp_dir.path().join("uploads").join(&view.file_name).exists());
        assert_eq!(registry.next_model_id(), 2);
    }

    #[tokio::test]
    async fn test_delete_keeps_mismatched_relational_row() {
        let temp_dir = TempDir::new().unwrap();
        let registry = registry(&temp_dir);
        let uploads = temp_dir.path().join("uploads");
        std::fs::create_dir_all(&uploads).unwrap();
        std::fs::write(uploads.join("1_other.glb"), b"other").unwrap();
        std::fs::write(uploads.join("local.glb"), b"local").unwrap();

        // Row 1 was written by an earlier run; memory id 1 went to a file found on disk
        registry
            .relational
            .insert_model(&ModelRow {
                name: "other".into(),
                description: String::new(),
                file_name: "1_other.glb".into(),
                file_url: "/uploads/1_other.glb".into(),
                file_size: 5,
                archive_id: None,
                uploaded_by: Some(1),
            })
            .unwrap();
        let local = registry.memory.insert_model(
            ModelDraft {
                name: "local".into(),
                description: String::new(),
                file_name: "local.glb".into(),
                file_url: "/uploads/local.glb".into(),
                file_size: 5,
                archive_id: None,
                uploaded_by: Some(1),
            },
            None,
        );
        assert_eq!(local.id, 1);

        registry.delete_model(&admin(), local.id).await.unwrap();
        assert!(!uploads.join("local.glb").exists());
        assert!(uploads.join("1_other.glb").exists());
        assert_eq!(registry.relational.model_count().unwrap(), 1);
        assert_eq!(registry.model_count(), 0);
    }

    #[tokio::test]
    async fn test_delete_requires_existing_admin() {
        let temp_dir = TempDir::new().unwrap();
        let registry = registry(&temp_dir);

        let err = registry.delete_model(&admin(), 9).await.unwrap_err();
        assert!(matches!(err, VaultError::ModelNotFound { id: 9 }));

        let stale = Principal::Admin {
            user_id: 2,
            email: "user@test.com".into(),
        };
        let err = registry.delete_model(&stale, 9).await.unwrap_err();
        assert!(matches!(err, VaultError::Forbidden { .. }));
    }

    #[tokio::test]
    async fn test_archive_file_access_rules() {
        let temp_dir = TempDir::new().unwrap();
        let registry = registry(&temp_dir);

        let archive = registry
            .create_archive(&admin(), Some("Lab A"))
            .await
            .unwrap();
        assert_eq!(archive.name, "Lab_A");
        let token_path = temp_dir.path().join("model_archives/Lab_A/token.txt");
        assert_eq!(std::fs::read_to_string(token_path).unwrap(), archive.token);

        let view = registry
            .upload_model(&admin(), upload("scene", "scene.glb", Some(archive.id)))
            .await
            .unwrap();

        let scoped = registry.archive_login(&archive.token).unwrap();
        let principal = Principal::for_archive(&scoped);

        let path = registry
            .archive_file(&principal, "Lab_A", &view.file_name)
            .await
            .unwrap();
        assert_eq!(std::fs::metadata(path).unwrap().len(), 64);

        assert!(matches!(
            registry.archive_file(&principal, "Lab_B", &view.file_name).await,
            Err(VaultError::Forbidden { .. })
        ));
        assert!(matches!(
            registry.archive_file(&principal, "Lab_A", "../token.txt").await,
            Err(VaultError::Validation { .. })
        ));
        assert!(matches!(
            registry.archive_file(&principal, "Lab_A", "missing.glb").await,
            Err(VaultError::FileNotFound(_))
        ));
        assert!(matches!(
            registry.archive_file(&admin(), "Lab_A", &view.file_name).await,
            Err(VaultError::Forbidden { .. })
        ));
    }

    #[tokio::test]
    async fn test_duplicate_archive_name_conflicts() {
        let temp_dir = TempDir::new().unwrap();
        let registry = registry(&temp_dir);

        registry.create_archive(&admin(), Some("Lab_A")).await.unwrap();
        let err = registry
            .create_archive(&admin(), Some(" Lab A "))
            .await
            .unwrap_err();
        assert!(matches!(err, VaultError::Conflict { .. }));

        let default = registry.create_archive(&admin(), None).await.unwrap();
        assert!(default.name.starts_with("ARSIP_"));
        assert_eq!(registry.archive_count(), 2);
    }

    #[test]
    fn test_archive_login_rejects_unknown_tokens() {
        let temp_dir = TempDir::new().unwrap();
        let registry = registry(&temp_dir);
        assert!(matches!(
            registry.archive_login(""),
            Err(VaultError::InvalidCredentials)
        ));
        assert!(matches!(
            registry.archive_login("deadbeef"),
            Err(VaultError::InvalidCredentials)
        ));
    }
}
