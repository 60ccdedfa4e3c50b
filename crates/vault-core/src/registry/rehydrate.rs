//! Rebuild the in-memory index from the directory tree.
//!
//! Archives have no durable table, so after a restart the only record of them
//! is `model_archives/<name>/token.txt`. Models found on disk are matched to
//! existing entries by file name alone, which makes a second pass over an
//! unchanged tree a no-op.

use super::service::{generate_token, Registry};
use crate::blob::{BlobEntry, BlobStore};
use crate::config::{RegistryConfig, RoutesConfig};
use crate::error::Result;
use crate::index::PresenceScope;
use crate::models::{Archive, ModelDraft};
use crate::naming;
use serde::Serialize;

/// What a rehydration pass added.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RehydrationReport {
    pub archives_added: usize,
    pub models_added: usize,
}

impl Registry {
    /// Register every archive and model on disk that is not yet indexed.
    pub async fn rehydrate(&self) -> Result<RehydrationReport> {
        tracing::info!("Rehydrating registry from {}", self.data_root().display());
        let mut report = RehydrationReport::default();

        // Unscoped uploads
        for entry in self.blobs.list(&BlobStore::uploads_dir())? {
            let Some(file_name) = accepted_file(&entry) else {
                continue;
            };
            let draft = discovered_model(
                file_name,
                entry.size,
                None,
                RoutesConfig::upload_url(file_name),
            );
            if self
                .memory
                .insert_model_unless_present(draft, PresenceScope::AnyDirectory)
                .is_some()
            {
                report.models_added += 1;
            }
        }

        // Archives
        for name in self.blobs.subdirectories(&BlobStore::archives_dir())? {
            if !naming::is_safe_file_name(&name) {
                continue;
            }

            let archive = match self.memory.archive_by_name(&name) {
                Some(archive) => archive,
                None => match self.recover_archive(&name).await? {
                    Some(archive) => {
                        report.archives_added += 1;
                        archive
                    }
                    None => continue,
                },
            };

            for entry in self.blobs.list(&BlobStore::archive_dir(&archive.name))? {
                let Some(file_name) = accepted_file(&entry) else {
                    continue;
                };
                let draft = discovered_model(
                    file_name,
                    entry.size,
                    Some(archive.id),
                    RoutesConfig::archive_file_url(&archive.name, file_name),
                );
                if self
                    .memory
                    .insert_model_unless_present(draft, PresenceScope::Archive(archive.id))
                    .is_some()
                {
                    report.models_added += 1;
                }
            }
        }

        tracing::info!(
            "Rehydrated {} archives and {} models",
            report.archives_added,
            report.models_added
        );
        Ok(report)
    }

    /// Register an archive directory, reading or minting its token.
    async fn recover_archive(&self, name: &str) -> Result<Option<Archive>> {
        let token_path = BlobStore::archive_token_path(name);

        let stored = self
            .blobs
            .read_to_string(&token_path)
            .await?
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());

        let token = match stored {
            Some(token) => token,
            None => {
                let token = generate_token();
                if let Err(e) = self.blobs.write(&token_path, token.as_bytes()).await {
                    tracing::warn!("Could not persist token for archive {}: {}", name, e);
                }
                token
            }
        };

        match self.memory.insert_archive(name, token) {
            Ok(archive) => Ok(Some(archive)),
            Err(e) => {
                tracing::warn!("Skipping archive directory {}: {}", name, e);
                Ok(None)
            }
        }
    }
}

/// Top-level file name of an entry with an accepted extension.
fn accepted_file(entry: &BlobEntry) -> Option<&str> {
    let file_name = entry.top_level_name()?;
    naming::accepted_extension(file_name)?;
    Some(file_name)
}

fn discovered_model(
    file_name: &str,
    size: u64,
    archive_id: Option<u64>,
    file_url: String,
) -> ModelDraft {
    ModelDraft {
        name: naming::display_name_from_file(file_name),
        description: String::new(),
        file_name: file_name.to_string(),
        file_url,
        file_size: size,
        archive_id,
        uploaded_by: Some(RegistryConfig::FALLBACK_UPLOADER_ID),
    }
}
