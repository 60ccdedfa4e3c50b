//! Filesystem blob store holding the asset bytes.
//!
//! Layout under the data root:
//! - `uploads/<file>`: unscoped uploads
//! - `model_archives/<archive>/<file>`: archive-scoped uploads
//! - `model_archives/<archive>/token.txt`: archive recovery credential
//!
//! Every write lands in a temporary sibling first, is synced, then renamed
//! into place, so a failed write never leaves a partial asset behind.

use crate::config::PathsConfig;
use crate::error::{Result, VaultError};
use crate::naming::stored_file_name;
use chrono::Utc;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::debug;
use walkdir::WalkDir;

/// Upper bound on prefix bumps when reserving a stored file name.
const MAX_NAME_ATTEMPTS: i64 = 1024;

/// Distinguishes temp files written concurrently by this process.
static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A file found by [`BlobStore::list`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobEntry {
    /// Path relative to the listed directory.
    pub relative_path: PathBuf,
    pub size: u64,
}

impl BlobEntry {
    /// File name of a top-level entry; `None` for nested or non-UTF-8 paths.
    pub fn top_level_name(&self) -> Option<&str> {
        let mut components = self.relative_path.components();
        let first = components.next()?;
        if components.next().is_some() {
            return None;
        }
        first.as_os_str().to_str()
    }
}

/// Result of persisting an upload under a collision-free name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    pub file_name: String,
    /// Path relative to the store root.
    pub relative_path: PathBuf,
    pub size: u64,
}

/// Directory tree of asset files rooted at the data directory.
#[derive(Debug, Clone)]
pub struct BlobStore {
    root: PathBuf,
}

impl BlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    // ========================================
    // Layout
    // ========================================

    /// Relative directory for unscoped uploads.
    pub fn uploads_dir() -> PathBuf {
        PathBuf::from(PathsConfig::UPLOADS_DIR_NAME)
    }

    /// Relative directory holding every archive.
    pub fn archives_dir() -> PathBuf {
        PathBuf::from(PathsConfig::ARCHIVES_DIR_NAME)
    }

    /// Relative directory of one archive.
    pub fn archive_dir(archive_name: &str) -> PathBuf {
        Self::archives_dir().join(archive_name)
    }

    /// Relative path of an archive's recovery credential.
    pub fn archive_token_path(archive_name: &str) -> PathBuf {
        Self::archive_dir(archive_name).join(PathsConfig::ARCHIVE_TOKEN_FILENAME)
    }

    /// Absolute path for a store-relative path.
    pub fn absolute(&self, relative: &Path) -> PathBuf {
        self.root.join(relative)
    }

    // ========================================
    // Writes
    // ========================================

    /// Create a directory (and parents) if missing.
    pub async fn ensure_dir(&self, relative: &Path) -> Result<PathBuf> {
        let path = self.absolute(relative);
        fs::create_dir_all(&path)
            .await
            .map_err(|e| VaultError::io_with_path(e, &path))?;
        Ok(path)
    }

    /// Write `bytes` to `relative`, replacing any existing file.
    ///
    /// Returns the number of bytes written.
    pub async fn write(&self, relative: &Path, bytes: &[u8]) -> Result<u64> {
        let path = self.absolute(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| VaultError::io_with_path(e, parent))?;
        }
        write_replacing(&path, bytes).await
    }

    /// Persist an upload inside `dir` as `<unix-seconds>_<original>`.
    ///
    /// The final name is reserved with an exclusive create before any bytes
    /// are written; if it is taken, the numeric prefix moves forward until a
    /// free name is found. On failure nothing is left on disk.
    pub async fn write_unique(
        &self,
        dir: &Path,
        original: &str,
        bytes: &[u8],
    ) -> Result<StoredBlob> {
        let base = Utc::now().timestamp();

        for bump in 0..MAX_NAME_ATTEMPTS {
            let file_name = stored_file_name(base + bump, original);
            let relative_path = dir.join(&file_name);
            let path = self.absolute(&relative_path);

            match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(reservation) => {
                    drop(reservation);
                    return match write_replacing(&path, bytes).await {
                        Ok(size) => Ok(StoredBlob {
                            file_name,
                            relative_path,
                            size,
                        }),
                        Err(e) => {
                            let _ = fs::remove_file(&path).await;
                            Err(e)
                        }
                    };
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(VaultError::io_with_path(e, &path)),
            }
        }

        Err(VaultError::Io {
            message: format!(
                "No free file name for {} after {} attempts",
                original, MAX_NAME_ATTEMPTS
            ),
            path: Some(self.absolute(dir)),
            source: None,
        })
    }

    // ========================================
    // Reads
    // ========================================

    /// Read a small text file, `None` if it does not exist.
    pub async fn read_to_string(&self, relative: &Path) -> Result<Option<String>> {
        let path = self.absolute(relative);
        match fs::read_to_string(&path).await {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(VaultError::io_with_path(e, &path)),
        }
    }

    /// Size of a regular file, `None` if it is missing or not a file.
    pub async fn file_size(&self, relative: &Path) -> Result<Option<u64>> {
        let path = self.absolute(relative);
        match fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => Ok(Some(meta.len())),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(VaultError::io_with_path(e, &path)),
        }
    }

    /// Every regular file under `relative`, recursively, sorted by path.
    ///
    /// A missing directory lists as empty. Unreadable entries are skipped.
    pub fn list(&self, relative: &Path) -> Result<Vec<BlobEntry>> {
        let dir = self.absolute(relative);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let entries = WalkDir::new(&dir)
            .min_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter_map(|e| {
                let size = e.metadata().ok()?.len();
                let relative_path = e.path().strip_prefix(&dir).ok()?.to_path_buf();
                Some(BlobEntry {
                    relative_path,
                    size,
                })
            })
            .collect();

        Ok(entries)
    }

    /// Names of the immediate subdirectories of `relative`, sorted.
    pub fn subdirectories(&self, relative: &Path) -> Result<Vec<String>> {
        let dir = self.absolute(relative);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let names = WalkDir::new(&dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_dir())
            .filter_map(|e| e.file_name().to_str().map(String::from))
            .collect();

        Ok(names)
    }

    // ========================================
    // Removal
    // ========================================

    /// Remove one file. A missing file is reported as [`VaultError::FileNotFound`].
    pub async fn remove(&self, relative: &Path) -> Result<()> {
        let path = self.absolute(relative);
        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!("Removed blob {}", relative.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(VaultError::FileNotFound(relative.to_path_buf()))
            }
            Err(e) => Err(VaultError::io_with_path(e, &path)),
        }
    }

    /// Remove a directory tree. A missing directory is not an error.
    pub async fn remove_dir_all(&self, relative: &Path) -> Result<()> {
        let path = self.absolute(relative);
        match fs::remove_dir_all(&path).await {
            Ok(()) => {
                debug!("Removed directory {}", relative.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(VaultError::io_with_path(e, &path)),
        }
    }
}

/// Write through a synced temp sibling and rename over `path`.
async fn write_replacing(path: &Path, bytes: &[u8]) -> Result<u64> {
    let temp_path = temp_sibling(path);

    let written = async {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)
            .await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        file.sync_all().await?;
        fs::rename(&temp_path, path).await
    }
    .await;

    if let Err(e) = written {
        let _ = fs::remove_file(&temp_path).await;
        return Err(VaultError::io_with_path(e, path));
    }

    debug!("Wrote {} bytes to {}", bytes.len(), path.display());
    Ok(bytes.len() as u64)
}

fn temp_sibling(path: &Path) -> PathBuf {
    let n = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(
        ".{}.{}.{}{}",
        file_name,
        process::id(),
        n,
        PathsConfig::TEMP_SUFFIX
    ))
}
