//! SQLite relational index of model metadata.
//!
//! Writes here are best-effort: the registry logs failures and keeps serving
//! from the in-memory index. An index constructed with [`RelationalIndex::unavailable`]
//! fails every call with [`VaultError::StoreUnavailable`].

use crate::config::StoreConfig;
use crate::error::{Result, VaultError};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// Row written for each uploaded model.
#[derive(Debug, Clone)]
pub struct ModelRow {
    pub name: String,
    pub description: String,
    pub file_name: String,
    pub file_url: String,
    pub file_size: u64,
    pub archive_id: Option<u64>,
    pub uploaded_by: Option<u64>,
}

/// Where a model's file lives, as recorded by the relational index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelLocation {
    pub file_name: String,
    pub file_url: String,
    pub archive_id: Option<u64>,
}

/// Durable model table backed by SQLite.
pub struct RelationalIndex {
    db_path: Option<PathBuf>,
    conn: Option<Arc<Mutex<Connection>>>,
}

impl RelationalIndex {
    /// Create or open the index at the given path.
    pub fn open(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| VaultError::io_with_path(e, parent))?;
            }
        }

        let conn = Connection::open(&db_path)?;
        Self::configure_connection(&conn)?;
        Self::ensure_schema(&conn)?;

        debug!("Opened relational index at {}", db_path.display());
        Ok(Self {
            db_path: Some(db_path),
            conn: Some(Arc::new(Mutex::new(conn))),
        })
    }

    /// Open a private in-memory database.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::ensure_schema(&conn)?;
        Ok(Self {
            db_path: None,
            conn: Some(Arc::new(Mutex::new(conn))),
        })
    }

    /// An index with no connection. Every operation reports `StoreUnavailable`.
    pub fn unavailable() -> Self {
        Self {
            db_path: None,
            conn: None,
        }
    }

    pub fn is_available(&self) -> bool {
        self.conn.is_some()
    }

    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    fn configure_connection(conn: &Connection) -> Result<()> {
        conn.execute_batch(&format!(
            "
            PRAGMA journal_mode=WAL;
            PRAGMA busy_timeout={};
            PRAGMA synchronous=NORMAL;
            PRAGMA foreign_keys=ON;
            ",
            StoreConfig::BUSY_TIMEOUT_MS
        ))?;
        Ok(())
    }

    fn ensure_schema(conn: &Connection) -> Result<()> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS models (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                file_name TEXT NOT NULL,
                file_url TEXT NOT NULL,
                file_size INTEGER NOT NULL DEFAULT 0,
                archive_id INTEGER,
                uploaded_by INTEGER,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_models_file_url ON models(file_url)",
            [],
        )?;

        Ok(())
    }

    fn lock_conn(&self) -> Result<MutexGuard<'_, Connection>> {
        let conn = self.conn.as_ref().ok_or_else(|| VaultError::StoreUnavailable {
            message: "Relational index is not initialized".to_string(),
            source: None,
        })?;

        conn.lock().map_err(|_| VaultError::StoreUnavailable {
            message: "Failed to acquire connection lock".to_string(),
            source: None,
        })
    }

    // ========================================
    // Models
    // ========================================

    /// Insert a model row and return the generated id.
    pub fn insert_model(&self, row: &ModelRow) -> Result<u64> {
        let conn = self.lock_conn()?;

        conn.execute(
            "INSERT INTO models (name, description, file_name, file_url, file_size,
                                 archive_id, uploaded_by, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, CURRENT_TIMESTAMP, CURRENT_TIMESTAMP)",
            params![
                row.name,
                row.description,
                row.file_name,
                row.file_url,
                to_sql_int(row.file_size)?,
                row.archive_id.map(to_sql_int).transpose()?,
                row.uploaded_by.map(to_sql_int).transpose()?,
            ],
        )?;

        let id = u64::try_from(conn.last_insert_rowid()).map_err(|_| {
            VaultError::StoreUnavailable {
                message: "Relational index returned a negative id".to_string(),
                source: None,
            }
        })?;

        debug!("Inserted model row {}", id);
        Ok(id)
    }

    /// Fetch the stored location of a model.
    pub fn model_location(&self, id: u64) -> Result<Option<ModelLocation>> {
        let conn = self.lock_conn()?;
        Self::query_location(&conn, id)
    }

    /// Delete a model row, returning where its file lived.
    ///
    /// `Ok(None)` means no row existed.
    pub fn delete_model(&self, id: u64) -> Result<Option<ModelLocation>> {
        let conn = self.lock_conn()?;

        let Some(location) = Self::query_location(&conn, id)? else {
            return Ok(None);
        };
        conn.execute("DELETE FROM models WHERE id = ?1", params![to_sql_int(id)?])?;

        debug!("Deleted model row {}", id);
        Ok(Some(location))
    }

    /// Delete the rows recorded for the given file URLs, returning the count.
    ///
    /// A file URL names exactly one stored file. Archive ids and in-memory
    /// model ids are reassigned on restart, so cascades match on the URL.
    pub fn delete_by_file_urls(&self, file_urls: &[&str]) -> Result<usize> {
        let mut conn = self.lock_conn()?;
        let tx = conn.transaction()?;

        let mut removed = 0;
        {
            let mut stmt = tx.prepare("DELETE FROM models WHERE file_url = ?1")?;
            for url in file_urls {
                removed += stmt.execute(params![url])?;
            }
        }
        tx.commit()?;

        debug!("Deleted {} model rows by file URL", removed);
        Ok(removed)
    }

    /// Number of model rows.
    pub fn model_count(&self) -> Result<usize> {
        let conn = self.lock_conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM models", [], |row| row.get(0))?;
        Ok(count.max(0) as usize)
    }

    fn query_location(conn: &Connection, id: u64) -> Result<Option<ModelLocation>> {
        let location = conn
            .query_row(
                "SELECT file_name, file_url, archive_id FROM models WHERE id = ?1",
                params![to_sql_int(id)?],
                |row| {
                    let archive_id: Option<i64> = row.get(2)?;
                    Ok(ModelLocation {
                        file_name: row.get(0)?,
                        file_url: row.get(1)?,
                        archive_id: archive_id.and_then(|v| u64::try_from(v).ok()),
                    })
                },
            )
            .optional()?;
        Ok(location)
    }

    // ========================================
    // Archives
    // ========================================

    /// Name of an archive from an operator-provisioned `archives` table.
    ///
    /// The registry never creates that table, so on a stock database this
    /// fails and callers fall back to the in-memory name.
    pub fn archive_name(&self, id: u64) -> Result<Option<String>> {
        let conn = self.lock_conn()?;
        let name = conn
            .query_row(
                "SELECT name FROM archives WHERE id = ?1",
                params![to_sql_int(id)?],
                |row| row.get(0),
            )
            .optional()?;
        Ok(name)
    }
}

fn to_sql_int(value: u64) -> Result<i64> {
    i64::try_from(value).map_err(|_| VaultError::StoreUnavailable {
        message: format!("Value {} does not fit in an SQLite integer", value),
        source: None,
    })
}
