//! Centralized configuration for the model vault.
//!
//! Directory names, URL routes and store tuning live here so the blob store,
//! the rehydrator and the registry agree on a single layout.

/// On-disk layout of the blob store, relative to the data root.
pub struct PathsConfig;

impl PathsConfig {
    /// Unscoped uploads.
    pub const UPLOADS_DIR_NAME: &'static str = "uploads";
    /// Parent of every archive directory.
    pub const ARCHIVES_DIR_NAME: &'static str = "model_archives";
    /// Recovery credential written inside each archive directory.
    pub const ARCHIVE_TOKEN_FILENAME: &'static str = "token.txt";
    /// Default SQLite database filename.
    pub const DEFAULT_DB_FILENAME: &'static str = "3d_db.db";
    /// Suffix for in-flight blob writes.
    pub const TEMP_SUFFIX: &'static str = ".part";
}

/// Registry behavior.
pub struct RegistryConfig;

impl RegistryConfig {
    /// Extensions accepted for upload and rehydration (compared case-insensitively).
    pub const ACCEPTED_EXTENSIONS: &'static [&'static str] = &["glb", "gltf"];
    /// Random bytes in an archive access token (hex encoded, so twice as many chars).
    pub const ARCHIVE_TOKEN_BYTES: usize = 16;
    /// Prefix for archives created without an explicit name.
    pub const DEFAULT_ARCHIVE_PREFIX: &'static str = "ARSIP";
    /// Uploader attributed to models discovered on disk (the bootstrap admin).
    pub const FALLBACK_UPLOADER_ID: u64 = 1;
    /// Display format for timestamps in list views.
    pub const TIMESTAMP_FORMAT: &'static str = "%Y-%m-%d %H:%M:%S";
}

/// Public URL routes handed out in model records.
pub struct RoutesConfig;

impl RoutesConfig {
    /// Static route for unscoped uploads.
    pub const UPLOADS_ROUTE: &'static str = "/uploads";
    /// Archive-scoped route; files live under `/{name}/files/{file}`.
    pub const ARCHIVES_ROUTE: &'static str = "/api/archives";

    /// URL for an unscoped upload.
    pub fn upload_url(file_name: &str) -> String {
        format!("{}/{}", Self::UPLOADS_ROUTE, file_name)
    }

    /// URL for a file inside an archive.
    pub fn archive_file_url(archive_name: &str, file_name: &str) -> String {
        format!("{}/{}/files/{}", Self::ARCHIVES_ROUTE, archive_name, file_name)
    }
}

/// SQLite connection tuning for the relational index.
pub struct StoreConfig;

impl StoreConfig {
    pub const BUSY_TIMEOUT_MS: u32 = 30_000;
    /// Environment variable the binary reads for the database path.
    pub const DB_PATH_ENV: &'static str = "SQLITE_DB_PATH";
}
