//! Name handling for archives and stored asset files.
//!
//! Archive names double as directory names, and stored file names carry a
//! numeric prefix so repeated uploads of the same file never collide.

use crate::config::RegistryConfig;
use crate::error::{Result, VaultError};
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

/// Any single whitespace character.
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s").unwrap());

/// Sanitize an archive name for use as a directory name.
///
/// Surrounding whitespace is trimmed and every inner whitespace character
/// becomes an underscore. Names that would escape the archive root are rejected.
///
/// ```
/// use model_vault::naming::sanitize_archive_name;
///
/// assert_eq!(sanitize_archive_name("Lab A").unwrap(), "Lab_A");
/// assert!(sanitize_archive_name("../etc").is_err());
/// ```
pub fn sanitize_archive_name(raw: &str) -> Result<String> {
    let name = WHITESPACE.replace_all(raw.trim(), "_").to_string();

    if name.is_empty() {
        return Err(VaultError::validation("name", "Archive name is empty"));
    }
    if !is_safe_file_name(&name) {
        return Err(VaultError::validation(
            "name",
            format!("Archive name is not a valid directory name: {}", raw),
        ));
    }

    Ok(name)
}

/// Name used when an archive is created without one.
pub fn default_archive_name(unix_seconds: i64) -> String {
    format!("{}_{}", RegistryConfig::DEFAULT_ARCHIVE_PREFIX, unix_seconds)
}

/// True if `name` is a single, non-traversing path component.
pub fn is_safe_file_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && !name.contains("..")
        && !name.contains('/')
        && !name.contains('\\')
        && !name.contains('\0')
}

/// Lowercased extension of `file_name` if it is one the registry stores.
pub fn accepted_extension(file_name: &str) -> Option<String> {
    let ext = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())?
        .to_lowercase();

    RegistryConfig::ACCEPTED_EXTENSIONS
        .contains(&ext.as_str())
        .then_some(ext)
}

/// True if `file_name` ends in an accepted extension, matched exactly.
///
/// Uploads are case-sensitive; files found on disk go through
/// [`accepted_extension`] instead.
pub fn has_upload_extension(file_name: &str) -> bool {
    Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| RegistryConfig::ACCEPTED_EXTENSIONS.contains(&ext))
}

/// Keep only the final component of a client-supplied file name.
pub fn client_file_name(raw: &str) -> Result<String> {
    // Clients on Windows send backslash-separated paths.
    let last = raw.rsplit(|c: char| c == '/' || c == '\\').next().unwrap_or("").trim();
    if !is_safe_file_name(last) {
        return Err(VaultError::validation(
            "file",
            format!("Invalid file name: {}", raw),
        ));
    }
    Ok(last.to_string())
}

/// Stored name for an upload: `<prefix>_<original>`.
pub fn stored_file_name(prefix: i64, original: &str) -> String {
    format!("{}_{}", prefix, original)
}

/// Friendly name for a file discovered on disk.
///
/// Drops everything up to the first underscore (the upload prefix) and the
/// extension.
///
/// ```
/// use model_vault::naming::display_name_from_file;
///
/// assert_eq!(display_name_from_file("1700000000_scene.glb"), "scene");
/// assert_eq!(display_name_from_file("chair.gltf"), "chair");
/// ```
pub fn display_name_from_file(file_name: &str) -> String {
    let name = match file_name.split_once('_') {
        Some((_, rest)) => rest,
        None => file_name,
    };
    match name.rsplit_once('.') {
        Some((stem, _)) => stem.to_string(),
        None => name.to_string(),
    }
}

/// Parse an id supplied as text by the routing layer.
pub fn parse_id(field: &str, raw: &str) -> Result<u64> {
    raw.trim()
        .parse::<u64>()
        .map_err(|_| VaultError::validation(field, format!("Invalid {}: {}", field, raw)))
}
