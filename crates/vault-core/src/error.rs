//! Error types for the model vault.
//!
//! Registry commands reject bad input with [`VaultError::Validation`] before
//! any side effect. [`VaultError::StoreUnavailable`] is produced by the
//! relational index and is absorbed by the registry, which degrades to the
//! in-memory index instead of surfacing it to callers.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the model vault.
#[derive(Debug, Error)]
pub enum VaultError {
    // Input errors
    #[error("Validation error for {field}: {message}")]
    Validation { field: String, message: String },

    // Lookup errors
    #[error("Model not found: {id}")]
    ModelNotFound { id: u64 },

    #[error("Archive not found: {archive}")]
    ArchiveNotFound { archive: String },

    #[error("User not found: {id}")]
    UserNotFound { id: u64 },

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    // Access errors
    #[error("Forbidden: {action}")]
    Forbidden { action: String },

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Conflict: {message}")]
    Conflict { message: String },

    // Relational index errors
    #[error("Relational store unavailable: {message}")]
    StoreUnavailable {
        message: String,
        #[source]
        source: Option<rusqlite::Error>,
    },

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for vault operations.
pub type Result<T> = std::result::Result<T, VaultError>;

impl From<std::io::Error> for VaultError {
    fn from(err: std::io::Error) -> Self {
        VaultError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<rusqlite::Error> for VaultError {
    fn from(err: rusqlite::Error) -> Self {
        VaultError::StoreUnavailable {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl VaultError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        VaultError::Io {
            message: format!("{} ({})", err, path.display()),
            path: Some(path),
            source: Some(err),
        }
    }

    /// Create a validation error for a named field.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        VaultError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a forbidden error describing the attempted action.
    pub fn forbidden(action: impl Into<String>) -> Self {
        VaultError::Forbidden {
            action: action.into(),
        }
    }

    /// Convert to a JSON-RPC error code.
    ///
    /// Custom error codes (application-defined, -32000 to -32099):
    /// - -32002: Model, archive, user or file not found
    /// - -32005: Validation error
    /// - -32006: Forbidden
    /// - -32007: Invalid credentials
    /// - -32008: Conflict
    pub fn to_rpc_error_code(&self) -> i32 {
        match self {
            VaultError::ModelNotFound { .. }
            | VaultError::ArchiveNotFound { .. }
            | VaultError::UserNotFound { .. }
            | VaultError::FileNotFound(_) => -32002,

            VaultError::Validation { .. } => -32005,

            VaultError::Forbidden { .. } => -32006,

            VaultError::InvalidCredentials => -32007,

            VaultError::Conflict { .. } => -32008,

            // All other errors are internal errors
            _ => -32603,
        }
    }

    /// Whether this error means the target of a lookup does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            VaultError::ModelNotFound { .. }
                | VaultError::ArchiveNotFound { .. }
                | VaultError::UserNotFound { .. }
                | VaultError::FileNotFound(_)
        )
    }
}
