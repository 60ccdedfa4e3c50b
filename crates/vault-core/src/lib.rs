//! Model Vault - Headless registry for 3D model assets.
//!
//! This crate stores `.glb`/`.gltf` uploads on disk, indexes them in memory
//! and best-effort in SQLite, and groups them into token-gated archives. It
//! can be used programmatically without any HTTP/RPC layer; callers pass an
//! already-authenticated [`Principal`] into every command.
//!
//! # Example
//!
//! ```rust,no_run
//! use model_vault::{Principal, Registry, Role, UploadRequest};
//!
//! #[tokio::main]
//! async fn main() -> model_vault::Result<()> {
//!     let registry = Registry::builder("./data")
//!         .with_user("admin@test.com", "<hash>", Role::Admin)
//!         .build()
//!         .await?;
//!
//!     let admin = Principal::Admin { user_id: 1, email: "admin@test.com".into() };
//!     let archive = registry.create_archive(&admin, Some("Lab A")).await?;
//!
//!     let model = registry
//!         .upload_model(&admin, UploadRequest {
//!             name: "Scene".into(),
//!             description: String::new(),
//!             original_file_name: "scene.glb".into(),
//!             archive_id: Some(archive.id),
//!             content: std::fs::read("scene.glb")?,
//!         })
//!         .await?;
//!     println!("Stored at {}", model.file_url);
//!
//!     Ok(())
//! }
//! ```

pub mod blob;
pub mod builder;
pub mod config;
pub mod error;
pub mod index;
pub mod models;
pub mod naming;
pub mod registry;

// Re-export commonly used types
pub use blob::BlobStore;
pub use builder::RegistryBuilder;
pub use error::{Result, VaultError};
pub use models::{
    Archive, ArchiveDeletion, ArchiveSummary, Model, ModelView, Principal, Role, UploadRequest,
    User, UserProfile,
};
pub use registry::{RehydrationReport, Registry};
