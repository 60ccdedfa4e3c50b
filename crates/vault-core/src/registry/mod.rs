//! The model registry.
//!
//! [`Registry`] coordinates three stores:
//! - **Blob store**: the asset files themselves, under `uploads/` and
//!   `model_archives/<name>/`
//! - **Relational index**: a best-effort SQLite record of uploads
//! - **In-memory index**: users, models and archives; the source of truth
//!   for every read
//!
//! On startup [`Registry::rehydrate`] rebuilds the in-memory index from the
//! directory tree.

mod rehydrate;
mod service;

pub use rehydrate::RehydrationReport;
pub use service::Registry;
