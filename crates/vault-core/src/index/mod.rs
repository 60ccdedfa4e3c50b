//! Model indexes.
//!
//! This module provides:
//! - The in-memory index that serves every read
//! - The SQLite relational index that records uploads durably

mod memory;
mod relational;

pub use memory::{MemoryIndex, PresenceScope};
pub use relational::{ModelLocation, ModelRow, RelationalIndex};
