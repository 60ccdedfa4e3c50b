//! Data models for the model vault.
//!
//! Entities are what the in-memory index stores; views are what registry
//! commands hand back to the routing layer.

mod model;
mod principal;
mod responses;

pub use model::*;
pub use principal::*;
pub use responses::*;
