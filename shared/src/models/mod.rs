//! Data models
//!
//! Shared between the sync services and whatever composes them.
//! Product ids are `i64`; remote ids come from the upstream API, local ids
//! are allocated above a reserved floor by the catalog service.

pub mod category;
pub mod favorites;
pub mod product;

// Re-exports
pub use category::*;
pub use favorites::*;
pub use product::*;
