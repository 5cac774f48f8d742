//! Configuration and composition

pub mod config;
pub mod context;

pub use config::{Config, StorageKind};
pub use context::{Origin, TabContext};
