//! Common utilities and shared infrastructure
//!
//! - Error taxonomy (`AppError`)
//! - Logging setup

pub mod error;
pub mod logger;

// Re-export commonly used items
pub use error::{AppError, AppResult};
pub use logger::{cleanup_old_logs, init_logger, init_logger_with_file};
