//! Preview Server Core Module
//!
//! This module contains the shared foundation:
//! - Configuration management
//! - Error types and handling

pub mod config;
pub mod error;

// Re-export commonly used items
pub use config::*;
pub use error::{ConfigError, ErrorRecovery, PreviewError, RecoveryAction, Result};
