//! Error types for the preview server
//!
//! Module errors are aggregated into [`PreviewError`]. Display strings are
//! short statuses suitable for a UI; the underlying I/O or certificate errors
//! stay reachable through [`std::error::Error::source`].

use std::path::PathBuf;

use thiserror::Error;

use crate::hosts::HostsFileError;
use crate::logging::LoggingError;
use crate::server::{BindError, ServerError};
use crate::tls::CertificateError;

/// Result type alias for preview server operations
pub type Result<T> = std::result::Result<T, PreviewError>;

/// Main error type for the preview server
#[derive(Error, Debug)]
pub enum PreviewError {
    #[error("{0}")]
    Server(#[from] ServerError),

    #[error("{0}")]
    Certificate(#[from] CertificateError),

    #[error("{0}")]
    HostsFile(#[from] HostsFileError),

    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("logging error: {0}")]
    Logging(#[from] LoggingError),
}

impl From<BindError> for PreviewError {
    fn from(err: BindError) -> Self {
        PreviewError::Server(ServerError::Bind(err))
    }
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config file {path} could not be read")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("config parse failed: {reason}")]
    ParseFailed { reason: String },

    #[error("invalid config value: {field} = {value}")]
    InvalidValue { field: String, value: String },
}

/// Recovery action suggestions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryAction {
    /// Retry the operation
    Retry,
    /// Continue without the feature that failed
    Degrade,
    /// Notify user and wait for input
    NotifyUser,
    /// Abort the operation
    Abort,
}

/// Trait for error recovery strategies
pub trait ErrorRecovery {
    /// Check if the error is retryable
    fn is_retryable(&self) -> bool;

    /// Get recovery action suggestion
    fn recovery_action(&self) -> RecoveryAction;
}

impl PreviewError {
    /// Stable machine-readable status for a UI layer
    pub fn status(&self) -> &'static str {
        match self {
            PreviewError::Server(ServerError::Bind(_)) => "bind-failed",
            PreviewError::Server(ServerError::RootUnavailable { .. }) => "root-unavailable",
            PreviewError::Server(ServerError::TlsSetup { .. }) => "tls-failed",
            PreviewError::Certificate(_) => "certificate-failed",
            PreviewError::HostsFile(_) => "hosts-unavailable",
            PreviewError::Config(_) => "invalid-config",
            PreviewError::Logging(_) => "logging-failed",
        }
    }
}

impl ErrorRecovery for PreviewError {
    fn is_retryable(&self) -> bool {
        match self {
            PreviewError::Server(ServerError::Bind(e)) => e.is_transient(),
            _ => false,
        }
    }

    fn recovery_action(&self) -> RecoveryAction {
        match self {
            PreviewError::Server(ServerError::Bind(e)) if e.is_transient() => RecoveryAction::Retry,
            PreviewError::Server(_) => RecoveryAction::NotifyUser,
            PreviewError::Certificate(_) => RecoveryAction::Abort,
            PreviewError::HostsFile(_) => RecoveryAction::Degrade,
            PreviewError::Config(_) => RecoveryAction::NotifyUser,
            PreviewError::Logging(_) => RecoveryAction::Degrade,
        }
    }
}
