//! Preview server error types

use std::path::PathBuf;

use thiserror::Error;

/// Failure to obtain a listening socket on the loopback interface
#[derive(Error, Debug)]
pub enum BindError {
    #[error("port {port} is unavailable on 127.0.0.1")]
    Unavailable {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("no free loopback port in range {start}-{end}")]
    RangeExhausted { start: u16, end: u16 },

    #[error("no free loopback port after {attempts} attempts")]
    AttemptsExhausted {
        attempts: u32,
        #[source]
        source: Option<std::io::Error>,
    },
}

/// Preview server lifecycle errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("preview root is not an accessible directory: {path}")]
    RootUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("preview server could not bind: {0}")]
    Bind(#[from] BindError),

    #[error("TLS listener could not load the issued certificate")]
    TlsSetup {
        #[source]
        source: std::io::Error,
    },
}

impl BindError {
    /// Whether a fresh port probe might succeed where this attempt failed
    pub fn is_transient(&self) -> bool {
        matches!(self, BindError::Unavailable { .. })
    }
}
