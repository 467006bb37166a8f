//! Hosts table error types

use std::path::PathBuf;

use thiserror::Error;

/// Hosts table errors
///
/// Never fatal: the manager logs them and reports the edit as not applied.
#[derive(Error, Debug)]
pub enum HostsFileError {
    #[error("invalid hostname '{hostname}'")]
    InvalidHostname { hostname: String },

    #[error("hosts file not found: {path}")]
    NotFound { path: PathBuf },

    #[error("permission denied editing {path}")]
    PermissionDenied { path: PathBuf },

    #[error("hosts file {path} could not be updated")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl HostsFileError {
    pub(crate) fn from_io(path: &std::path::Path, source: std::io::Error) -> Self {
        match source.kind() {
            std::io::ErrorKind::NotFound => HostsFileError::NotFound {
                path: path.to_path_buf(),
            },
            std::io::ErrorKind::PermissionDenied => HostsFileError::PermissionDenied {
                path: path.to_path_buf(),
            },
            _ => HostsFileError::Io {
                path: path.to_path_buf(),
                source,
            },
        }
    }
}
