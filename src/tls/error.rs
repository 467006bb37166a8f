//! Certificate authority error types

use std::path::PathBuf;

use thiserror::Error;

/// Certificate generation errors
///
/// Fatal for the call that produced them: HTTPS never falls back to HTTP.
#[derive(Error, Debug)]
pub enum CertificateError {
    #[error("a certificate needs at least one domain")]
    NoDomains,

    #[error("could not create the local certificate authority")]
    Authority {
        #[source]
        source: rcgen::Error,
    },

    #[error("could not issue certificate for {domains}")]
    Issue {
        domains: String,
        #[source]
        source: rcgen::Error,
    },

    #[error("certificate authority files at {path} are unusable")]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("stored certificate authority at {path} could not be parsed")]
    Corrupted {
        path: PathBuf,
        #[source]
        source: rcgen::Error,
    },
}
