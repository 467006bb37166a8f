//! Trust-anchor inspection for the local certificate authority
//!
//! Installing the root into a trust store is the job of an external tool;
//! this module only looks at the file location that tool writes to.

use std::path::{Path, PathBuf};

use serde::Serialize;

/// Whether the authority root appears to be installed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrustStatus {
    /// The current authority root is installed at the trust-anchor location
    Trusted,
    /// The location holds no certificate, or one from another authority
    Untrusted,
    /// The location cannot be determined or read
    Unavailable,
}

const PEM_CERTIFICATE_HEADER: &str = "-----BEGIN CERTIFICATE-----";

/// File-name friendly form of the authority name
pub fn authority_slug(name: &str) -> String {
    let slug: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect();
    let slug = slug
        .split('-')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-");
    if slug.is_empty() {
        "preview-server-ca".to_string()
    } else {
        slug
    }
}

/// Platform default location of an installed authority root
pub fn default_trust_anchor(authority_name: &str) -> Option<PathBuf> {
    let file = format!("{}.crt", authority_slug(authority_name));
    if cfg!(target_os = "linux") {
        Some(PathBuf::from("/usr/local/share/ca-certificates").join(file))
    } else {
        dirs::data_local_dir().map(|dir| dir.join("preview-server").join("trust").join(file))
    }
}

/// Inspect a trust-anchor path
///
/// Only an installed copy of `authority_pem` counts as trusted; any other
/// certificate at the location belongs to a previous authority.
pub fn inspect(path: &Path, authority_pem: Option<&str>) -> TrustStatus {
    let installed = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return TrustStatus::Untrusted,
        Err(e) => {
            tracing::debug!(path = %path.display(), error = %e, "Trust anchor unreadable");
            return TrustStatus::Unavailable;
        }
    };

    match authority_pem.map(str::trim) {
        Some(pem) if !pem.is_empty() && installed.contains(pem) => TrustStatus::Trusted,
        Some(_) if installed.contains(PEM_CERTIFICATE_HEADER) => {
            tracing::debug!(path = %path.display(), "Trust anchor holds a different authority");
            TrustStatus::Untrusted
        }
        _ => TrustStatus::Untrusted,
    }
}
