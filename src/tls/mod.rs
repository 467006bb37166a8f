//! Local TLS for previews
//!
//! A certificate authority is created once per process (or loaded from its
//! storage directory) and signs short-lived leaf certificates, memoized per
//! domain set.

mod error;
mod provider;
mod trust;

pub use error::CertificateError;
pub use provider::{normalize_domains, CertificateBundle, CertificateProvider};
pub use trust::{authority_slug, default_trust_anchor, TrustStatus};
