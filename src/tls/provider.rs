//! Local certificate authority and memoized leaf issuance

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use rcgen::{
    BasicConstraints, Certificate, CertificateParams, DnType, ExtendedKeyUsagePurpose, IsCa,
    KeyPair, KeyUsagePurpose,
};
use time::OffsetDateTime;

use super::error::CertificateError;
use super::trust::{self, TrustStatus};
use crate::core::{TlsConfig, MAX_VALIDITY_DAYS};

const AUTHORITY_KEY_FILE: &str = "ca.key.pem";
const AUTHORITY_CERT_FILE: &str = "ca.cert.pem";

/// PEM-encoded key and certificate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateBundle {
    /// PKCS#8 private key (PEM)
    pub key: Vec<u8>,
    /// X.509 certificate (PEM)
    pub cert: Vec<u8>,
    /// Normalized domains the certificate covers
    pub domains: Vec<String>,
    pub not_after: DateTime<Utc>,
}

struct Authority {
    cert: Certificate,
    key: KeyPair,
    /// Certificate as first written; installed copies compare against this
    cert_pem: String,
}

/// Issues leaf certificates under a lazily created local authority
pub struct CertificateProvider {
    config: TlsConfig,
    authority: Mutex<Option<Arc<Authority>>>,
    leaves: DashMap<String, Arc<CertificateBundle>>,
}

/// Cache key for a domain set: trimmed, lower-cased, de-duplicated, sorted
pub fn normalize_domains<S: AsRef<str>>(domains: &[S]) -> Vec<String> {
    let mut normalized: Vec<String> = domains
        .iter()
        .map(|d| d.as_ref().trim().to_ascii_lowercase())
        .filter(|d| !d.is_empty())
        .collect();
    normalized.sort();
    normalized.dedup();
    normalized
}

impl CertificateProvider {
    pub fn new(config: TlsConfig) -> Self {
        Self {
            config,
            authority: Mutex::new(None),
            leaves: DashMap::new(),
        }
    }

    pub fn default_domains(&self) -> &[String] {
        &self.config.default_domains
    }

    /// Get the certificate for a domain set, issuing it on first request.
    ///
    /// Any ordering of the same set returns the same `Arc`.
    pub fn get_certificate<S: AsRef<str>>(
        &self,
        domains: &[S],
    ) -> Result<Arc<CertificateBundle>, CertificateError> {
        let domains = normalize_domains(domains);
        if domains.is_empty() {
            return Err(CertificateError::NoDomains);
        }

        let cache_key = domains.join(",");
        if let Some(bundle) = self.leaves.get(&cache_key) {
            return Ok(Arc::clone(bundle.value()));
        }

        let authority = self.authority()?;
        let bundle = Arc::new(self.issue(&authority, domains)?);
        tracing::info!(domains = %cache_key, "Issued preview certificate");

        Ok(Arc::clone(
            self.leaves.entry(cache_key).or_insert(bundle).value(),
        ))
    }

    /// PEM of the authority root, creating the authority if needed
    pub fn authority_certificate_pem(&self) -> Result<String, CertificateError> {
        Ok(self.authority()?.cert_pem.clone())
    }

    /// Whether the authority has been created (or loaded) in this process
    pub fn has_authority(&self) -> bool {
        self.authority.lock().is_some()
    }

    /// Number of distinct domain sets issued so far
    pub fn cached_certificates(&self) -> usize {
        self.leaves.len()
    }

    /// Where an installed copy of the authority root is expected
    pub fn trust_anchor_path(&self) -> Option<PathBuf> {
        self.config
            .trust_anchor_path
            .clone()
            .or_else(|| trust::default_trust_anchor(&self.config.authority_name))
    }

    /// Whether the authority root in use is installed at the trust anchor.
    ///
    /// Never creates the authority. A stored authority that has not been
    /// loaded yet is compared from its storage directory.
    pub fn trust_status(&self) -> TrustStatus {
        let Some(path) = self.trust_anchor_path() else {
            return TrustStatus::Unavailable;
        };
        let authority_pem = match self.authority.lock().as_ref() {
            Some(authority) => Some(authority.cert_pem.clone()),
            None => self
                .config
                .authority_dir
                .as_ref()
                .and_then(|dir| std::fs::read_to_string(dir.join(AUTHORITY_CERT_FILE)).ok()),
        };
        trust::inspect(&path, authority_pem.as_deref())
    }

    /// Best-effort trust check; undeterminable counts as untrusted
    pub fn is_authority_trusted(&self) -> bool {
        self.trust_status() == TrustStatus::Trusted
    }

    fn authority(&self) -> Result<Arc<Authority>, CertificateError> {
        let mut slot = self.authority.lock();
        if let Some(authority) = slot.as_ref() {
            return Ok(Arc::clone(authority));
        }

        let authority = match &self.config.authority_dir {
            Some(dir) => match load_authority(dir)? {
                Some(authority) => {
                    tracing::debug!(dir = %dir.display(), "Loaded certificate authority");
                    authority
                }
                None => {
                    let authority = self.create_authority()?;
                    store_authority(dir, &authority)?;
                    authority
                }
            },
            None => self.create_authority()?,
        };

        let authority = Arc::new(authority);
        *slot = Some(Arc::clone(&authority));
        Ok(authority)
    }

    fn create_authority(&self) -> Result<Authority, CertificateError> {
        let build = || -> Result<Authority, rcgen::Error> {
            let key = KeyPair::generate()?;
            let mut params = CertificateParams::default();
            params
                .distinguished_name
                .push(DnType::CommonName, self.config.authority_name.clone());
            params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
            params.key_usages = vec![
                KeyUsagePurpose::KeyCertSign,
                KeyUsagePurpose::CrlSign,
                KeyUsagePurpose::DigitalSignature,
            ];
            let (not_before, not_after) = validity(self.config.authority_validity_days);
            params.not_before = not_before;
            params.not_after = not_after;

            let cert = params.self_signed(&key)?;
            let cert_pem = cert.pem();
            Ok(Authority {
                cert,
                key,
                cert_pem,
            })
        };

        let authority = build().map_err(|source| CertificateError::Authority { source })?;
        tracing::info!(name = %self.config.authority_name, "Created certificate authority");
        Ok(authority)
    }

    fn issue(
        &self,
        authority: &Authority,
        domains: Vec<String>,
    ) -> Result<CertificateBundle, CertificateError> {
        let build = || -> Result<(Certificate, KeyPair), rcgen::Error> {
            let mut params = CertificateParams::new(domains.clone())?;
            params
                .distinguished_name
                .push(DnType::CommonName, domains[0].clone());
            params.key_usages = vec![
                KeyUsagePurpose::DigitalSignature,
                KeyUsagePurpose::KeyEncipherment,
            ];
            params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];
            let (not_before, not_after) = validity(self.config.leaf_validity_days);
            params.not_before = not_before;
            params.not_after = not_after;

            let key = KeyPair::generate()?;
            let cert = params.signed_by(&key, &authority.cert, &authority.key)?;
            Ok((cert, key))
        };

        let (cert, key) = build().map_err(|source| CertificateError::Issue {
            domains: domains.join(","),
            source,
        })?;

        Ok(CertificateBundle {
            key: key.serialize_pem().into_bytes(),
            cert: cert.pem().into_bytes(),
            not_after: Utc::now()
                .checked_add_signed(chrono::Duration::days(i64::from(validity_days(
                    self.config.leaf_validity_days,
                ))))
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
            domains,
        })
    }
}

fn validity_days(days: u32) -> u32 {
    days.min(MAX_VALIDITY_DAYS)
}

fn validity(days: u32) -> (OffsetDateTime, OffsetDateTime) {
    let now = OffsetDateTime::now_utc();
    let not_after = now
        .checked_add(time::Duration::days(i64::from(validity_days(days))))
        .unwrap_or(now);
    (now - time::Duration::hours(1), not_after)
}

fn load_authority(dir: &Path) -> Result<Option<Authority>, CertificateError> {
    let key_path = dir.join(AUTHORITY_KEY_FILE);
    let cert_path = dir.join(AUTHORITY_CERT_FILE);

    let (key_pem, cert_pem) = match (
        std::fs::read_to_string(&key_path),
        std::fs::read_to_string(&cert_path),
    ) {
        (Ok(key), Ok(cert)) => (key, cert),
        (Err(e), _) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        (_, Err(e)) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        (Err(source), _) => return Err(CertificateError::Storage { path: key_path, source }),
        (_, Err(source)) => return Err(CertificateError::Storage { path: cert_path, source }),
    };

    let corrupted = |source| CertificateError::Corrupted {
        path: dir.to_path_buf(),
        source,
    };
    let key = KeyPair::from_pem(&key_pem).map_err(corrupted)?;
    let cert = CertificateParams::from_ca_cert_pem(&cert_pem)
        .and_then(|params| params.self_signed(&key))
        .map_err(corrupted)?;

    Ok(Some(Authority {
        cert,
        key,
        cert_pem,
    }))
}

fn store_authority(dir: &Path, authority: &Authority) -> Result<(), CertificateError> {
    let storage = |path: &Path| {
        let path = path.to_path_buf();
        move |source| CertificateError::Storage { path, source }
    };

    std::fs::create_dir_all(dir).map_err(storage(dir))?;
    let key_path = dir.join(AUTHORITY_KEY_FILE);
    write_private(&key_path, authority.key.serialize_pem().as_bytes()).map_err(storage(&key_path))?;
    let cert_path = dir.join(AUTHORITY_CERT_FILE);
    std::fs::write(&cert_path, authority.cert_pem.as_bytes()).map_err(storage(&cert_path))?;

    tracing::debug!(dir = %dir.display(), "Stored certificate authority");
    Ok(())
}

#[cfg(unix)]
fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;

    let mut file = std::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(contents)
}

#[cfg(not(unix))]
fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    std::fs::write(path, contents)
}
