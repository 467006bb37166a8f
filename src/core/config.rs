//! Configuration module for the preview server
//!
//! Handles:
//! - Listener and request pipeline settings
//! - Port selection defaults
//! - Local certificate authority settings
//! - Hosts table location and exposure windows

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::error::ConfigError;
use crate::logging::LoggingConfig;

/// Longest certificate validity accepted, in days
pub const MAX_VALIDITY_DAYS: u32 = 3650;

/// Longest exposure window accepted, in seconds (30 days)
pub const MAX_EXPOSE_DURATION_SECS: u64 = 30 * 24 * 60 * 60;

/// Main preview server configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PreviewConfig {
    /// Listener and request pipeline settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Port selection settings
    #[serde(default)]
    pub ports: PortConfig,

    /// Local certificate authority settings
    #[serde(default)]
    pub tls: TlsConfig,

    /// Hosts table settings (exposed previews only)
    #[serde(default)]
    pub hosts: HostsConfig,

    /// Session lifetime settings
    #[serde(default)]
    pub session: SessionConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Listener and request pipeline settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Document served for directory requests
    #[serde(default = "default_index_document")]
    pub index_document: String,

    /// Redirect unmatched routes to `/` (single-page applications)
    #[serde(default = "default_true")]
    pub spa_fallback: bool,

    /// Bind attempts before start gives up
    #[serde(default = "default_bind_attempts")]
    pub max_bind_attempts: u32,
}

/// Port selection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortConfig {
    /// First port tried for plain HTTP
    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// First port tried for HTTPS
    #[serde(default = "default_https_port")]
    pub https_port: u16,

    /// First port tried when no protocol preference is known
    #[serde(default = "default_service_port")]
    pub service_port: u16,

    /// Lower bound of the upward probe
    #[serde(default = "default_probe_start")]
    pub probe_start: u16,

    /// Upper bound of the upward probe (inclusive)
    #[serde(default = "default_probe_end")]
    pub probe_end: u16,
}

/// Local certificate authority settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TlsConfig {
    /// Common name of the generated authority
    #[serde(default = "default_authority_name")]
    pub authority_name: String,

    /// Directory where the authority key and certificate persist.
    /// `None` keeps the authority in memory for the process lifetime.
    #[serde(default)]
    pub authority_dir: Option<PathBuf>,

    /// Validity of issued leaf certificates
    #[serde(default = "default_leaf_validity")]
    pub leaf_validity_days: u32,

    /// Validity of the authority certificate
    #[serde(default = "default_authority_validity")]
    pub authority_validity_days: u32,

    /// Where an installed copy of the authority root is expected.
    /// `None` uses the platform default.
    #[serde(default)]
    pub trust_anchor_path: Option<PathBuf>,

    /// Domains used when a caller does not name any
    #[serde(default = "default_domains")]
    pub default_domains: Vec<String>,
}

/// Hosts table settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostsConfig {
    /// Path of the OS hostname-resolution table
    #[serde(default = "default_hosts_file")]
    pub hosts_file: PathBuf,
}

/// Session lifetime settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Default lifetime of an exposed preview
    #[serde(default = "default_expose_duration")]
    pub expose_duration_secs: u64,
}

fn default_index_document() -> String {
    "index.html".to_string()
}

fn default_true() -> bool {
    true
}

fn default_bind_attempts() -> u32 {
    3
}

fn default_http_port() -> u16 {
    80
}

fn default_https_port() -> u16 {
    443
}

fn default_service_port() -> u16 {
    8080
}

fn default_probe_start() -> u16 {
    49152
}

fn default_probe_end() -> u16 {
    65535
}

fn default_authority_name() -> String {
    "Preview Server Development CA".to_string()
}

fn default_leaf_validity() -> u32 {
    7
}

fn default_authority_validity() -> u32 {
    825
}

fn default_domains() -> Vec<String> {
    vec!["localhost".to_string(), "127.0.0.1".to_string()]
}

fn default_hosts_file() -> PathBuf {
    if cfg!(windows) {
        let root = std::env::var_os("SystemRoot").unwrap_or_else(|| "C:\\Windows".into());
        PathBuf::from(root)
            .join("System32")
            .join("drivers")
            .join("etc")
            .join("hosts")
    } else {
        PathBuf::from("/etc/hosts")
    }
}

fn default_expose_duration() -> u64 {
    3600
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            index_document: default_index_document(),
            spa_fallback: true,
            max_bind_attempts: default_bind_attempts(),
        }
    }
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            http_port: default_http_port(),
            https_port: default_https_port(),
            service_port: default_service_port(),
            probe_start: default_probe_start(),
            probe_end: default_probe_end(),
        }
    }
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            authority_name: default_authority_name(),
            authority_dir: None,
            leaf_validity_days: default_leaf_validity(),
            authority_validity_days: default_authority_validity(),
            trust_anchor_path: None,
            default_domains: default_domains(),
        }
    }
}

impl Default for HostsConfig {
    fn default() -> Self {
        Self {
            hosts_file: default_hosts_file(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            expose_duration_secs: default_expose_duration(),
        }
    }
}

impl SessionConfig {
    pub fn expose_duration(&self) -> Duration {
        Duration::from_secs(self.expose_duration_secs)
    }
}

impl PreviewConfig {
    /// Parse a configuration from JSON, filling omitted fields with defaults
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json).map_err(|e| ConfigError::ParseFailed {
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file; a missing file yields the defaults
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(json) => Self::from_json_str(&json),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file, using defaults");
                Ok(Self::default())
            }
            Err(source) => Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Reject values that would make the server unusable
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.max_bind_attempts == 0 {
            return Err(invalid("server.max_bind_attempts", 0));
        }
        if self.server.index_document.trim().is_empty()
            || self.server.index_document.contains(|c| c == '/' || c == '\\')
        {
            return Err(invalid("server.index_document", &self.server.index_document));
        }
        if self.ports.probe_start == 0 || self.ports.probe_start > self.ports.probe_end {
            return Err(invalid(
                "ports.probe_start",
                format!("{}-{}", self.ports.probe_start, self.ports.probe_end),
            ));
        }
        if self.tls.leaf_validity_days == 0 {
            return Err(invalid("tls.leaf_validity_days", 0));
        }
        if self.tls.authority_validity_days > MAX_VALIDITY_DAYS {
            return Err(invalid(
                "tls.authority_validity_days",
                self.tls.authority_validity_days,
            ));
        }
        if self.tls.authority_validity_days < self.tls.leaf_validity_days {
            return Err(invalid(
                "tls.authority_validity_days",
                self.tls.authority_validity_days,
            ));
        }
        if self.session.expose_duration_secs == 0
            || self.session.expose_duration_secs > MAX_EXPOSE_DURATION_SECS
        {
            return Err(invalid(
                "session.expose_duration_secs",
                self.session.expose_duration_secs,
            ));
        }
        Ok(())
    }
}

fn invalid(field: &str, value: impl ToString) -> ConfigError {
    ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PreviewConfig::default();
        assert_eq!(config.server.index_document, "index.html");
        assert!(config.server.spa_fallback);
        assert_eq!(config.server.max_bind_attempts, 3);
        assert_eq!(config.ports.http_port, 80);
        assert_eq!(config.ports.https_port, 443);
        assert_eq!(config.tls.leaf_validity_days, 7);
        assert_eq!(config.tls.default_domains, vec!["localhost", "127.0.0.1"]);
        assert_eq!(config.session.expose_duration(), Duration::from_secs(3600));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config = PreviewConfig::from_json_str(
            r#"{ "server": { "index_document": "app.html" }, "tls": { "leaf_validity_days": 3 } }"#,
        )
        .unwrap();

        assert_eq!(config.server.index_document, "app.html");
        assert!(config.server.spa_fallback);
        assert_eq!(config.tls.leaf_validity_days, 3);
        assert_eq!(config.ports.probe_start, 49152);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = PreviewConfig::from_json_str(r#"{ "server": { "max_bind_attempts": 0 } }"#)
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "server.max_bind_attempts"));

        let err = PreviewConfig::from_json_str(
            r#"{ "ports": { "probe_start": 60000, "probe_end": 50000 } }"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));

        let err = PreviewConfig::from_json_str("not json").unwrap_err();
        assert!(matches!(err, ConfigError::ParseFailed { .. }));
    }

    #[test]
    fn test_unbounded_durations_rejected() {
        let err = PreviewConfig::from_json_str(
            r#"{ "session": { "expose_duration_secs": 18446744073709551615 } }"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "session.expose_duration_secs"));

        let err = PreviewConfig::from_json_str(
            r#"{ "tls": { "leaf_validity_days": 4294967295, "authority_validity_days": 4294967295 } }"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "tls.authority_validity_days"));
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = PreviewConfig::load(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config.server.max_bind_attempts, 3);
    }

    #[test]
    fn test_load_reads_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("preview.json");
        std::fs::write(&path, r#"{ "session": { "expose_duration_secs": 90 } }"#).unwrap();

        let config = PreviewConfig::load(&path).unwrap();
        assert_eq!(config.session.expose_duration(), Duration::from_secs(90));
    }
}
