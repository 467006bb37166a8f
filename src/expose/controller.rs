//! Opt-in exposure of a preview under a custom domain
//!
//! An exposure publishes the domain in the hosts table, starts a dedicated
//! [`PreviewServer`] and arms a [`SessionTimeout`]. Readiness is broadcast on a
//! watch channel so a UI can follow each step.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{watch, Mutex};

use crate::core::{PreviewConfig, PreviewError, Result};
use crate::hosts::{EntryOutcome, HostEntryManager};
use crate::server::{PortAllocator, PortHint, PreviewServer, ServerState, StartOptions};
use crate::session::SessionTimeout;
use crate::tls::CertificateProvider;

/// Progress of an exposed preview
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "kebab-case")]
pub enum ExposeStatus {
    Idle,
    PublishingHost,
    IssuingCertificate,
    Binding,
    Ready {
        state: ServerState,
        /// URL under the exposed domain, or the loopback URL without one
        public_url: String,
        expires_at: DateTime<Utc>,
    },
    Failed {
        reason: String,
    },
    Expired,
    Stopped,
}

impl ExposeStatus {
    pub fn is_ready(&self) -> bool {
        matches!(self, ExposeStatus::Ready { .. })
    }
}

/// Options for a single exposure
#[derive(Debug, Clone)]
pub struct ExposeOptions {
    pub root: PathBuf,
    pub use_https: bool,
    /// Custom domain, optionally with an explicit port (`preview.test:8443`)
    pub domain: Option<String>,
    /// Lifetime of the exposure; `None` uses the configured default
    pub duration: Option<Duration>,
}

impl ExposeOptions {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            use_https: false,
            domain: None,
            duration: None,
        }
    }

    pub fn with_https(mut self, use_https: bool) -> Self {
        self.use_https = use_https;
        self
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }
}

struct Shared {
    server: Mutex<PreviewServer>,
    certificates: Arc<CertificateProvider>,
    hosts: HostEntryManager,
    timeout: SessionTimeout,
    status: watch::Sender<ExposeStatus>,
    /// Bumped whenever the expiry is re-armed or the exposure ends
    epoch: AtomicU64,
    default_duration: Duration,
}

/// Drives one exposed preview at a time
#[derive(Clone)]
pub struct ExposeController {
    shared: Arc<Shared>,
}

impl ExposeController {
    pub fn new(
        config: &PreviewConfig,
        ports: Arc<PortAllocator>,
        certificates: Arc<CertificateProvider>,
    ) -> Self {
        let server = PreviewServer::new(config.server.clone(), ports, Arc::clone(&certificates));
        let (status, _) = watch::channel(ExposeStatus::Idle);
        Self {
            shared: Arc::new(Shared {
                server: Mutex::new(server),
                certificates,
                hosts: HostEntryManager::from_config(&config.hosts),
                timeout: SessionTimeout::new(),
                status,
                epoch: AtomicU64::new(0),
                default_duration: config.session.expose_duration(),
            }),
        }
    }

    /// Follow readiness updates
    pub fn subscribe(&self) -> watch::Receiver<ExposeStatus> {
        self.shared.status.subscribe()
    }

    pub fn status(&self) -> ExposeStatus {
        self.shared.status.borrow().clone()
    }

    /// Expose a preview; an active exposure is returned unchanged
    pub async fn expose(&self, options: ExposeOptions) -> Result<ServerState> {
        let mut server = self.shared.server.lock().await;
        if let Some(state) = server.state() {
            return Ok(state);
        }

        let domain = options
            .domain
            .as_deref()
            .map(str::trim)
            .filter(|domain| !domain.is_empty());
        let hostname = domain.map(host_of);

        let mut published = false;
        if let Some(hostname) = &hostname {
            self.publish(ExposeStatus::PublishingHost);
            published = self.shared.hosts.add_entry(hostname) != EntryOutcome::Failed;
        }

        let mut start = StartOptions::new(&options.root).with_https(options.use_https);
        if let Some(domain) = domain {
            start = start.with_port_hint(PortHint::Domain(domain.to_string()));
        }

        if options.use_https {
            self.publish(ExposeStatus::IssuingCertificate);
            let mut domains = self.shared.certificates.default_domains().to_vec();
            domains.extend(hostname.clone());
            match self.shared.certificates.get_certificate(&domains) {
                Ok(bundle) => start = start.with_certificate(bundle),
                Err(e) => return Err(self.fail(e.into())),
            }
        }

        self.publish(ExposeStatus::Binding);
        let state = match server.start(start).await {
            Ok(state) => state,
            Err(e) => return Err(self.fail(e)),
        };

        let duration = options.duration.unwrap_or(self.shared.default_duration);
        let expires_at = self.arm(duration);
        // Without a hosts entry the domain does not resolve; advertise loopback.
        let public_url = public_url(&state, hostname.as_deref().filter(|_| published));
        tracing::info!(url = %public_url, %expires_at, "Preview exposed");

        self.publish(ExposeStatus::Ready {
            state: state.clone(),
            public_url,
            expires_at,
        });
        Ok(state)
    }

    /// Restart the expiry window; `None` when nothing is exposed
    pub async fn extend(&self, duration: Duration) -> Option<DateTime<Utc>> {
        let server = self.shared.server.lock().await;
        if !server.is_running() {
            return None;
        }

        let expires_at = self.arm(duration);
        self.shared.status.send_modify(|status| {
            if let ExposeStatus::Ready { expires_at: at, .. } = status {
                *at = expires_at;
            }
        });
        tracing::debug!(%expires_at, "Exposure extended");
        Some(expires_at)
    }

    /// End the exposure; a no-op when nothing is exposed
    pub async fn unexpose(&self) {
        let mut server = self.shared.server.lock().await;
        // Under the lock, so a timer armed by an in-flight expose is covered too.
        self.shared.timeout.cancel();
        self.shared.epoch.fetch_add(1, Ordering::SeqCst);
        if !server.is_running() {
            return;
        }

        server.stop().await;
        self.shared.hosts.remove_all();
        self.publish(ExposeStatus::Stopped);
        tracing::info!("Exposure ended");
    }

    pub fn is_expired(&self) -> bool {
        self.shared.timeout.is_expired()
    }

    /// Server state while the exposure is ready
    pub fn state(&self) -> Option<ServerState> {
        match &*self.shared.status.borrow() {
            ExposeStatus::Ready { state, .. } => Some(state.clone()),
            _ => None,
        }
    }

    pub fn hosts(&self) -> &HostEntryManager {
        &self.shared.hosts
    }

    fn publish(&self, status: ExposeStatus) {
        self.shared.status.send_replace(status);
    }

    /// Roll back hosts edits and report the failure
    fn fail(&self, error: PreviewError) -> PreviewError {
        self.shared.hosts.remove_all();
        tracing::error!(status = error.status(), error = %error, "Exposure failed");
        self.publish(ExposeStatus::Failed {
            reason: error.to_string(),
        });
        error
    }

    fn arm(&self, duration: Duration) -> DateTime<Utc> {
        let epoch = self.shared.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let shared = Arc::downgrade(&self.shared);
        self.shared
            .timeout
            .start(move || spawn_expiry(shared, epoch), duration);

        chrono::Duration::from_std(duration)
            .ok()
            .and_then(|delta| Utc::now().checked_add_signed(delta))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}

fn spawn_expiry(shared: Weak<Shared>, epoch: u64) {
    let Some(shared) = shared.upgrade() else {
        return;
    };
    tokio::spawn(async move {
        let mut server = shared.server.lock().await;
        if shared.epoch.load(Ordering::SeqCst) != epoch || !server.is_running() {
            return;
        }

        server.stop().await;
        shared.hosts.remove_all();
        shared.status.send_replace(ExposeStatus::Expired);
        tracing::info!("Exposure expired");
    });
}

impl Drop for Shared {
    fn drop(&mut self) {
        self.timeout.cancel();
        self.hosts.remove_all();
    }
}

/// Hostname part of a domain that may carry a scheme or port
fn host_of(domain: &str) -> String {
    let authority = domain
        .split_once("://")
        .map_or(domain, |(_, rest)| rest)
        .split('/')
        .next()
        .unwrap_or_default();
    let host = match authority.rfind(']') {
        Some(end) => &authority[..=end],
        None => authority.split(':').next().unwrap_or_default(),
    };
    host.to_ascii_lowercase()
}

fn public_url(state: &ServerState, hostname: Option<&str>) -> String {
    let Some(hostname) = hostname else {
        return state.url.clone();
    };
    let scheme = if state.use_https { "https" } else { "http" };
    match (state.use_https, state.port) {
        (false, 80) | (true, 443) => format!("{}://{}", scheme, hostname),
        (_, port) => format!("{}://{}:{}", scheme, hostname, port),
    }
}
