//! Preview server lifecycle
//!
//! One [`PreviewServer`] owns at most one listener. `start` is idempotent while
//! running, binds strictly to `127.0.0.1`, and retries a bounded number of
//! times when the chosen port is taken between probe and bind.

use std::net::{Ipv4Addr, SocketAddrV4, TcpListener};
use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;

use super::error::{BindError, ServerError};
use super::path::PathResolver;
use super::port::{PortAllocator, PortHint};
use super::routes::StaticSite;
use crate::core::{PreviewError, Result, ServerConfig};
use crate::tls::{CertificateBundle, CertificateProvider};

/// Address every preview listener binds to
pub const LOOPBACK: Ipv4Addr = Ipv4Addr::LOCALHOST;

/// Snapshot of a running preview
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerState {
    /// `http(s)://127.0.0.1:<port>`
    pub url: String,
    pub port: u16,
    pub started_at: DateTime<Utc>,
    pub use_https: bool,
}

impl ServerState {
    fn new(port: u16, use_https: bool) -> Self {
        let scheme = if use_https { "https" } else { "http" };
        Self {
            url: format!("{}://{}:{}", scheme, LOOPBACK, port),
            port,
            started_at: Utc::now(),
            use_https,
        }
    }
}

/// Lifecycle phase of a preview server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerPhase {
    Stopped,
    Starting,
    Running,
}

/// Options for a single `start` call
#[derive(Debug, Clone)]
pub struct StartOptions {
    /// Directory served as the document root
    pub root: PathBuf,
    pub use_https: bool,
    /// Certificate domains; empty uses the configured defaults
    pub domains: Vec<String>,
    /// Caller-supplied certificate, bypassing the provider
    pub certificate: Option<Arc<CertificateBundle>>,
    pub port_hint: PortHint,
}

impl StartOptions {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            use_https: false,
            domains: Vec::new(),
            certificate: None,
            port_hint: PortHint::Default,
        }
    }

    pub fn with_https(mut self, use_https: bool) -> Self {
        self.use_https = use_https;
        self
    }

    pub fn with_domains(mut self, domains: Vec<String>) -> Self {
        self.domains = domains;
        self
    }

    pub fn with_certificate(mut self, certificate: Arc<CertificateBundle>) -> Self {
        self.certificate = Some(certificate);
        self
    }

    pub fn with_port_hint(mut self, hint: PortHint) -> Self {
        self.port_hint = hint;
        self
    }
}

struct RunningServer {
    state: ServerState,
    handle: Handle,
    task: JoinHandle<std::io::Result<()>>,
}

/// A loopback HTTP(S) listener serving one preview root
pub struct PreviewServer {
    config: ServerConfig,
    ports: Arc<PortAllocator>,
    certificates: Arc<CertificateProvider>,
    phase: ServerPhase,
    running: Option<RunningServer>,
}

impl PreviewServer {
    pub fn new(
        config: ServerConfig,
        ports: Arc<PortAllocator>,
        certificates: Arc<CertificateProvider>,
    ) -> Self {
        Self {
            config,
            ports,
            certificates,
            phase: ServerPhase::Stopped,
            running: None,
        }
    }

    /// Start serving, or return the existing state when already running
    pub async fn start(&mut self, options: StartOptions) -> Result<ServerState> {
        if let Some(running) = &self.running {
            tracing::debug!(url = %running.state.url, "Preview server already running");
            return Ok(running.state.clone());
        }

        self.phase = ServerPhase::Starting;
        match self.launch(options).await {
            Ok(running) => {
                let state = running.state.clone();
                self.running = Some(running);
                self.phase = ServerPhase::Running;
                tracing::info!(url = %state.url, "Preview server started");
                Ok(state)
            }
            Err(e) => {
                self.phase = ServerPhase::Stopped;
                tracing::error!(status = e.status(), error = %e, "Preview server failed to start");
                Err(e)
            }
        }
    }

    async fn launch(&self, options: StartOptions) -> Result<RunningServer> {
        let resolver = PathResolver::new(&options.root)?;
        let router = StaticSite::new(resolver, &self.config).router();

        let tls = if options.use_https {
            let bundle = match options.certificate {
                Some(bundle) => bundle,
                None => {
                    let domains = if options.domains.is_empty() {
                        self.certificates.default_domains().to_vec()
                    } else {
                        options.domains.clone()
                    };
                    self.certificates.get_certificate(&domains)?
                }
            };
            let config = RustlsConfig::from_pem(bundle.cert.clone(), bundle.key.clone())
                .await
                .map_err(|source| ServerError::TlsSetup { source })?;
            Some(config)
        } else {
            None
        };

        let listener = self.bind(&options.port_hint, options.use_https)?;
        let port = listener
            .local_addr()
            .map_err(|source| BindError::Unavailable { port: 0, source })?
            .port();
        self.ports.remember(port);

        let handle = Handle::new();
        let task = spawn_listener(listener, router, tls, handle.clone());

        Ok(RunningServer {
            state: ServerState::new(port, options.use_https),
            handle,
            task,
        })
    }

    /// Bind the loopback listener, re-probing after each failed attempt
    fn bind(&self, hint: &PortHint, use_https: bool) -> Result<TcpListener> {
        let attempts = self.config.max_bind_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            let port = self.ports.get_port(hint, Some(use_https))?;
            match bind_loopback(port) {
                Ok(listener) => return Ok(listener),
                Err(source) if is_fixed_port(hint, port) => {
                    // An explicit port never changes between attempts.
                    self.ports.clear_cached_port();
                    return Err(PreviewError::from(BindError::Unavailable { port, source }));
                }
                Err(e) => {
                    tracing::warn!(port, attempt, error = %e, "Bind failed, re-probing");
                    self.ports.clear_cached_port();
                    last_error = Some(e);
                }
            }
        }

        Err(PreviewError::from(BindError::AttemptsExhausted {
            attempts,
            source: last_error,
        }))
    }

    /// Stop serving; open keep-alive connections are closed immediately
    pub async fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };

        running.handle.shutdown();
        match running.task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(error = %e, "Preview listener ended with an error"),
            Err(e) => tracing::warn!(error = %e, "Preview listener task failed"),
        }

        self.phase = ServerPhase::Stopped;
        tracing::info!(url = %running.state.url, "Preview server stopped");
    }

    pub fn state(&self) -> Option<ServerState> {
        self.running.as_ref().map(|running| running.state.clone())
    }

    pub fn phase(&self) -> ServerPhase {
        self.phase
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    pub fn ports(&self) -> &Arc<PortAllocator> {
        &self.ports
    }

    /// Forget the remembered port so the next start probes again
    pub fn clear_cached_port(&self) {
        self.ports.clear_cached_port();
    }
}

impl Drop for PreviewServer {
    fn drop(&mut self) {
        if let Some(running) = self.running.take() {
            running.handle.shutdown();
        }
    }
}

/// Whether `port` is the caller's explicit choice rather than a cached or probed one
fn is_fixed_port(hint: &PortHint, port: u16) -> bool {
    port != 0 && hint.explicit_port() == Some(port)
}

fn bind_loopback(port: u16) -> std::io::Result<TcpListener> {
    let listener = TcpListener::bind(SocketAddrV4::new(LOOPBACK, port))?;
    listener.set_nonblocking(true)?;
    Ok(listener)
}

fn spawn_listener(
    listener: TcpListener,
    router: Router,
    tls: Option<RustlsConfig>,
    handle: Handle,
) -> JoinHandle<std::io::Result<()>> {
    let service = router.into_make_service();
    match tls {
        Some(config) => tokio::spawn(
            axum_server::tls_rustls::from_tcp_rustls(listener, config)
                .handle(handle)
                .serve(service),
        ),
        None => tokio::spawn(axum_server::from_tcp(listener).handle(handle).serve(service)),
    }
}
