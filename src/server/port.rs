//! Loopback port selection with probing and reuse

use std::net::{Ipv4Addr, SocketAddrV4, TcpListener};

use parking_lot::Mutex;

use super::error::BindError;
use crate::core::PortConfig;

/// What the caller would like to listen on
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum PortHint {
    /// Protocol default (80 / 443), or the service port when unknown
    #[default]
    Default,
    /// A specific port; `0` lets the OS pick an ephemeral one
    Port(u16),
    /// A domain, optionally carrying an explicit port (`preview.test:8443`)
    Domain(String),
}

impl PortHint {
    /// The explicit port embedded in a `host:port` domain, if any
    pub fn explicit_port(&self) -> Option<u16> {
        match self {
            PortHint::Port(port) => Some(*port),
            PortHint::Domain(domain) => domain_port(domain),
            PortHint::Default => None,
        }
    }
}

fn domain_port(domain: &str) -> Option<u16> {
    let authority = domain
        .split_once("://")
        .map_or(domain, |(_, rest)| rest)
        .split('/')
        .next()
        .unwrap_or_default();
    // Bracketed IPv6 authorities keep their colons inside the brackets.
    let host_end = authority.rfind(']').map_or(0, |i| i + 1);
    authority[host_end..]
        .rsplit_once(':')
        .and_then(|(_, port)| port.parse().ok())
}

/// Picks and remembers the port a preview listens on
#[derive(Debug)]
pub struct PortAllocator {
    config: PortConfig,
    cached: Mutex<Option<u16>>,
}

impl PortAllocator {
    pub fn new(config: PortConfig) -> Self {
        Self {
            config,
            cached: Mutex::new(None),
        }
    }

    /// Resolve a port for the next bind.
    ///
    /// `use_https` is `None` when the protocol is not known yet.
    pub fn get_port(&self, hint: &PortHint, use_https: Option<bool>) -> Result<u16, BindError> {
        if let Some(port) = *self.cached.lock() {
            tracing::debug!(port, "Reusing cached port");
            return Ok(port);
        }

        if let Some(port) = hint.explicit_port() {
            let port = if port == 0 { self.ephemeral()? } else { port };
            self.remember(port);
            return Ok(port);
        }

        let preferred = match use_https {
            Some(true) => self.config.https_port,
            Some(false) => self.config.http_port,
            None => self.config.service_port,
        };

        let port = match probe(preferred) {
            Ok(()) => preferred,
            Err(e) => {
                tracing::debug!(port = preferred, error = %e, "Preferred port unavailable, probing");
                self.probe_upward()?
            }
        };

        self.remember(port);
        Ok(port)
    }

    /// Remember a port that a listener actually bound
    pub fn remember(&self, port: u16) {
        *self.cached.lock() = Some(port);
    }

    /// Forget the remembered port so the next call probes again
    pub fn clear_cached_port(&self) {
        if let Some(port) = self.cached.lock().take() {
            tracing::debug!(port, "Cleared cached port");
        }
    }

    pub fn cached_port(&self) -> Option<u16> {
        *self.cached.lock()
    }

    fn probe_upward(&self) -> Result<u16, BindError> {
        let (start, end) = (self.config.probe_start, self.config.probe_end);
        (start..=end)
            .find(|&port| probe(port).is_ok())
            .ok_or(BindError::RangeExhausted { start, end })
    }

    fn ephemeral(&self) -> Result<u16, BindError> {
        TcpListener::bind(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 0))
            .and_then(|listener| listener.local_addr())
            .map(|addr| addr.port())
            .map_err(|source| BindError::Unavailable { port: 0, source })
    }
}

/// Check that `port` can currently be bound on loopback
fn probe(port: u16) -> std::io::Result<()> {
    TcpListener::bind(SocketAddrV4::new(Ipv4Addr::LOCALHOST, port)).map(drop)
}
