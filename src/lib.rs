//! Preview Server - isolated local preview of web builds
//!
//! This crate provides:
//! - Loopback-only HTTP(S) serving of a build directory
//! - Traversal-safe request path resolution
//! - Port selection with probing, caching and bounded bind retries
//! - A local certificate authority issuing memoized leaf certificates
//! - Opt-in exposure under a custom domain via the OS hosts table
//! - Cancelable session timeouts for exposed previews

pub mod core;
pub mod expose;
pub mod hosts;
pub mod logging;
pub mod server;
pub mod session;
pub mod tls;

// Re-export commonly used items
pub use core::config::PreviewConfig;
pub use core::error::{PreviewError, Result};
pub use expose::{ExposeController, ExposeOptions, ExposeStatus};
pub use hosts::HostEntryManager;
pub use server::{PathResolver, PortAllocator, PortHint, PreviewServer, ServerState, StartOptions};
pub use session::SessionTimeout;
pub use tls::{CertificateBundle, CertificateProvider, TrustStatus};
