//! Local Preview Server
//!
//! Serves a build directory over HTTP or HTTPS on the loopback interface.
//!
//! Security features:
//! - Traversal-safe path resolution (rejections answer a bare 404)
//! - Symlink escape guard for files inside the root
//! - Security response headers (X-Content-Type-Options, X-Frame-Options, Cache-Control)
//! - Loopback-only binding

mod error;
mod path;
mod port;
mod routes;
#[allow(clippy::module_inception)]
mod server;

pub use error::{BindError, ServerError};
pub use path::{PathResolver, Resolved};
pub use port::{PortAllocator, PortHint};
pub use routes::{security_headers, serve_static, StaticSite};
pub use server::{PreviewServer, ServerPhase, ServerState, StartOptions, LOOPBACK};
