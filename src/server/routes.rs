//! Static preview routes and middleware
//!
//! Every request goes through the [`PathResolver`]. Rejected paths short-circuit
//! to an empty 404; resolved paths are served from disk with index-document and
//! single-page-application fallbacks.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderValue, Method, Request, StatusCode, Uri},
    middleware::{self, Next},
    response::{IntoResponse, Redirect, Response},
    Router,
};
use tower_http::trace::TraceLayer;

use super::path::{PathResolver, Resolved};
use crate::core::ServerConfig;

/// Shared state for the static handler
#[derive(Debug, Clone)]
pub struct StaticSite {
    resolver: Arc<PathResolver>,
    index_document: String,
    spa_fallback: bool,
}

impl StaticSite {
    pub fn new(resolver: PathResolver, config: &ServerConfig) -> Self {
        Self {
            resolver: Arc::new(resolver),
            index_document: config.index_document.clone(),
            spa_fallback: config.spa_fallback,
        }
    }

    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    /// Build the request pipeline for this site
    pub fn router(self) -> Router {
        Router::new()
            .fallback(serve_static)
            .layer(middleware::from_fn(security_headers))
            .layer(TraceLayer::new_for_http())
            .with_state(self)
    }

    /// Locate the file to serve for a resolved path
    async fn locate(&self, path: &Path) -> Lookup {
        let metadata = match tokio::fs::metadata(path).await {
            Ok(metadata) => metadata,
            Err(_) => return Lookup::Missing,
        };

        let file = if metadata.is_dir() {
            let index = path.join(&self.index_document);
            match tokio::fs::metadata(&index).await {
                Ok(meta) if meta.is_file() => index,
                _ => return Lookup::Missing,
            }
        } else if metadata.is_file() {
            path.to_path_buf()
        } else {
            return Lookup::Missing;
        };

        // Symlinks inside the root must not lead outside of it.
        match tokio::fs::canonicalize(&file).await {
            Ok(real) if self.resolver.contains(&real) => Lookup::File(real),
            Ok(_) => Lookup::Escaped,
            Err(_) => Lookup::Missing,
        }
    }
}

enum Lookup {
    File(PathBuf),
    Missing,
    Escaped,
}

/// Serve a file below the preview root
///
/// Route: every path (router fallback)
pub async fn serve_static(State(site): State<StaticSite>, method: Method, uri: Uri) -> Response {
    if method != Method::GET && method != Method::HEAD {
        return (
            StatusCode::METHOD_NOT_ALLOWED,
            [(header::ALLOW, "GET, HEAD")],
        )
            .into_response();
    }

    let resolved = match site.resolver.resolve(uri.path()) {
        Resolved::Path(path) => path,
        Resolved::Rejected => {
            tracing::debug!("Request outside preview root rejected");
            return not_found();
        }
    };

    match site.locate(&resolved).await {
        Lookup::File(file) => serve_file(&method, &file).await,
        Lookup::Escaped => {
            tracing::debug!("Symlink leaving preview root rejected");
            not_found()
        }
        Lookup::Missing if site.spa_fallback && resolved != site.resolver.root() => {
            Redirect::temporary("/").into_response()
        }
        Lookup::Missing => not_found(),
    }
}

async fn serve_file(method: &Method, path: &Path) -> Response {
    let mime = mime_guess::from_path(path).first_or_octet_stream();
    let content_type = HeaderValue::from_str(mime.as_ref())
        .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));

    if method == Method::HEAD {
        let len = tokio::fs::metadata(path).await.map(|m| m.len()).unwrap_or(0);
        return (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, content_type),
                (header::CONTENT_LENGTH, HeaderValue::from(len)),
            ],
        )
            .into_response();
    }

    match tokio::fs::read(path).await {
        Ok(bytes) => (StatusCode::OK, [(header::CONTENT_TYPE, content_type)], bytes).into_response(),
        Err(e) => {
            tracing::warn!(error = %e, "Failed to read preview file");
            not_found()
        }
    }
}

fn not_found() -> Response {
    (StatusCode::NOT_FOUND, Body::empty()).into_response()
}

/// Adds security response headers to every preview response
pub async fn security_headers(request: Request<Body>, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();

    // Prevent MIME type sniffing
    headers.insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );

    // Previews must always reflect the latest build
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));

    headers.insert(
        header::X_FRAME_OPTIONS,
        HeaderValue::from_static("SAMEORIGIN"),
    );

    response
}
