//! Traversal-safe resolution of request paths onto a preview root

use std::path::{Component, Path, PathBuf, MAIN_SEPARATOR};

use super::error::ServerError;

/// Outcome of resolving a request path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    /// The path lies at or below the root
    Path(PathBuf),
    /// The path escapes the root; callers answer with a bare 404
    Rejected,
}

impl Resolved {
    pub fn is_rejected(&self) -> bool {
        matches!(self, Resolved::Rejected)
    }

    pub fn into_path(self) -> Option<PathBuf> {
        match self {
            Resolved::Path(path) => Some(path),
            Resolved::Rejected => None,
        }
    }
}

/// Joins request paths onto a canonical root directory
#[derive(Debug, Clone)]
pub struct PathResolver {
    root: PathBuf,
    root_prefix: String,
}

impl PathResolver {
    /// Canonicalize `root` and build a resolver for it
    pub fn new(root: impl AsRef<Path>) -> Result<Self, ServerError> {
        let root = root.as_ref();
        let canonical = std::fs::canonicalize(root).map_err(|source| ServerError::RootUnavailable {
            path: root.to_path_buf(),
            source,
        })?;
        if !canonical.is_dir() {
            return Err(ServerError::RootUnavailable {
                path: root.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "not a directory"),
            });
        }
        Ok(Self::from_canonical(canonical))
    }

    /// Build a resolver for a root that is already absolute and normalized
    pub fn from_canonical(root: PathBuf) -> Self {
        let mut root_prefix = root.to_string_lossy().into_owned();
        if !root_prefix.ends_with(MAIN_SEPARATOR) {
            root_prefix.push(MAIN_SEPARATOR);
        }
        Self { root, root_prefix }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a raw (possibly percent-encoded) request path
    pub fn resolve(&self, request_path: &str) -> Resolved {
        if request_path.is_empty() {
            return Resolved::Path(self.root.clone());
        }

        let decoded = match urlencoding::decode(request_path) {
            Ok(decoded) => decoded.into_owned(),
            Err(_) => request_path.to_string(),
        };
        if decoded.contains('\0') {
            return Resolved::Rejected;
        }

        let candidate = self.join_normalized(&decoded);
        if self.contains(&candidate) {
            Resolved::Path(candidate)
        } else {
            Resolved::Rejected
        }
    }

    /// Acceptance rule: equal to the root, or the root plus a separator prefix
    pub fn contains(&self, candidate: &Path) -> bool {
        if candidate == self.root {
            return true;
        }
        candidate.to_string_lossy().starts_with(&self.root_prefix)
    }

    /// Lexically join `relative` onto the root, resolving `.` and `..`
    ///
    /// Leading separators do not reset to the filesystem root; `..` may climb
    /// above the preview root, which `contains` then refuses.
    fn join_normalized(&self, relative: &str) -> PathBuf {
        let mut joined = self.root.clone();
        for segment in relative.split(|c| c == '/' || c == '\\') {
            match segment {
                "" | "." => {}
                ".." => {
                    joined.pop();
                }
                other => {
                    // A segment such as "C:" would otherwise replace the root on Windows.
                    let mut components = Path::new(other).components();
                    match (components.next(), components.next()) {
                        (Some(Component::Normal(name)), None) => joined.push(name),
                        _ => return PathBuf::new(),
                    }
                }
            }
        }
        joined
    }
}
