//! Project-root path handling.
//!
//! Extraction only reads files that resolve inside the project root, and every
//! path that ends up in the IR (and therefore in diagnostics) is stored
//! relative to that root.

use camino::{Utf8Path, Utf8PathBuf};
use std::path::{Component, Path, PathBuf};

/// Why a path failed the project-root check.
#[derive(Debug, thiserror::Error)]
pub enum PathValidationError {
    #[error("{0} does not exist or cannot be resolved")]
    CannotCanonicalize(String),

    #[error("{0} resolves outside the project root {1}")]
    OutsideRoot(String, String),
}

fn resolve(path: &Path) -> Result<PathBuf, PathValidationError> {
    path.canonicalize()
        .map_err(|_| PathValidationError::CannotCanonicalize(path.display().to_string()))
}

/// Resolve symlinks, `.` and `..` in both paths and require `path` under `root`.
///
/// Returns the resolved path.
pub fn validate_path_within_root(path: &Path, root: &Path) -> Result<PathBuf, PathValidationError> {
    let resolved = resolve(path)?;
    let resolved_root = resolve(root)?;
    if resolved.starts_with(&resolved_root) {
        Ok(resolved)
    } else {
        Err(PathValidationError::OutsideRoot(
            resolved.display().to_string(),
            resolved_root.display().to_string(),
        ))
    }
}

/// Lexically normalize a path: drop `.` components and fold `..` where possible.
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Render `path` for storage in the IR.
///
/// Paths under `root` become root-relative with `/` separators; anything else
/// is kept as given so that users who configured outside paths still see them.
pub fn display_path(path: &Path, root: &Path) -> String {
    let path = normalize_lexically(path);
    let root = normalize_lexically(root);
    let relative = path.strip_prefix(&root).map(Path::to_path_buf).unwrap_or(path);

    match Utf8PathBuf::from_path_buf(relative) {
        Ok(utf8) => slash_path(&utf8),
        Err(raw) => raw.to_string_lossy().replace('\\', "/"),
    }
}

fn slash_path(path: &Utf8Path) -> String {
    path.as_str().replace('\\', "/")
}
