//! Resource path normalization and hierarchy tests.
//!
//! Lock paths are absolute, `/`-separated and case-sensitive. Collections and
//! leaves share one form: `/docs/` and `/docs` name the same resource.

use crate::error::LockError;

/// Normalize a resource path.
///
/// Repeated slashes collapse, a trailing slash is dropped (except for the root)
/// and `.`/`..` segments are rejected.
pub fn normalize(path: &str) -> Result<String, LockError> {
    if !path.starts_with('/') {
        return Err(LockError::InvalidArgument(format!(
            "lock path must be absolute: {:?}",
            path
        )));
    }

    let mut normalized = String::with_capacity(path.len());
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        if segment == "." || segment == ".." {
            return Err(LockError::InvalidArgument(format!(
                "lock path must not contain relative segments: {:?}",
                path
            )));
        }
        normalized.push('/');
        normalized.push_str(segment);
    }

    if normalized.is_empty() {
        normalized.push('/');
    }
    Ok(normalized)
}

/// The path itself and every ancestor, root first.
///
/// `/a/b` yields `/`, `/a`, `/a/b`. Expects a normalized path.
pub fn ancestors(path: &str) -> Vec<&str> {
    let mut out = vec!["/"];
    if path == "/" {
        return out;
    }
    for (idx, ch) in path.char_indices().skip(1) {
        if ch == '/' {
            out.push(&path[..idx]);
        }
    }
    out.push(path);
    out
}

/// True if `ancestor` is a strict ancestor of `path`. Both must be normalized.
pub fn is_ancestor(ancestor: &str, path: &str) -> bool {
    if ancestor == path {
        return false;
    }
    if ancestor == "/" {
        return true;
    }
    path.len() > ancestor.len()
        && path.starts_with(ancestor)
        && path.as_bytes()[ancestor.len()] == b'/'
}

/// True if `path` equals `root` or lies beneath it.
pub fn is_self_or_descendant(path: &str, root: &str) -> bool {
    path == root || is_ancestor(root, path)
}
