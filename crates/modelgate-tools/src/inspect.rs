//! Path-scoped file inspector.
//!
//! Read-only metadata operations over untrusted, model-supplied paths. Every
//! candidate path runs through a reject-list and two independent containment
//! checks before any filesystem call.

use std::path::{Path, PathBuf};

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum InspectError {
    #[error("path rejected: {reason}")]
    Rejected { reason: &'static str },

    #[error("unknown operation: {0}")]
    UnknownOperation(String),

    #[error("I/O failure: {0}")]
    Io(String),
}

/// Supported read-only operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InspectOp {
    Exists,
    Stat,
    List,
}

impl InspectOp {
    /// # Errors
    ///
    /// Returns `InspectError::UnknownOperation` for anything else.
    pub fn parse(op: &str) -> Result<Self, InspectError> {
        match op {
            "exists" => Ok(Self::Exists),
            "stat" => Ok(Self::Stat),
            "list" => Ok(Self::List),
            other => Err(InspectError::UnknownOperation(other.to_owned())),
        }
    }
}

/// Validate an untrusted path against `root` and resolve it.
///
/// Reject-list first: traversal tokens, home shorthand, NUL bytes, percent
/// escapes in any form, backslashes, absolute paths, drive letters. The
/// survivor is resolved against `root`; the resolved path must still start
/// with `root` and its relativized form must not begin with a traversal
/// token. Both containment checks must pass.
///
/// # Errors
///
/// Returns `InspectError::Rejected` on any violation; never a partial result.
pub fn validate_path(raw: &str, root: &Path) -> Result<PathBuf, InspectError> {
    let reject = |reason| Err(InspectError::Rejected { reason });

    if raw.is_empty() {
        return reject("empty path");
    }
    if raw.split(['/', '\\']).any(|seg| seg == "..") || raw.contains("..") {
        return reject("parent traversal");
    }
    if raw.starts_with('~') {
        return reject("home shorthand");
    }
    if raw.contains('\0') {
        return reject("null byte");
    }
    // Any percent sign is treated as an encoding attempt; double and triple
    // encodings all still contain one.
    if raw.contains('%') {
        return reject("percent escape");
    }
    if raw.contains('\\') {
        return reject("backslash");
    }
    if raw.starts_with('/') {
        return reject("absolute path");
    }
    if raw.len() >= 2 && raw.as_bytes()[1] == b':' && raw.as_bytes()[0].is_ascii_alphabetic() {
        return reject("drive letter");
    }

    let resolved = resolve_via_ancestors(&root.join(raw));
    let canonical_root = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());

    if !resolved.starts_with(&canonical_root) {
        return reject("escapes working directory");
    }
    let relative = resolved
        .strip_prefix(&canonical_root)
        .map_err(|_| InspectError::Rejected {
            reason: "escapes working directory",
        })?;
    if relative
        .components()
        .next()
        .is_some_and(|c| matches!(c, std::path::Component::ParentDir))
    {
        return reject("parent traversal");
    }

    Ok(resolved)
}

/// Run one inspection against a validated path under `root`.
///
/// # Errors
///
/// Returns `InspectError` for rejected paths or filesystem failures.
pub fn inspect(op: InspectOp, raw_path: &str, root: &Path) -> Result<serde_json::Value, InspectError> {
    let path = validate_path(raw_path, root)?;
    match op {
        InspectOp::Exists => Ok(serde_json::json!({ "exists": path.exists() })),
        InspectOp::Stat => {
            let metadata = std::fs::metadata(&path).map_err(|e| InspectError::Io(e.to_string()))?;
            let modified = metadata
                .modified()
                .ok()
                .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                .map(|d| d.as_secs());
            Ok(serde_json::json!({
                "is_file": metadata.is_file(),
                "is_dir": metadata.is_dir(),
                "size": metadata.len(),
                "modified": modified,
            }))
        }
        InspectOp::List => {
            let entries = std::fs::read_dir(&path).map_err(|e| InspectError::Io(e.to_string()))?;
            let mut names: Vec<String> = entries
                .filter_map(Result::ok)
                .map(|e| e.file_name().to_string_lossy().into_owned())
                .collect();
            names.sort();
            Ok(serde_json::json!({ "entries": names }))
        }
    }
}

/// Canonicalize a path by walking up to the nearest existing ancestor, so
/// non-existent leaves still resolve through real symlinks.
fn resolve_via_ancestors(path: &Path) -> PathBuf {
    let mut existing = path;
    let mut suffix = PathBuf::new();
    while !existing.exists() {
        if let Some(parent) = existing.parent() {
            if let Some(name) = existing.file_name() {
                suffix = PathBuf::from(name).join(&suffix);
            }
            existing = parent;
        } else {
            break;
        }
    }
    let base = existing.canonicalize().unwrap_or(existing.to_path_buf());
    if suffix.as_os_str().is_empty() {
        base
    } else {
        base.join(&suffix)
    }
}
