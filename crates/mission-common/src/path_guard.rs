use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PathError {
    #[error("path is required")]
    Missing,
    #[error("path contains a forbidden sequence: {0}")]
    Invalid(String),
    #[error("path escapes document root")]
    Escapes,
    #[error("path not found: {0}")]
    NotFound(PathBuf),
    #[error("io error at {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
}

/// Which of the two browsable roots a client path refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentRoot {
    Workspace,
    Memory,
}

impl DocumentRoot {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Workspace => "root",
            Self::Memory => "memory",
        }
    }

    pub fn url_prefix(&self) -> &'static str {
        match self {
            Self::Workspace => "/workspace/",
            Self::Memory => "/memory/",
        }
    }
}

/// Rejects client-supplied paths before any filesystem access happens.
pub fn check_request_path(raw: &str) -> Result<(), PathError> {
    if raw.trim().is_empty() {
        return Err(PathError::Missing);
    }
    for needle in ["..", "//", "\\", "\0"] {
        if raw.contains(needle) {
            return Err(PathError::Invalid(needle.escape_default().to_string()));
        }
    }
    Ok(())
}

/// Maps `/memory/<x>` and `/workspace/<x>` (or a bare relative path) to a root
/// and a relative remainder.
pub fn split_document_path(raw: &str) -> Result<(DocumentRoot, String), PathError> {
    check_request_path(raw)?;
    let raw = raw.trim();
    let (root, rest) = if let Some(rest) = raw.strip_prefix(DocumentRoot::Memory.url_prefix()) {
        (DocumentRoot::Memory, rest)
    } else if let Some(rest) = raw.strip_prefix(DocumentRoot::Workspace.url_prefix()) {
        (DocumentRoot::Workspace, rest)
    } else {
        (DocumentRoot::Workspace, raw.trim_start_matches('/'))
    };
    if rest.is_empty() || rest.ends_with('/') {
        return Err(PathError::Missing);
    }
    Ok((root, rest.to_string()))
}

/// Canonicalizes and validates a document root directory.
pub fn canonicalize_existing_dir(path: &Path) -> Result<PathBuf, PathError> {
    let canonical = path.canonicalize().map_err(|source| io_or_missing(path, source))?;
    if !canonical.is_dir() {
        return Err(PathError::NotFound(canonical));
    }
    Ok(canonical)
}

/// Resolves an existing file and enforces it stays inside `root`.
pub fn resolve_existing_path_within(root: &Path, relative: &str) -> Result<PathBuf, PathError> {
    check_request_path(relative)?;
    let root = canonicalize_existing_dir(root)?;
    let candidate = root.join(relative.trim_start_matches('/'));
    let canonical = candidate
        .canonicalize()
        .map_err(|source| io_or_missing(&candidate, source))?;
    if !canonical.starts_with(&root) {
        return Err(PathError::Escapes);
    }
    Ok(canonical)
}

/// Resolves a write target. Nothing is created until the deepest existing
/// ancestor is known to sit inside `root`, and the target itself may not be a
/// symlink.
pub fn resolve_write_path_within(root: &Path, relative: &str) -> Result<PathBuf, PathError> {
    check_request_path(relative)?;
    let root = canonicalize_existing_dir(root)?;
    let absolute = root.join(relative.trim_start_matches('/'));
    let file_name = absolute
        .file_name()
        .ok_or(PathError::Missing)?
        .to_os_string();
    let parent = absolute.parent().ok_or(PathError::Escapes)?;
    if !parent.starts_with(&root) {
        return Err(PathError::Escapes);
    }

    let ancestor = deepest_existing_ancestor(parent).ok_or(PathError::Escapes)?;
    let canonical_ancestor = ancestor
        .canonicalize()
        .map_err(|source| io_or_missing(ancestor, source))?;
    if !canonical_ancestor.starts_with(&root) {
        return Err(PathError::Escapes);
    }

    fs::create_dir_all(parent).map_err(|source| PathError::Io {
        path: parent.to_path_buf(),
        source,
    })?;
    let canonical_parent = parent
        .canonicalize()
        .map_err(|source| io_or_missing(parent, source))?;
    if !canonical_parent.starts_with(&root) {
        return Err(PathError::Escapes);
    }

    let target = canonical_parent.join(file_name);
    match fs::symlink_metadata(&target) {
        Ok(meta) if meta.file_type().is_symlink() => Err(PathError::Escapes),
        _ => Ok(target),
    }
}

fn deepest_existing_ancestor(path: &Path) -> Option<&Path> {
    path.ancestors()
        .find(|candidate| fs::symlink_metadata(candidate).is_ok())
}

fn io_or_missing(path: &Path, source: io::Error) -> PathError {
    if source.kind() == io::ErrorKind::NotFound {
        PathError::NotFound(path.to_path_buf())
    } else {
        PathError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}
