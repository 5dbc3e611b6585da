//! Workspace confinement for file and code tools.
//!
//! Every path a tool receives from the model is interpreted relative to
//! the configured workspace directory and must stay inside it.

use std::path::{Component, Path, PathBuf};

/// Error returned when a requested path cannot be used.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum PathError {
    #[error("Path is empty")]
    Empty,

    #[error("Path traversal detected in '{0}'")]
    Traversal(String),

    #[error("Absolute paths are not allowed: '{0}'")]
    Absolute(String),
}

/// Resolve a model-supplied relative path inside `root`.
///
/// `..`, absolute paths and drive prefixes are rejected outright; no
/// filesystem access happens here.
pub fn resolve(root: &Path, requested: &str) -> Result<PathBuf, PathError> {
    let requested = requested.trim();
    if requested.is_empty() {
        return Err(PathError::Empty);
    }

    let normalized = requested.replace('\\', "/");
    let mut resolved = root.to_path_buf();
    for component in Path::new(&normalized).components() {
        match component {
            Component::Normal(part) => resolved.push(part),
            Component::CurDir => {}
            Component::ParentDir => return Err(PathError::Traversal(requested.to_string())),
            Component::RootDir | Component::Prefix(_) => {
                return Err(PathError::Absolute(requested.to_string()));
            }
        }
    }

    if resolved == root {
        return Err(PathError::Empty);
    }
    Ok(resolved)
}

/// Cut `text` to at most `max_chars` characters, marking the cut.
pub fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => format!("{}...(truncated)", &text[..byte_idx]),
        None => text.to_string(),
    }
}
