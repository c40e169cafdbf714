// Path canonicalization for registry keys: absolute, symlink-resolved when
// possible, lexically cleaned otherwise.

use std::path::{Component, Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PathError {
    #[error("path is empty")]
    Empty,

    #[error("path contains null byte")]
    NullByte,

    #[error("path escapes the filesystem root: {0}")]
    AboveRoot(String),
}

/// Resolve `input` into the canonical absolute form used as a registry key.
///
/// Rules:
/// - Reject empty paths and paths containing null bytes
/// - Resolve relative paths against `cwd`
/// - Use the OS canonical path (symlinks resolved) when the file exists
/// - Otherwise collapse `.` and `..` components lexically
///
/// Two spellings of the same existing file always normalize to the same key.
pub fn normalize_path(input: &Path, cwd: &Path) -> Result<PathBuf, PathError> {
    let raw = input.as_os_str();
    if raw.is_empty() {
        return Err(PathError::Empty);
    }
    if raw.to_string_lossy().contains('\0') {
        return Err(PathError::NullByte);
    }

    let absolute = if input.is_absolute() { input.to_path_buf() } else { cwd.join(input) };

    // Missing files or dangling symlinks fall back to the lexical form.
    if let Ok(canonical) = absolute.canonicalize() {
        return Ok(canonical);
    }

    lexical_normalize(&absolute)
}

fn lexical_normalize(path: &Path) -> Result<PathBuf, PathError> {
    let mut result = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(prefix) => result.push(prefix.as_os_str()),
            Component::RootDir => result.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                if !result.pop() || result.as_os_str().is_empty() {
                    return Err(PathError::AboveRoot(path.display().to_string()));
                }
            }
            Component::Normal(part) => result.push(part),
        }
    }
    Ok(result)
}
