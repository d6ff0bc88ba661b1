use std::path::{Component, Path};

use crate::TransferError;

/// Checks that a manifest-relative path cannot escape the deployment
/// root: non-empty, not absolute, no `..`, no Windows prefix components.
pub fn validate_relative_path(file_path: &str) -> Result<(), TransferError> {
    if file_path.is_empty() {
        return Err(TransferError::InvalidPath("empty path".into()));
    }

    let path = Path::new(file_path);
    if path.is_absolute() {
        return Err(invalid(file_path, "absolute path"));
    }

    for component in path.components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            Component::ParentDir => {
                return Err(invalid(file_path, "parent directory traversal"));
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(invalid(file_path, "absolute path"));
            }
        }
    }

    Ok(())
}

fn invalid(path: &str, what: &str) -> TransferError {
    TransferError::InvalidPath(format!("{what} not allowed: {path}"))
}
