use std::path::{Component, Path, PathBuf};

use crate::error::{FsError, Result};

/// Lexically normalize a path: resolve `.` and `..`, keep it rooted if it
/// was rooted. Never touches the filesystem.
pub fn normalize(path: &Path) -> PathBuf {
    let mut result = PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                result.pop();
            }
            Component::Normal(part) => result.push(part),
            Component::RootDir => result.push("/"),
            Component::Prefix(prefix) => result.push(prefix.as_os_str()),
            Component::CurDir => {}
        }
    }
    result
}

/// Join a relative path onto a base directory, rejecting anything that
/// escapes the base after normalization. This is the zip-slip guard used
/// for stored record paths and request keys alike.
pub fn safe_join(base: impl AsRef<Path>, relative: impl AsRef<Path>) -> Result<PathBuf> {
    let base = base.as_ref();
    let relative = relative.as_ref();

    if relative.is_absolute() {
        return Err(FsError::AbsolutePath(relative.to_path_buf()));
    }

    let resolved = normalize(&base.join(relative));
    if !resolved.starts_with(normalize(base)) {
        return Err(FsError::PathEscape {
            path: relative.to_path_buf(),
            base: base.to_path_buf(),
        });
    }
    Ok(resolved)
}

/// Render a relative path with forward slashes regardless of host OS.
/// Stored database paths use this form.
pub fn to_portable(relative: &Path) -> String {
    let parts: Vec<String> = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    parts.join("/")
}
