use std::io::{self, ErrorKind};
use std::path::Path;

use crate::error::{FsError, Result};

/// Move a staged file into its final location.
///
/// Tries a rename first; falls back to copy-and-remove when the staging
/// directory is on a different filesystem. Disk-full and permission
/// failures are classified so operators see the real cause.
pub async fn place_file(staged: &Path, destination: &Path) -> Result<()> {
    if let Some(parent) = destination.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| classify(destination, e))?;
    }

    match tokio::fs::rename(staged, destination).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::CrossesDevices => {
            tokio::fs::copy(staged, destination)
                .await
                .map_err(|e| classify(destination, e))?;
            tracing::debug!(staged = %staged.display(), "cross-device place, copied");
            // Leftover staging file is cleaned up best-effort.
            let _ = tokio::fs::remove_file(staged).await;
            Ok(())
        }
        Err(e) => Err(classify(destination, e)),
    }
}

fn classify(path: &Path, source: io::Error) -> FsError {
    match source.kind() {
        ErrorKind::StorageFull => FsError::DiskFull {
            path: path.to_path_buf(),
            source,
        },
        ErrorKind::PermissionDenied => FsError::PermissionDenied {
            path: path.to_path_buf(),
            source,
        },
        _ => FsError::Place {
            path: path.to_path_buf(),
            source,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn place_moves_file() {
        let dir = tempfile::tempdir().unwrap();
        let staged = dir.path().join("staged.tmp");
        let dest = dir.path().join("content/final.zip");
        std::fs::write(&staged, b"payload").unwrap();

        place_file(&staged, &dest).await.unwrap();

        assert!(!staged.exists());
        assert_eq!(std::fs::read(&dest).unwrap(), b"payload");
    }

    #[tokio::test]
    async fn place_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let staged = dir.path().join("staged.tmp");
        let dest = dir.path().join("a/b/c/final.zip");
        std::fs::write(&staged, b"x").unwrap();

        place_file(&staged, &dest).await.unwrap();
        assert!(dest.exists());
    }
}
