use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use zip::ZipArchive;

use crate::error::{MountError, Result};

/// Internal layout prefixes tried for every lookup, in order. Game packs
/// differ in whether their web root sits at the archive root or under a
/// `content/` or `htdocs/` directory.
pub const PREFIX_VARIANTS: &[&str] = &["", "content/", "htdocs/"];

struct MountEntry {
    id: String,
    archive_path: PathBuf,
    archive: ZipArchive<File>,
}

/// A mounted archive's identity, as reported by [`MountTable::list`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MountInfo {
    pub id: String,
    pub archive_path: PathBuf,
}

/// A successful lookup, tagged with the mount that produced the bytes.
#[derive(Clone, Debug)]
pub struct ArchiveHit {
    pub mount_id: String,
    pub data: Vec<u8>,
}

/// Registry of currently mounted ZIP archives.
///
/// Entries keep insertion order so that [`find`](MountTable::find) is
/// deterministic for a fixed mount set. All methods take `&self`; the
/// table is shared across request handlers behind an `Arc`.
#[derive(Default)]
pub struct MountTable {
    inner: Mutex<Vec<MountEntry>>,
}

impl MountTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open `archive_path` and register it under `id`.
    ///
    /// Re-mounting an existing id closes the prior handle before the new
    /// archive is opened, so a failed re-mount leaves the id unmounted
    /// rather than pointing at a stale archive.
    pub fn mount(&self, id: &str, archive_path: &Path) -> Result<()> {
        let mut entries = self.lock();
        if let Some(pos) = entries.iter().position(|e| e.id == id) {
            // Drop the old entry (and its file handle) before the new
            // archive is opened.
            let old = entries.remove(pos);
            tracing::info!(id, old = %old.archive_path.display(), "replacing existing mount");
            drop(old);
        }

        let file = File::open(archive_path).map_err(|source| MountError::OpenFailed {
            path: archive_path.to_path_buf(),
            source,
        })?;
        let archive = ZipArchive::new(file).map_err(|_| MountError::Corrupted {
            path: archive_path.to_path_buf(),
        })?;

        entries.push(MountEntry {
            id: id.to_string(),
            archive_path: archive_path.to_path_buf(),
            archive,
        });
        tracing::info!(id, path = %archive_path.display(), "mounted archive");
        Ok(())
    }

    /// Close and remove the entry for `id`. Returns whether one existed.
    pub fn unmount(&self, id: &str) -> bool {
        let mut entries = self.lock();
        match entries.iter().position(|e| e.id == id) {
            Some(pos) => {
                entries.remove(pos);
                tracing::info!(id, "unmounted archive");
                true
            }
            None => false,
        }
    }

    /// Close every open handle. Called at shutdown.
    pub fn unmount_all(&self) {
        let mut entries = self.lock();
        let count = entries.len();
        entries.clear();
        if count > 0 {
            tracing::info!(count, "unmounted all archives");
        }
    }

    /// Search all mounted archives, in mount order, for a file matching
    /// `relative_path` under any of the known prefix variants. Directory
    /// entries are never hits.
    pub fn find(&self, relative_path: &str) -> Option<ArchiveHit> {
        let relative_path = relative_path.trim_start_matches('/');
        let mut entries = self.lock();
        for entry in entries.iter_mut() {
            for prefix in PREFIX_VARIANTS {
                let candidate = format!("{prefix}{relative_path}");
                let mut file = match entry.archive.by_name(&candidate) {
                    Ok(f) => f,
                    Err(_) => continue,
                };
                if file.is_dir() {
                    continue;
                }
                let mut data = Vec::with_capacity(file.size() as usize);
                if let Err(e) = file.read_to_end(&mut data) {
                    tracing::warn!(
                        mount = entry.id,
                        entry = candidate,
                        error = %e,
                        "failed to read archive entry, skipping"
                    );
                    continue;
                }
                return Some(ArchiveHit {
                    mount_id: entry.id.clone(),
                    data,
                });
            }
        }
        None
    }

    pub fn list(&self) -> Vec<MountInfo> {
        self.lock()
            .iter()
            .map(|e| MountInfo {
                id: e.id.clone(),
                archive_path: e.archive_path.clone(),
            })
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<MountEntry>> {
        // A panic while holding the lock leaves plain data; recover it.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}
