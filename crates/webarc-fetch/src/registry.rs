use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};

/// Which pathway started a download. Both the orchestrator and the
/// on-demand archive server register here so neither races the other on
/// the same asset.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DownloadOrigin {
    #[default]
    Orchestrator,
    OnDemandServer,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DownloadStatus {
    Downloading,
    Completed,
    Failed,
}

#[derive(Clone, Debug)]
pub struct DownloadEntry {
    pub asset_id: String,
    pub secondary_id: Option<i64>,
    pub origin: DownloadOrigin,
    pub started_at: DateTime<Utc>,
    pub status: DownloadStatus,
}

/// Process-wide view of in-flight downloads.
///
/// Registration is the duplicate-exclusion mechanism: at most one entry
/// per asset key may be `Downloading`. Terminal entries linger for a
/// grace period so pollers can observe the outcome, then a scheduled
/// removal deletes them — but only after verifying the entry is still the
/// one it was scheduled for, so a newer in-flight entry is never removed
/// by a stale timer.
pub struct DownloadRegistry {
    inner: Mutex<HashMap<String, DownloadEntry>>,
    grace: Duration,
}

#[derive(Debug, thiserror::Error)]
#[error("a download for {asset_id} is already in progress")]
pub struct AlreadyDownloading {
    pub asset_id: String,
}

impl DownloadRegistry {
    pub fn new(grace: Duration) -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
            grace,
        }
    }

    /// Claim the asset key. Fails if a download is already in flight;
    /// supersedes a lingering terminal entry.
    pub fn register(
        &self,
        asset_id: &str,
        secondary_id: Option<i64>,
        origin: DownloadOrigin,
    ) -> std::result::Result<DownloadEntry, AlreadyDownloading> {
        let mut entries = self.lock();
        if let Some(existing) = entries.get(asset_id)
            && existing.status == DownloadStatus::Downloading
        {
            return Err(AlreadyDownloading {
                asset_id: asset_id.to_string(),
            });
        }
        let entry = DownloadEntry {
            asset_id: asset_id.to_string(),
            secondary_id,
            origin,
            started_at: Utc::now(),
            status: DownloadStatus::Downloading,
        };
        entries.insert(asset_id.to_string(), entry.clone());
        Ok(entry)
    }

    /// Move the entry to a terminal state and schedule its removal.
    pub fn finish(self: &Arc<Self>, asset_id: &str, status: DownloadStatus) {
        debug_assert!(status != DownloadStatus::Downloading);
        let started_at = {
            let mut entries = self.lock();
            match entries.get_mut(asset_id) {
                Some(entry) => {
                    entry.status = status;
                    entry.started_at
                }
                None => return,
            }
        };

        let registry = Arc::clone(self);
        let asset_id = asset_id.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(registry.grace).await;
            let mut entries = registry.lock();
            // Identity check: a newer entry for the same key stays.
            if let Some(entry) = entries.get(&asset_id)
                && entry.started_at == started_at
                && entry.status != DownloadStatus::Downloading
            {
                entries.remove(&asset_id);
            }
        });
    }

    pub fn get(&self, asset_id: &str) -> Option<DownloadEntry> {
        self.lock().get(asset_id).cloned()
    }

    pub fn find_by_secondary(&self, secondary_id: i64) -> Option<DownloadEntry> {
        self.lock()
            .values()
            .find(|e| e.secondary_id == Some(secondary_id))
            .cloned()
    }

    pub fn list(&self) -> Vec<DownloadEntry> {
        self.lock().values().cloned().collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, DownloadEntry>> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> Arc<DownloadRegistry> {
        Arc::new(DownloadRegistry::new(Duration::from_secs(5)))
    }

    #[test]
    fn second_registration_is_rejected() {
        let registry = DownloadRegistry::new(Duration::from_secs(5));
        registry
            .register("asset", Some(1), DownloadOrigin::Orchestrator)
            .unwrap();
        let err = registry
            .register("asset", Some(1), DownloadOrigin::OnDemandServer)
            .unwrap_err();
        assert_eq!(err.asset_id, "asset");
        assert_eq!(registry.list().len(), 1);
    }

    #[test]
    fn lookup_by_secondary_id() {
        let registry = DownloadRegistry::new(Duration::from_secs(5));
        registry
            .register("asset", Some(42), DownloadOrigin::OnDemandServer)
            .unwrap();
        let entry = registry.find_by_secondary(42).unwrap();
        assert_eq!(entry.asset_id, "asset");
        assert!(registry.find_by_secondary(7).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn terminal_entry_removed_after_grace() {
        let registry = registry();
        registry
            .register("asset", None, DownloadOrigin::Orchestrator)
            .unwrap();
        registry.finish("asset", DownloadStatus::Completed);

        assert_eq!(
            registry.get("asset").unwrap().status,
            DownloadStatus::Completed
        );
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert!(registry.get("asset").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn stale_removal_spares_superseding_entry() {
        let registry = registry();
        registry
            .register("asset", None, DownloadOrigin::Orchestrator)
            .unwrap();
        registry.finish("asset", DownloadStatus::Failed);

        // New attempt begins inside the grace window.
        tokio::time::sleep(Duration::from_secs(2)).await;
        registry
            .register("asset", None, DownloadOrigin::Orchestrator)
            .unwrap();

        // The original timer fires; the new entry must survive it.
        tokio::time::sleep(Duration::from_secs(10)).await;
        let entry = registry.get("asset").unwrap();
        assert_eq!(entry.status, DownloadStatus::Downloading);
    }

    #[test]
    fn terminal_entry_can_be_superseded() {
        let registry = DownloadRegistry::new(Duration::from_secs(5));
        let first = registry
            .register("asset", None, DownloadOrigin::Orchestrator)
            .unwrap();
        {
            let mut entries = registry.lock();
            entries.get_mut("asset").unwrap().status = DownloadStatus::Failed;
        }
        let second = registry
            .register("asset", None, DownloadOrigin::Orchestrator)
            .unwrap();
        assert!(second.started_at >= first.started_at);
        assert_eq!(
            registry.get("asset").unwrap().status,
            DownloadStatus::Downloading
        );
    }
}
