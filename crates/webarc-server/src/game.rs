use std::path::PathBuf;
use std::sync::Arc;

use webarc_fetch::{
    DownloadOptions, DownloadOrchestrator, DownloadOrigin, DownloadRegistry, DownloadStatus,
    HttpClient,
};
use webarc_mount::MountTable;
use webarc_store::{GameDataRecord, GameDataStore};

use crate::error::{Result, ServeError};

/// On-demand materialization of a game's content package.
///
/// Consults the catalog for the game's active data record, triggers the
/// download orchestrator when the package is not yet on disk (after
/// checking the shared registry, so the two download pathways never race
/// on the same asset), then mounts the archive so its entries resolve
/// through the mount table.
pub struct GameContentService<C: HttpClient> {
    store: GameDataStore,
    registry: Arc<DownloadRegistry>,
    orchestrator: DownloadOrchestrator<C>,
    mounts: Arc<MountTable>,
    /// Base URLs the package file name is appended to, in fallback order.
    package_sources: Vec<String>,
}

impl<C: HttpClient + 'static> GameContentService<C> {
    pub fn new(
        store: GameDataStore,
        registry: Arc<DownloadRegistry>,
        orchestrator: DownloadOrchestrator<C>,
        mounts: Arc<MountTable>,
        package_sources: Vec<String>,
    ) -> Self {
        Self {
            store,
            registry,
            orchestrator,
            mounts,
            package_sources,
        }
    }

    /// Make `game_id`'s active package servable, downloading it first if
    /// needed. Returns the archive's absolute path.
    pub async fn ensure_mounted(&self, game_id: &str) -> Result<PathBuf> {
        let record = self
            .store
            .active_data_for_game(game_id)
            .await?
            .ok_or_else(|| ServeError::UnknownGame(game_id.to_string()))?;

        let archive_path = if record.present_on_disk {
            let relative = record
                .path
                .as_deref()
                .ok_or_else(|| ServeError::MissingRecordedPath {
                    game_id: game_id.to_string(),
                })?;
            self.store.resolve_path(relative)?
        } else {
            if let Some(entry) = self.registry.get(game_id)
                && entry.status == DownloadStatus::Downloading
            {
                return Err(ServeError::DownloadInFlight(game_id.to_string()));
            }
            let sources = self.package_urls(&record);
            self.orchestrator
                .download(
                    record.id,
                    &sources,
                    DownloadOptions::default().origin(DownloadOrigin::OnDemandServer),
                )
                .await?
        };

        self.mount(game_id, archive_path.clone()).await?;
        Ok(archive_path)
    }

    /// Candidate URLs for the package, one per configured base.
    fn package_urls(&self, record: &GameDataRecord) -> Vec<String> {
        let file_name = record
            .path
            .as_deref()
            .and_then(|p| p.rsplit('/').next())
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}.zip", record.game_id));
        self.package_sources
            .iter()
            .map(|base| format!("{}/{file_name}", base.trim_end_matches('/')))
            .collect()
    }

    async fn mount(&self, game_id: &str, archive_path: PathBuf) -> Result<()> {
        let already = self
            .mounts
            .list()
            .into_iter()
            .any(|m| m.id == game_id && m.archive_path == archive_path);
        if already {
            return Ok(());
        }
        let mounts = Arc::clone(&self.mounts);
        let id = game_id.to_string();
        tokio::task::spawn_blocking(move || mounts.mount(&id, &archive_path))
            .await
            .map_err(|e| ServeError::Io(std::io::Error::other(e)))??;
        Ok(())
    }
}
