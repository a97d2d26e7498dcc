use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures_util::StreamExt;
use webarc_store::{GameDataRecord, GameDataStore};
use webarc_verify::HashVerifier;

use crate::cancel::{CancelToken, cancel_pair};
use crate::error::{FetchError, Result, SourceFailure};
use crate::http::HttpClient;
use crate::registry::{DownloadOrigin, DownloadRegistry, DownloadStatus};

/// Byte-level progress for one source attempt.
#[derive(Clone, Debug)]
pub struct DownloadProgress {
    pub source: String,
    pub bytes_downloaded: u64,
    pub total_bytes: Option<u64>,
}

pub type ProgressFn = Arc<dyn Fn(&DownloadProgress) + Send + Sync>;

/// Per-download knobs.
#[derive(Clone, Default)]
pub struct DownloadOptions {
    /// Timeout applied to each source attempt individually.
    pub source_timeout: Option<Duration>,
    pub on_progress: Option<ProgressFn>,
    pub cancel: Option<CancelToken>,
    /// Which pathway to register the download under.
    pub origin: DownloadOrigin,
}

impl fmt::Debug for DownloadOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DownloadOptions")
            .field("source_timeout", &self.source_timeout)
            .field("on_progress", &self.on_progress.as_ref().map(|_| "{ ... }"))
            .field("cancel", &self.cancel.as_ref().map(|_| "{ ... }"))
            .field("origin", &self.origin)
            .finish()
    }
}

impl DownloadOptions {
    #[must_use]
    pub fn source_timeout(mut self, timeout: Duration) -> Self {
        self.source_timeout = Some(timeout);
        self
    }

    #[must_use]
    pub fn on_progress(mut self, on_progress: ProgressFn) -> Self {
        self.on_progress = Some(on_progress);
        self
    }

    #[must_use]
    pub fn cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    #[must_use]
    pub fn origin(mut self, origin: DownloadOrigin) -> Self {
        self.origin = origin;
        self
    }
}

enum Attempt {
    Cancelled,
    Failed(String),
}

/// Downloads a game's content package from an ordered source list,
/// verifies it, and imports it into the permanent content directory.
///
/// Sources are tried strictly in order; per-source failures accumulate so
/// total failure reports every attempted source. Cancellation aborts the
/// whole operation rather than falling through to the next source.
pub struct DownloadOrchestrator<C: HttpClient> {
    client: C,
    registry: Arc<DownloadRegistry>,
    store: GameDataStore,
    content_dir: PathBuf,
    staging_dir: PathBuf,
}

impl<C: HttpClient> DownloadOrchestrator<C> {
    pub fn new(
        client: C,
        registry: Arc<DownloadRegistry>,
        store: GameDataStore,
        content_dir: impl Into<PathBuf>,
        staging_dir: impl Into<PathBuf>,
    ) -> Result<Self> {
        let content_dir = webarc_fs::normalize(&content_dir.into());
        let root = webarc_fs::normalize(store.install_root());
        if !content_dir.starts_with(&root) {
            return Err(FetchError::ContentDirOutsideRoot {
                content_dir,
                root,
            });
        }
        Ok(Self {
            client,
            registry,
            store,
            content_dir,
            staging_dir: staging_dir.into(),
        })
    }

    /// The underlying HTTP client, for callers that share it.
    pub fn client(&self) -> &C {
        &self.client
    }

    /// Download the content package for `data_id`, returning the final
    /// on-disk path.
    pub async fn download(
        &self,
        data_id: i64,
        sources: &[String],
        options: DownloadOptions,
    ) -> Result<PathBuf> {
        let record = self
            .store
            .game_data(data_id)
            .await?
            .ok_or(FetchError::UnknownRecord(data_id))?;

        if record.present_on_disk {
            return Err(FetchError::AlreadyPresent {
                asset_id: record.game_id,
            });
        }
        if sources.is_empty() {
            return Err(FetchError::NoSources);
        }

        self.registry
            .register(&record.game_id, Some(record.id), options.origin)
            .map_err(|e| FetchError::AlreadyActive {
                asset_id: e.asset_id,
            })?;

        let result = self.run(&record, sources, options).await;
        let status = match &result {
            Ok(_) => DownloadStatus::Completed,
            Err(_) => DownloadStatus::Failed,
        };
        self.registry.finish(&record.game_id, status);
        result
    }

    async fn run(
        &self,
        record: &GameDataRecord,
        sources: &[String],
        options: DownloadOptions,
    ) -> Result<PathBuf> {
        // A download without a caller-supplied signal is simply one that
        // can never be cancelled.
        let (_keepalive, fallback) = cancel_pair();
        let mut cancel = options.cancel.clone().unwrap_or(fallback);

        let mut failures: Vec<SourceFailure> = Vec::new();
        for source in sources {
            match self
                .attempt(source, record, &options, &mut cancel)
                .await
            {
                Ok(staged) => {
                    let dest = self.import(record, &staged).await?;
                    tracing::info!(
                        game = record.game_id,
                        data_id = record.id,
                        source,
                        path = %dest.display(),
                        "download complete"
                    );
                    return Ok(dest);
                }
                Err(Attempt::Cancelled) => {
                    tracing::info!(game = record.game_id, "download cancelled");
                    return Err(FetchError::Cancelled);
                }
                Err(Attempt::Failed(reason)) => {
                    tracing::warn!(game = record.game_id, source, reason, "source failed");
                    failures.push(SourceFailure {
                        source: source.clone(),
                        reason,
                    });
                }
            }
        }

        Err(FetchError::AllSourcesFailed {
            asset_id: record.game_id.clone(),
            failures,
        })
    }

    /// Stream one source to a staging file and verify it. Returns the
    /// staging path on success; the staging file is removed on failure.
    async fn attempt(
        &self,
        source: &str,
        record: &GameDataRecord,
        options: &DownloadOptions,
        cancel: &mut CancelToken,
    ) -> std::result::Result<PathBuf, Attempt> {
        if let Err(e) = tokio::fs::create_dir_all(&self.staging_dir).await {
            return Err(Attempt::Failed(format!("cannot create staging dir: {e}")));
        }
        let staged = self.staging_dir.join(format!(
            ".webarc.{}.{}.part",
            record.id,
            Utc::now().timestamp_nanos_opt().unwrap_or_default()
        ));

        let transfer = self.stream_to_file(source, &staged, options, cancel);
        let outcome = match options.source_timeout {
            Some(limit) => match tokio::time::timeout(limit, transfer).await {
                Ok(outcome) => outcome,
                Err(_) => Err(Attempt::Failed(format!(
                    "timed out after {}s",
                    limit.as_secs()
                ))),
            },
            None => transfer.await,
        };

        let bytes = match outcome {
            Ok(done) => done,
            Err(attempt) => {
                remove_staged(&staged).await;
                return Err(attempt);
            }
        };

        if record.size > 0 && bytes != record.size as u64 {
            remove_staged(&staged).await;
            return Err(Attempt::Failed(format!(
                "size mismatch: expected {} bytes, got {bytes}",
                record.size
            )));
        }
        if let Err(e) = HashVerifier::verify(&staged, &record.sha256, source).await {
            remove_staged(&staged).await;
            return Err(Attempt::Failed(e.to_string()));
        }

        Ok(staged)
    }

    /// The transfer loop: report progress and observe cancellation between
    /// chunks. Returns the byte count written.
    async fn stream_to_file(
        &self,
        source: &str,
        staged: &Path,
        options: &DownloadOptions,
        cancel: &mut CancelToken,
    ) -> std::result::Result<u64, Attempt> {
        use tokio::io::AsyncWriteExt;

        let body = self
            .client
            .stream(source)
            .await
            .map_err(|e| Attempt::Failed(e.to_string()))?;
        let mut stream = body.stream;

        let mut file = tokio::fs::File::create(staged)
            .await
            .map_err(|e| Attempt::Failed(format!("cannot create staging file: {e}")))?;
        let mut bytes_downloaded = 0u64;

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Attempt::Cancelled),
                next = stream.next() => next,
            };
            let Some(chunk) = next else { break };
            let chunk = chunk.map_err(|e| Attempt::Failed(e.to_string()))?;
            file.write_all(&chunk)
                .await
                .map_err(|e| Attempt::Failed(format!("write failed: {e}")))?;
            bytes_downloaded += chunk.len() as u64;

            if let Some(on_progress) = &options.on_progress {
                on_progress(&DownloadProgress {
                    source: source.to_string(),
                    bytes_downloaded,
                    total_bytes: body.total_bytes,
                });
            }
        }

        file.flush()
            .await
            .map_err(|e| Attempt::Failed(format!("flush failed: {e}")))?;
        Ok(bytes_downloaded)
    }

    /// Move the verified staging file into the content directory and
    /// record the import in one transaction.
    async fn import(&self, record: &GameDataRecord, staged: &Path) -> Result<PathBuf> {
        let file_name = record
            .path
            .as_deref()
            .and_then(|p| p.rsplit('/').next())
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| {
                format!("{}-{}.zip", record.game_id, Utc::now().timestamp_millis())
            });

        let dest = self.content_dir.join(&file_name);
        let result = self.finish_import(record, staged, &dest).await;
        if result.is_err() {
            remove_staged(staged).await;
        }
        result.map(|_| dest)
    }

    async fn finish_import(
        &self,
        record: &GameDataRecord,
        staged: &Path,
        dest: &Path,
    ) -> Result<()> {
        let root = webarc_fs::normalize(self.store.install_root());
        let relative = dest
            .strip_prefix(&root)
            .map_err(|_| FetchError::ContentDirOutsideRoot {
                content_dir: self.content_dir.clone(),
                root: root.clone(),
            })?;
        let relative = webarc_fs::to_portable(relative);

        webarc_fs::place_file(staged, dest).await?;
        self.store.mark_downloaded(record.id, &relative).await?;
        Ok(())
    }
}

async fn remove_staged(staged: &Path) {
    // Best-effort; never masks the primary error.
    if let Err(e) = tokio::fs::remove_file(staged).await
        && e.kind() != std::io::ErrorKind::NotFound
    {
        tracing::warn!(path = %staged.display(), error = %e, "failed to remove staging file");
    }
}
