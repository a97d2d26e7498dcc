use std::fmt;
use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use webarc_cgi::{CgiExecutor, CgiRequest, CgiResponse};
use webarc_fetch::HttpClient;
use webarc_mount::MountTable;

use crate::cascade::Cascade;
use crate::error::{Result, ServeError};
use crate::external::ExternalFetcher;
use crate::key::RequestKey;
use crate::mime;

/// Which tier produced the bytes. Rendered into the `X-Source` header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SourceTag {
    GameZip(String),
    LocalHtdocs,
    External(String),
    Mad4fp(String),
}

impl fmt::Display for SourceTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GameZip(mount_id) => write!(f, "gamezipserver:{mount_id}"),
            Self::LocalHtdocs => f.write_str("local-htdocs"),
            Self::External(base_url) => f.write_str(base_url),
            Self::Mad4fp(path) => write!(f, "mad4fp:{path}"),
        }
    }
}

/// A static lookup result, tagged with its origin.
pub struct Resolved {
    pub data: Bytes,
    pub content_type: &'static str,
    pub source: SourceTag,
}

/// What one content request produced.
pub enum Served {
    Static(Resolved),
    Script(CgiResponse),
}

/// Resolution pipeline shared by both request surfaces: local cascade,
/// then mounted archives, then external mirrors. Script extensions route
/// to the CGI executor instead of a static read.
pub struct ContentService<C: HttpClient> {
    cascade: Cascade,
    mounts: Arc<MountTable>,
    external: ExternalFetcher<C>,
    cgi: CgiExecutor,
}

impl<C: HttpClient + 'static> ContentService<C> {
    pub fn new(
        cascade: Cascade,
        mounts: Arc<MountTable>,
        external: ExternalFetcher<C>,
        cgi: CgiExecutor,
    ) -> Self {
        Self {
            cascade,
            mounts,
            external,
            cgi,
        }
    }

    pub fn mounts(&self) -> &Arc<MountTable> {
        &self.mounts
    }

    pub async fn serve(&self, key: &RequestKey, request: CgiRequest) -> Result<Served> {
        let relative = key.relative();
        let lookup = if key.query.is_empty() {
            relative.clone()
        } else {
            format!("{relative}?{}", key.query)
        };

        if let Some(path) = self.cascade.resolve(&lookup).await {
            if self.cascade.is_script_path(&path) {
                let response = self.cgi.execute(&path, &request).await?;
                return Ok(Served::Script(response));
            }
            let data = Bytes::from(tokio::fs::read(&path).await?);
            return Ok(Served::Static(Resolved {
                content_type: mime::content_type_for_path(&path),
                data,
                source: SourceTag::LocalHtdocs,
            }));
        }

        if let Some(hit) = self.find_in_mounts(&relative).await {
            return Ok(Served::Static(Resolved {
                data: Bytes::from(hit.data),
                content_type: mime::content_type_for(&relative),
                source: SourceTag::GameZip(hit.mount_id),
            }));
        }

        if let Some(hit) = self.external.fetch(&relative).await {
            self.cache_locally(&relative, hit.data.clone());
            let source = if hit.mad4fp {
                SourceTag::Mad4fp(relative.clone())
            } else {
                SourceTag::External(hit.base_url)
            };
            return Ok(Served::Static(Resolved {
                data: hit.data,
                content_type: mime::content_type_for(&relative),
                source,
            }));
        }

        Err(ServeError::NotFound { key: relative })
    }

    /// ZIP reads are synchronous; keep them off the async workers.
    async fn find_in_mounts(&self, relative: &str) -> Option<webarc_mount::ArchiveHit> {
        let mounts = Arc::clone(&self.mounts);
        let relative = relative.to_string();
        match tokio::task::spawn_blocking(move || mounts.find(&relative)).await {
            Ok(hit) => hit,
            Err(e) => {
                tracing::error!(error = %e, "mount lookup task failed");
                None
            }
        }
    }

    /// Write an external hit into the local tree so the next request is a
    /// cascade hit. Best-effort; the response in flight never waits on it.
    fn cache_locally(&self, relative: &str, data: Bytes) {
        let target = match webarc_fs::safe_join(&self.cascade.config().htdocs_root, relative) {
            Ok(path) => path,
            Err(e) => {
                tracing::warn!(relative, error = %e, "not caching unsafe path");
                return;
            }
        };
        tokio::spawn(async move {
            if let Err(e) = write_cached(&target, &data).await {
                tracing::warn!(path = %target.display(), error = %e, "failed to cache external hit");
            }
        });
    }
}

async fn write_cached(target: &Path, data: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(target, data).await
}
