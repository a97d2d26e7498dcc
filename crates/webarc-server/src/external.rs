use std::time::Duration;

use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use webarc_fetch::HttpClient;

/// One remote mirror serving the legacy tree.
#[derive(Clone, Debug)]
pub struct ExternalSource {
    /// Base URL the lookup key is appended to.
    pub base_url: String,
    /// Trusted community proxy whose hits are attributed to the request
    /// path rather than the mirror.
    pub mad4fp: bool,
}

impl ExternalSource {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            mad4fp: false,
        }
    }
}

/// A successful external fetch.
pub struct ExternalHit {
    pub data: Bytes,
    pub base_url: String,
    pub mad4fp: bool,
}

/// Ordered fallback across remote mirrors.
///
/// Sources are tried strictly sequentially so the first configured mirror
/// wins deterministically. A zero-byte body counts as a miss: some
/// archival mirrors answer empty instead of 404 for paths they lack.
pub struct ExternalFetcher<C: HttpClient> {
    client: C,
    sources: Vec<ExternalSource>,
    timeout: Duration,
}

impl<C: HttpClient> ExternalFetcher<C> {
    pub fn new(client: C, sources: Vec<ExternalSource>, timeout: Duration) -> Self {
        Self {
            client,
            sources,
            timeout,
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Fetch `key` from the first source that produces a non-empty body.
    pub async fn fetch(&self, key: &str) -> Option<ExternalHit> {
        for source in &self.sources {
            let url = format!("{}/{}", source.base_url.trim_end_matches('/'), key);
            match tokio::time::timeout(self.timeout, self.fetch_one(&url)).await {
                Ok(Ok(data)) if data.is_empty() => {
                    tracing::debug!(url, "zero-byte body, treating as miss");
                }
                Ok(Ok(data)) => {
                    tracing::debug!(url, bytes = data.len(), "external hit");
                    return Some(ExternalHit {
                        data,
                        base_url: source.base_url.clone(),
                        mad4fp: source.mad4fp,
                    });
                }
                Ok(Err(reason)) => {
                    tracing::debug!(url, reason, "external source failed");
                }
                Err(_) => {
                    tracing::warn!(url, timeout = ?self.timeout, "external source timed out");
                }
            }
        }
        None
    }

    async fn fetch_one(&self, url: &str) -> std::result::Result<Bytes, String> {
        let body = self.client.stream(url).await.map_err(|e| e.to_string())?;
        let mut stream = body.stream;
        let mut data = BytesMut::new();
        while let Some(chunk) = stream.next().await {
            data.extend_from_slice(&chunk.map_err(|e| e.to_string())?);
        }
        Ok(data.freeze())
    }
}
