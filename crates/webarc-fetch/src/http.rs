use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use futures_util::Stream;

/// A boxed stream of response body chunks.
pub type BoxStream<'a, T> = Pin<Box<dyn Stream<Item = T> + Send + 'a>>;

/// A successfully opened response body.
pub struct BodyStream<E> {
    /// Content-Length when the server sent one.
    pub total_bytes: Option<u64>,
    pub stream: BoxStream<'static, std::result::Result<Bytes, E>>,
}

/// Minimal HTTP surface the download path needs. Implementations handle
/// redirects and connection management themselves; tests inject mocks.
pub trait HttpClient: Send + Sync {
    type Error: std::error::Error + Send + 'static;

    /// Open a streaming GET. Non-2xx statuses are errors.
    fn stream(
        &self,
        url: &str,
    ) -> impl Future<Output = std::result::Result<BodyStream<Self::Error>, Self::Error>> + Send;
}

/// Production client over reqwest.
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    pub fn new() -> std::result::Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent("webarc")
            .build()?;
        Ok(Self { client })
    }
}

impl HttpClient for ReqwestClient {
    type Error = reqwest::Error;

    async fn stream(&self, url: &str) -> std::result::Result<BodyStream<Self::Error>, Self::Error> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        let total_bytes = response.content_length();
        Ok(BodyStream {
            total_bytes,
            stream: Box::pin(response.bytes_stream()),
        })
    }
}
