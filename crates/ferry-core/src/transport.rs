//! HTTP transport seam
//!
//! The engine only needs a status code, a declared length and a byte stream
//! from the network. Anything implementing [`HttpTransport`] can stand in
//! for the default reqwest client.

use crate::error::DownloadError;
use async_trait::async_trait;
use bytes::Bytes;
use ferry_types::TransportSettings;
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use reqwest::{Client, ClientBuilder};
use std::fmt;
use std::time::Duration;
use tracing::debug;

/// Response body as a stream of chunks
pub type BodyStream = BoxStream<'static, std::io::Result<Bytes>>;

/// Response to a GET request
pub struct HttpResponse {
    pub status: u16,
    /// Declared `Content-Length`, if the server sent one
    pub content_length: Option<u64>,
    pub body: BodyStream,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

impl fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpResponse")
            .field("status", &self.status)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// Capability to fetch a URL
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn get(&self, url: &str) -> Result<HttpResponse, DownloadError>;
}

/// Default transport backed by `reqwest`
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new(settings: &TransportSettings) -> Result<Self, DownloadError> {
        Ok(Self::from_client(Self::client_builder(settings)?.build()?))
    }

    /// Client builder configured from `settings`, for callers that need to
    /// adjust it further (proxies, certificates) before wrapping it.
    ///
    /// Only connecting and individual reads are bounded. There is no total
    /// deadline, so a large body may take as long as it needs while bytes
    /// keep arriving.
    pub fn client_builder(settings: &TransportSettings) -> Result<ClientBuilder, DownloadError> {
        if settings.connect_timeout_secs == 0 {
            return Err(DownloadError::InvalidConfig(
                "connect timeout must be positive".to_string(),
            ));
        }
        if settings.read_timeout_secs == 0 {
            return Err(DownloadError::InvalidConfig(
                "read timeout must be positive".to_string(),
            ));
        }

        Ok(Client::builder()
            .user_agent(settings.user_agent.as_str())
            .connect_timeout(Duration::from_secs(settings.connect_timeout_secs))
            .read_timeout(Duration::from_secs(settings.read_timeout_secs)))
    }

    /// Wrap an existing client
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

fn body_error(error: reqwest::Error) -> std::io::Error {
    if error.is_timeout() {
        std::io::Error::new(std::io::ErrorKind::TimedOut, error)
    } else {
        std::io::Error::other(error)
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(&self, url: &str) -> Result<HttpResponse, DownloadError> {
        let parsed = url::Url::parse(url).map_err(|_| DownloadError::InvalidUrl(url.to_string()))?;

        let response = self.client.get(parsed).send().await?;
        let status = response.status().as_u16();
        let content_length = response.content_length();
        debug!("GET {} -> {} (content length {:?})", url, status, content_length);

        let body = response
            .bytes_stream()
            .map_err(body_error)
            .boxed();

        Ok(HttpResponse {
            status,
            content_length,
            body,
        })
    }
}
