use async_trait::async_trait;
use futures::StreamExt;
use std::time::Duration;
use thiserror::Error;

use crate::feed::parser::parse_feed;
use crate::storage::ParsedFeed;
use crate::update::FeedFetcher;

const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// Default per-request timeout
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Default user agent sent with every feed request
pub const DEFAULT_USER_AGENT: &str = concat!("lincast/", env!("CARGO_PKG_VERSION"));

/// Errors that can occur while retrieving and parsing a feed.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network-level error (DNS, connection, TLS, etc.)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// HTTP response with non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Request exceeded the configured timeout
    #[error("Request timed out")]
    Timeout,
    /// Feed XML could not be parsed as RSS or Atom
    #[error("Parse error: {0}")]
    Parse(String),
    /// Response body exceeded the 10MB size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// Response was incomplete (received fewer bytes than Content-Length)
    #[error("Incomplete response: expected {expected} bytes, received {received}")]
    IncompleteResponse { expected: u64, received: usize },
}

/// Feed fetcher backed by a shared `reqwest` client.
///
/// A failed request is reported once; retrying is left to whoever schedules
/// the next refresh.
#[derive(Debug, Clone)]
pub struct HttpFeedFetcher {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpFeedFetcher {
    pub fn new(client: reqwest::Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// Build a client with the given user agent
    pub fn with_user_agent(user_agent: &str, timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder().user_agent(user_agent).build()?;
        Ok(Self::new(client, timeout))
    }

    async fn fetch_bytes(&self, feed_url: &str) -> Result<Vec<u8>, FetchError> {
        let response = tokio::time::timeout(self.timeout, self.client.get(feed_url).send())
            .await
            .map_err(|_| FetchError::Timeout)?
            .map_err(FetchError::Network)?;

        if !response.status().is_success() {
            return Err(FetchError::HttpStatus(response.status().as_u16()));
        }

        tokio::time::timeout(self.timeout, read_limited_bytes(response, MAX_FEED_SIZE))
            .await
            .map_err(|_| FetchError::Timeout)?
    }
}

#[async_trait]
impl FeedFetcher for HttpFeedFetcher {
    async fn fetch(&self, feed_url: &str) -> Result<ParsedFeed, FetchError> {
        let bytes = self.fetch_bytes(feed_url).await?;
        let feed = parse_feed(&bytes).map_err(|e| FetchError::Parse(e.to_string()))?;

        tracing::debug!(
            feed = %feed_url,
            episodes = feed.episodes.len(),
            bytes = bytes.len(),
            "Feed fetched"
        );
        Ok(feed)
    }
}

async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, FetchError> {
    let expected_length = response.content_length();

    // Fast path: check Content-Length header
    if let Some(len) = expected_length {
        if len as usize > limit {
            return Err(FetchError::ResponseTooLarge);
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(FetchError::Network)?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(FetchError::ResponseTooLarge);
        }
        bytes.extend_from_slice(&chunk);
    }

    if let Some(expected) = expected_length {
        if (bytes.len() as u64) < expected {
            return Err(FetchError::IncompleteResponse {
                expected,
                received: bytes.len(),
            });
        }
    }

    Ok(bytes)
}
