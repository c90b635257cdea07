//! HTTP sink for normalized change batches.

use apptsync_core::{ChangeEvent, EventSink, ForwardError};
use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Sink configuration.
#[derive(Debug, Clone)]
pub struct SinkConfig {
    /// Endpoint that receives `PUT` requests with a JSON array body
    pub url: String,
    /// Request timeout
    pub timeout: Duration,
}

impl SinkConfig {
    /// Config for `url` with the default 30 second timeout.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Errors building an [`HttpSink`].
#[derive(Debug, Clone, thiserror::Error)]
pub enum SinkInitError {
    /// Sink URL is not an absolute http(s) URL
    #[error("invalid sink URL {url:?}: {reason}")]
    InvalidUrl {
        /// Offending URL
        url: String,
        /// Why it was rejected
        reason: String,
    },
    /// The HTTP client could not be built
    #[error("client init error: {0}")]
    Init(String),
}

/// Forwards each batch as one JSON array via `PUT`.
#[derive(Clone)]
pub struct HttpSink {
    client: Client,
    url: Arc<Url>,
}

impl HttpSink {
    /// Create a sink.
    ///
    /// # Errors
    ///
    /// Returns error if the URL is not http(s) or the HTTP client cannot be
    /// created.
    pub fn new(config: SinkConfig) -> Result<Self, SinkInitError> {
        let url = Url::parse(&config.url).map_err(|e| SinkInitError::InvalidUrl {
            url: config.url.clone(),
            reason: e.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(SinkInitError::InvalidUrl {
                url: config.url.clone(),
                reason: format!("unsupported scheme {}", url.scheme()),
            });
        }

        let mut builder = Client::builder().timeout(config.timeout);
        if url.scheme() == "https" {
            builder = builder.use_rustls_tls();
        }
        let client = builder
            .build()
            .map_err(|e| SinkInitError::Init(e.to_string()))?;

        Ok(Self {
            client,
            url: Arc::new(url),
        })
    }

    /// Endpoint batches are sent to.
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl EventSink for HttpSink {
    async fn forward(&self, batch: &[ChangeEvent]) -> Result<(), ForwardError> {
        if batch.is_empty() {
            return Ok(());
        }

        tracing::debug!(url = %self.url, events = batch.len(), "PUT change batch");

        let response = self
            .client
            .put(self.url.as_str())
            .json(batch)
            .send()
            .await
            .map_err(|e| ForwardError::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ForwardError::Rejected {
                status: response.status().as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        Ok(())
    }
}
