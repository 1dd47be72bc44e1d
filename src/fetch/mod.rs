//! Network fetches for theme bundles, previews and the remote index
//!
//! Every fetch carries a client-level timeout and is retried exactly once
//! when the failure looks transient (connect error, timeout, HTTP 5xx/429).
//! `file://` URLs are read from disk so that mirrors and tests can point at
//! local files.

use std::time::Duration;

use reqwest::Client;
use thiserror::Error;
use tracing::{debug, warn};

use crate::theme::ThemeError;

/// Total attempts per fetch, including the first one
const MAX_ATTEMPTS: u32 = 2;

/// Fetch failures
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("{url} exceeds the {limit} byte limit")]
    TooLarge { url: String, limit: u64 },

    #[error("failed to read {url}: {source}")]
    Local {
        url: String,
        #[source]
        source: std::io::Error,
    },
}

impl FetchError {
    /// True if a second attempt might succeed
    pub fn is_transient(&self) -> bool {
        match self {
            FetchError::Transport { source, .. } => source.is_timeout() || source.is_connect(),
            FetchError::Status { status, .. } => *status == 429 || (500..=599).contains(status),
            FetchError::TooLarge { .. } | FetchError::Local { .. } => false,
        }
    }

    pub fn url(&self) -> &str {
        match self {
            FetchError::Transport { url, .. }
            | FetchError::Status { url, .. }
            | FetchError::TooLarge { url, .. }
            | FetchError::Local { url, .. } => url,
        }
    }
}

impl From<FetchError> for ThemeError {
    fn from(err: FetchError) -> Self {
        ThemeError::Network {
            url: err.url().to_string(),
            message: err.to_string(),
        }
    }
}

/// Downloaded body
#[derive(Debug, Clone)]
pub struct Fetched {
    pub data: Vec<u8>,
    pub content_type: Option<String>,
}

/// Fetch tuning
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Per-request timeout
    pub timeout: Duration,
    /// Pause before the single retry
    pub retry_delay: Duration,
    /// Largest body accepted
    pub max_bytes: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            retry_delay: Duration::from_millis(500),
            max_bytes: 64 * 1024 * 1024,
        }
    }
}

/// Shared HTTP client with timeout and retry policy
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
    config: FetchConfig,
}

impl Fetcher {
    /// Create a fetcher with the given tuning
    pub fn new(config: FetchConfig) -> Result<Self, ThemeError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("themed/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ThemeError::Internal(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    /// Largest body this fetcher accepts
    pub fn max_bytes(&self) -> u64 {
        self.config.max_bytes
    }

    /// Fetch a URL, retrying once on transient failure
    pub async fn get(&self, url: &str) -> Result<Fetched, FetchError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.get_once(url).await {
                Ok(fetched) => return Ok(fetched),
                Err(e) if e.is_transient() && attempt < MAX_ATTEMPTS => {
                    warn!("Fetch of {} failed ({}), retrying", url, e);
                    tokio::time::sleep(self.config.retry_delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn get_once(&self, url: &str) -> Result<Fetched, FetchError> {
        if let Some(path) = url.strip_prefix("file://") {
            let data = tokio::fs::read(path).await.map_err(|source| FetchError::Local {
                url: url.to_string(),
                source,
            })?;
            self.check_size(url, data.len() as u64)?;
            return Ok(Fetched {
                data,
                content_type: None,
            });
        }

        debug!("GET {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|source| FetchError::Transport {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        if let Some(len) = response.content_length() {
            self.check_size(url, len)?;
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let data = response
            .bytes()
            .await
            .map_err(|source| FetchError::Transport {
                url: url.to_string(),
                source,
            })?;
        self.check_size(url, data.len() as u64)?;

        debug!("Fetched {} bytes from {}", data.len(), url);
        Ok(Fetched {
            data: data.to_vec(),
            content_type,
        })
    }

    fn check_size(&self, url: &str, len: u64) -> Result<(), FetchError> {
        if len > self.config.max_bytes {
            return Err(FetchError::TooLarge {
                url: url.to_string(),
                limit: self.config.max_bytes,
            });
        }
        Ok(())
    }
}
