//! Remote index of installable community themes
//!
//! The index is a JSON array fetched from a configured URL and cached in
//! memory for a TTL. A failed refresh falls back to the last good copy when
//! there is one; otherwise callers get a warning and an empty index.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::fetch::Fetcher;
use crate::theme::{normalize, slugify, Scheme, ThemeError};

/// One installable theme as described by the index
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndexEntry {
    pub slug: String,
    pub display_name: String,
    pub scheme: Scheme,
    /// Repository or archive reference the bundle is fetched from
    pub source: String,
    pub preview_url: Option<String>,
}

/// Wire format of an index entry
#[derive(Debug, Deserialize)]
struct RawEntry {
    #[serde(alias = "name")]
    display_name: String,
    #[serde(default, alias = "source_reference", alias = "github_url")]
    source: Option<String>,
    #[serde(default)]
    scheme: Option<String>,
    #[serde(default)]
    preview_url: Option<String>,
}

/// Parse index JSON. Entries without a source are not installable and are skipped.
pub fn parse_index(data: &[u8]) -> Result<Vec<IndexEntry>, String> {
    let raw: Vec<RawEntry> =
        serde_json::from_slice(data).map_err(|e| format!("malformed theme index: {}", e))?;

    let mut seen = HashSet::new();
    let mut entries = Vec::with_capacity(raw.len());
    for entry in raw {
        let display_name = entry.display_name.trim().to_string();
        let Some(source) = entry.source.filter(|s| !s.trim().is_empty()) else {
            debug!("Index entry '{}' has no source, skipping", display_name);
            continue;
        };
        let slug = slugify(&display_name);
        if slug.is_empty() {
            continue;
        }
        if !seen.insert(normalize(&display_name)) {
            warn!("Duplicate index entry '{}' ignored", display_name);
            continue;
        }
        entries.push(IndexEntry {
            slug,
            display_name,
            scheme: entry.scheme.as_deref().map(Scheme::parse).unwrap_or_default(),
            source: source.trim().to_string(),
            preview_url: entry.preview_url,
        });
    }
    Ok(entries)
}

/// Result of an index lookup
#[derive(Debug, Clone, Default)]
pub struct IndexLookup {
    pub entries: Arc<Vec<IndexEntry>>,
    /// Set when the index could not be refreshed
    pub warning: Option<String>,
}

#[derive(Debug)]
struct CachedIndex {
    entries: Arc<Vec<IndexEntry>>,
    fetched_at: Instant,
}

/// Lazily fetched, TTL-cached remote index
pub struct RemoteIndex {
    url: Option<String>,
    ttl: Duration,
    fetcher: Fetcher,
    cache: RwLock<Option<CachedIndex>>,
}

impl RemoteIndex {
    pub fn new(url: Option<String>, ttl: Duration, fetcher: Fetcher) -> Self {
        Self {
            url,
            ttl,
            fetcher,
            cache: RwLock::new(None),
        }
    }

    /// Configured index location
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    /// Cached entries, refreshing first if the cache is empty or expired
    pub async fn lookup(&self) -> IndexLookup {
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.as_ref() {
                if cached.fetched_at.elapsed() < self.ttl {
                    return IndexLookup {
                        entries: cached.entries.clone(),
                        warning: None,
                    };
                }
            }
        }

        let mut cache = self.cache.write().await;
        // Another request may have refreshed while we waited
        if let Some(cached) = cache.as_ref() {
            if cached.fetched_at.elapsed() < self.ttl {
                return IndexLookup {
                    entries: cached.entries.clone(),
                    warning: None,
                };
            }
        }

        match self.fetch().await {
            Ok(entries) => {
                let entries = Arc::new(entries);
                *cache = Some(CachedIndex {
                    entries: entries.clone(),
                    fetched_at: Instant::now(),
                });
                IndexLookup {
                    entries,
                    warning: None,
                }
            }
            Err(e) => {
                let warning = format!("theme index unavailable: {}", e);
                warn!("{}", warning);
                IndexLookup {
                    entries: cache.as_ref().map(|c| c.entries.clone()).unwrap_or_default(),
                    warning: Some(warning),
                }
            }
        }
    }

    /// Force a refresh, returning the number of entries
    pub async fn refresh(&self) -> Result<usize, ThemeError> {
        let mut cache = self.cache.write().await;
        let entries = self.fetch().await.map_err(|e| match e {
            IndexError::Fetch(err) => err,
            other => ThemeError::Network {
                url: self.url.clone().unwrap_or_default(),
                message: other.to_string(),
            },
        })?;
        let count = entries.len();
        *cache = Some(CachedIndex {
            entries: Arc::new(entries),
            fetched_at: Instant::now(),
        });
        Ok(count)
    }

    async fn fetch(&self) -> Result<Vec<IndexEntry>, IndexError> {
        let url = self.url.as_deref().ok_or(IndexError::NotConfigured)?;
        let fetched = self.fetcher.get(url).await.map_err(|e| IndexError::Fetch(e.into()))?;
        let entries = parse_index(&fetched.data).map_err(IndexError::Parse)?;
        info!("Loaded {} themes from index {}", entries.len(), url);
        Ok(entries)
    }
}

#[derive(Debug, thiserror::Error)]
enum IndexError {
    #[error("no index URL configured")]
    NotConfigured,
    #[error("{0}")]
    Fetch(ThemeError),
    #[error("{0}")]
    Parse(String),
}
