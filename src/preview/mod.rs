//! Theme preview images
//!
//! Installed themes preview from their own directory. Remote-only themes are
//! downloaded once into the cache directory and remembered for the rest of
//! the process.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info};
use uuid::Uuid;

use crate::fetch::Fetcher;
use crate::store::IMAGE_EXTENSIONS;
use crate::theme::{PreviewRef, Theme, ThemeError};

/// A preview ready to show
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreviewImage {
    pub path: PathBuf,
    pub mime_type: String,
}

/// Downloads and caches remote previews
pub struct PreviewCache {
    dir: PathBuf,
    fetcher: Fetcher,
    cached: Mutex<HashMap<String, PathBuf>>,
}

impl PreviewCache {
    /// `cache_dir` is the daemon cache root; previews live under `previews/`
    pub fn new(cache_dir: &Path, fetcher: Fetcher) -> Self {
        Self {
            dir: cache_dir.join("previews"),
            fetcher,
            cached: Mutex::new(HashMap::new()),
        }
    }

    /// Locate (downloading if needed) the preview image for `theme`
    pub async fn preview(&self, theme: &Theme) -> Result<PreviewImage, ThemeError> {
        let path = match &theme.preview {
            Some(PreviewRef::Local(path)) => path.clone(),
            Some(PreviewRef::Remote(url)) => self.fetch_remote(&theme.slug, url).await?,
            None => {
                return Err(ThemeError::NotFound(format!(
                    "preview for {}",
                    theme.display_name
                )))
            }
        };

        Ok(PreviewImage {
            mime_type: mime_type(&path).to_string(),
            path,
        })
    }

    async fn fetch_remote(&self, slug: &str, url: &str) -> Result<PathBuf, ThemeError> {
        let key = format!("{}\n{}", slug, url);
        let hit = self.cached.lock().get(&key).cloned();
        if let Some(path) = hit {
            return Ok(path);
        }

        let hash = hex::encode(Sha256::digest(url.as_bytes()));
        let stem = format!("{}-{}", slug, &hash[..12]);

        // Left behind by an earlier run
        for ext in IMAGE_EXTENSIONS {
            let candidate = self.dir.join(format!("{}.{}", stem, ext));
            if tokio::fs::metadata(&candidate).await.is_ok() {
                debug!("Reusing cached preview {}", candidate.display());
                self.cached.lock().insert(key, candidate.clone());
                return Ok(candidate);
            }
        }

        let fetched = self.fetcher.get(url).await?;
        let ext = extension_for(url, fetched.content_type.as_deref());
        let path = self.dir.join(format!("{}.{}", stem, ext));
        atomic_write(&path, &fetched.data).await?;

        info!("Cached preview for '{}' at {}", slug, path.display());
        self.cached.lock().insert(key, path.clone());
        Ok(path)
    }
}

/// Write to a temp name in the same directory, then rename into place
async fn atomic_write(path: &Path, data: &[u8]) -> Result<(), ThemeError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| ThemeError::io(format!("create {}", parent.display()), e))?;
    }

    let tmp = path.with_extension(format!("{}.tmp", Uuid::new_v4()));
    tokio::fs::write(&tmp, data)
        .await
        .map_err(|e| ThemeError::io(format!("write {}", tmp.display()), e))?;

    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(ThemeError::io(format!("move preview into {}", path.display()), e));
    }
    Ok(())
}

/// Pick a file extension from the URL, falling back to the content type
fn extension_for(url: &str, content_type: Option<&str>) -> &'static str {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    if let Some((_, ext)) = path.rsplit_once('.') {
        let ext = ext.to_lowercase();
        if let Some(known) = IMAGE_EXTENSIONS.iter().find(|e| **e == ext) {
            return *known;
        }
    }

    match content_type.map(|c| c.split(';').next().unwrap_or(c).trim()) {
        Some("image/jpeg") => "jpg",
        Some("image/webp") => "webp",
        Some("image/gif") => "gif",
        Some("image/bmp") => "bmp",
        _ => "png",
    }
}

/// MIME type from a file extension
pub fn mime_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase);
    match ext.as_deref() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        Some("bmp") => "image/bmp",
        Some("png") => "image/png",
        _ => "application/octet-stream",
    }
}
