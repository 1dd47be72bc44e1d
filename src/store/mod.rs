//! On-disk theme store
//!
//! Layout under the state directory:
//! - `themes/<slug>/` - installed extra themes
//! - `current/theme` - symlink to the active theme directory
//! - `current/background` - symlink to the active background image
//! - `.staging/<id>/` - fetched bundles awaiting validation
//!
//! Built-in themes live read-only under a separate directory and are never
//! written. All writes go through [`StoreWriter`], which holds the store's
//! single writer lock; pointer updates and commits are renames, so readers
//! only ever observe complete directories and valid pointers.

mod staging;

use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::theme::{builtin_theme, slugify, Origin, Scheme, ThemeError};

pub use staging::StagingArea;

/// File name of the install manifest inside a theme directory
pub const MANIFEST_FILE: &str = "theme.json";

/// Subdirectory holding background images
pub const BACKGROUNDS_DIR: &str = "backgrounds";

/// Recognized image extensions (lowercase)
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp", "gif", "bmp"];

const PREVIEW_NAMES: &[&str] = &["preview.png", "preview.jpg", "preview.jpeg", "preview.webp"];

/// True if the path has an image extension
pub fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Metadata written next to an installed extra theme
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub display_name: String,
    #[serde(default)]
    pub scheme: Scheme,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub installed_at: Option<String>,
}

/// Contents of an installed theme directory
#[derive(Debug, Clone)]
pub struct ThemeDir {
    pub slug: String,
    pub path: PathBuf,
    pub origin: Origin,
    pub manifest: Option<Manifest>,
    /// Images under `backgrounds/`, ordered by file name
    pub backgrounds: Vec<PathBuf>,
    pub preview: Option<PathBuf>,
}

/// Active theme pointer state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActiveTheme {
    pub slug: Option<String>,
    /// Incremented on every activation
    pub generation: u64,
}

/// Authoritative on-disk theme state
pub struct ThemeStore {
    state_dir: PathBuf,
    builtin_dir: PathBuf,
    active: RwLock<ActiveTheme>,
    writer: Mutex<()>,
}

impl ThemeStore {
    /// Open (and bootstrap) the store.
    ///
    /// Sweeps staging leftovers, loads the active pointer and, when the
    /// pointer is missing or dangling, activates `default_slug`.
    pub async fn open(
        state_dir: impl Into<PathBuf>,
        builtin_dir: impl Into<PathBuf>,
        default_slug: &str,
    ) -> Result<Self, ThemeError> {
        let store = Self {
            state_dir: state_dir.into(),
            builtin_dir: builtin_dir.into(),
            active: RwLock::new(ActiveTheme::default()),
            writer: Mutex::new(()),
        };

        for dir in [store.themes_dir(), store.current_dir(), store.staging_dir()] {
            tokio::fs::create_dir_all(&dir)
                .await
                .map_err(|e| ThemeError::io(format!("create {}", dir.display()), e))?;
        }
        store.sweep_staging().await;

        match store.read_active_pointer().await {
            Some(slug) => {
                info!("Active theme is '{}'", slug);
                store.active.write().slug = Some(slug);
            }
            None => {
                let mut writer = store.lock().await;
                match writer.activate(default_slug).await {
                    Ok(()) => info!("No valid active theme, defaulted to '{}'", default_slug),
                    Err(e) => warn!("Cannot activate default theme '{}': {}", default_slug, e),
                }
            }
        }

        Ok(store)
    }

    /// Acquire the writer lock. Held for the full duration of a mutation.
    pub async fn lock(&self) -> StoreWriter<'_> {
        StoreWriter {
            store: self,
            _guard: self.writer.lock().await,
        }
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    pub fn builtin_dir(&self) -> &Path {
        &self.builtin_dir
    }

    fn themes_dir(&self) -> PathBuf {
        self.state_dir.join("themes")
    }

    fn current_dir(&self) -> PathBuf {
        self.state_dir.join("current")
    }

    fn staging_dir(&self) -> PathBuf {
        self.state_dir.join(".staging")
    }

    /// Symlink naming the active theme
    pub fn theme_link(&self) -> PathBuf {
        self.current_dir().join("theme")
    }

    /// Symlink naming the active background image
    pub fn background_link(&self) -> PathBuf {
        self.current_dir().join("background")
    }

    /// Snapshot of the active pointer
    pub fn active(&self) -> ActiveTheme {
        self.active.read().clone()
    }

    pub fn active_slug(&self) -> Option<String> {
        self.active.read().slug.clone()
    }

    /// Directory a theme lives in (whether or not it exists)
    pub fn theme_path(&self, slug: &str) -> PathBuf {
        if builtin_theme(slug).is_some() {
            self.builtin_dir.join(slug)
        } else {
            self.themes_dir().join(slug)
        }
    }

    /// True if an extra theme directory exists for `slug`
    pub async fn has_extra(&self, slug: &str) -> bool {
        builtin_theme(slug).is_none()
            && tokio::fs::symlink_metadata(self.themes_dir().join(slug))
                .await
                .map(|m| m.is_dir())
                .unwrap_or(false)
    }

    /// Load an installed theme directory, or `None` if it does not exist
    pub async fn load(&self, slug: &str) -> Result<Option<ThemeDir>, ThemeError> {
        if !is_valid_slug(slug) {
            return Ok(None);
        }
        let path = self.theme_path(slug);
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_dir() => {}
            _ => return Ok(None),
        }

        let origin = if builtin_theme(slug).is_some() {
            Origin::BuiltIn
        } else {
            Origin::Extra
        };

        let manifest = match tokio::fs::read(path.join(MANIFEST_FILE)).await {
            Ok(bytes) => match serde_json::from_slice::<Manifest>(&bytes) {
                Ok(m) => Some(m),
                Err(e) => {
                    warn!("Ignoring malformed manifest for '{}': {}", slug, e);
                    None
                }
            },
            Err(_) => None,
        };

        let backgrounds = list_images(&path.join(BACKGROUNDS_DIR)).await;

        let mut preview = None;
        for name in PREVIEW_NAMES {
            let candidate = path.join(name);
            if tokio::fs::metadata(&candidate).await.is_ok() {
                preview = Some(candidate);
                break;
            }
        }
        if preview.is_none() {
            preview = backgrounds.first().cloned();
        }

        Ok(Some(ThemeDir {
            slug: slug.to_string(),
            path,
            origin,
            manifest,
            backgrounds,
            preview,
        }))
    }

    /// All installed extra themes. Symlinks and non-slug names are skipped.
    pub async fn installed_extras(&self) -> Result<Vec<ThemeDir>, ThemeError> {
        let dir = self.themes_dir();
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(ThemeError::io(format!("read {}", dir.display()), e)),
        };

        let mut slugs = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| ThemeError::io(format!("read {}", dir.display()), e))?
        {
            let is_dir = entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false);
            let name = entry.file_name().to_string_lossy().to_string();
            if !is_dir || builtin_theme(&name).is_some() {
                continue;
            }
            if !is_valid_slug(&name) {
                debug!("Skipping theme directory with non-slug name '{}'", name);
                continue;
            }
            slugs.push(name);
        }
        slugs.sort();

        let mut themes = Vec::with_capacity(slugs.len());
        for slug in slugs {
            if let Some(theme) = self.load(&slug).await? {
                themes.push(theme);
            }
        }
        Ok(themes)
    }

    /// Create a fresh, empty staging area
    pub async fn new_staging(&self) -> Result<StagingArea, ThemeError> {
        let path = self.staging_dir().join(Uuid::new_v4().to_string());
        tokio::fs::create_dir_all(&path)
            .await
            .map_err(|e| ThemeError::io("create staging area", e))?;
        Ok(StagingArea::new(path))
    }

    /// Remove everything left in the staging directory (crash leftovers)
    async fn sweep_staging(&self) {
        let Ok(mut entries) = tokio::fs::read_dir(self.staging_dir()).await else {
            return;
        };
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            debug!("Sweeping stale staging entry {}", path.display());
            let result = if entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
                tokio::fs::remove_dir_all(&path).await
            } else {
                tokio::fs::remove_file(&path).await
            };
            if let Err(e) = result {
                warn!("Failed to sweep {}: {}", path.display(), e);
            }
        }
    }

    /// Read the active pointer, returning the slug if it names a live theme
    async fn read_active_pointer(&self) -> Option<String> {
        let target = read_pointer(&self.theme_link()).await?;
        let slug = target.file_name()?.to_str()?.to_string();
        if !is_valid_slug(&slug) || target != self.theme_path(&slug) {
            warn!("Active theme pointer {} is not a managed theme", target.display());
            return None;
        }
        match tokio::fs::metadata(&target).await {
            Ok(meta) if meta.is_dir() => Some(slug),
            _ => {
                warn!("Active theme pointer {} is dangling", target.display());
                None
            }
        }
    }

    /// Atomically point `link` at `target` (create temp link, rename over)
    async fn relink(&self, link: &Path, target: &Path) -> Result<(), ThemeError> {
        let dir = link.parent().unwrap_or(&self.state_dir);
        let tmp = dir.join(format!(".link-{}", Uuid::new_v4()));

        write_pointer(&tmp, target)
            .await
            .map_err(|e| ThemeError::io(format!("create pointer {}", tmp.display()), e))?;

        if let Err(e) = tokio::fs::rename(&tmp, link).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(ThemeError::io(format!("swap pointer {}", link.display()), e));
        }
        Ok(())
    }
}

/// Exclusive write access to the store
pub struct StoreWriter<'a> {
    store: &'a ThemeStore,
    _guard: MutexGuard<'a, ()>,
}

impl StoreWriter<'_> {
    pub fn store(&self) -> &ThemeStore {
        self.store
    }

    /// Repoint the active theme to an installed theme
    pub async fn activate(&mut self, slug: &str) -> Result<(), ThemeError> {
        if !is_valid_slug(slug) {
            return Err(ThemeError::NotFound(slug.to_string()));
        }
        let target = self.store.theme_path(slug);
        match tokio::fs::metadata(&target).await {
            Ok(meta) if meta.is_dir() => {}
            _ => return Err(ThemeError::NotFound(slug.to_string())),
        }

        self.store
            .relink(&self.store.theme_link(), &target)
            .await?;

        let mut active = self.store.active.write();
        active.slug = Some(slug.to_string());
        active.generation += 1;
        info!("Activated theme '{}' (generation {})", slug, active.generation);
        Ok(())
    }

    /// Move a validated staging area into place as `slug`
    pub async fn commit(&mut self, slug: &str, staged: StagingArea) -> Result<PathBuf, ThemeError> {
        if builtin_theme(slug).is_some() {
            return Err(ThemeError::Immutable(slug.to_string()));
        }
        if !is_valid_slug(slug) {
            return Err(ThemeError::Validation(format!("'{}' is not a valid theme slug", slug)));
        }
        let target = self.store.themes_dir().join(slug);
        if tokio::fs::symlink_metadata(&target).await.is_ok() {
            return Err(ThemeError::AlreadyInstalled(slug.to_string()));
        }

        tokio::fs::rename(staged.path(), &target)
            .await
            .map_err(|e| ThemeError::io(format!("commit theme '{}'", slug), e))?;
        staged.disarm();

        info!("Committed theme '{}' to {}", slug, target.display());
        Ok(target)
    }

    /// Delete an installed extra theme
    pub async fn remove(&mut self, slug: &str) -> Result<(), ThemeError> {
        if builtin_theme(slug).is_some() {
            return Err(ThemeError::Immutable(slug.to_string()));
        }
        if !self.store.has_extra(slug).await {
            return Err(ThemeError::NotFound(slug.to_string()));
        }
        if self.store.active_slug().as_deref() == Some(slug) {
            return Err(ThemeError::ActiveThemeConflict(slug.to_string()));
        }

        let theme_dir = self.store.themes_dir().join(slug);
        if let Some(image) = read_pointer(&self.store.background_link()).await {
            if image.starts_with(&theme_dir) {
                self.clear_background().await?;
            }
        }

        // Rename out of the catalog first so readers never see a half-deleted theme
        let doomed = self
            .store
            .staging_dir()
            .join(format!("removed-{}-{}", slug, Uuid::new_v4()));
        tokio::fs::rename(&theme_dir, &doomed)
            .await
            .map_err(|e| ThemeError::io(format!("remove theme '{}'", slug), e))?;

        if let Err(e) = tokio::fs::remove_dir_all(&doomed).await {
            warn!("Theme '{}' removed but cleanup of {} failed: {}", slug, doomed.display(), e);
        }
        info!("Removed theme '{}'", slug);
        Ok(())
    }

    /// Repoint the active background link
    pub async fn set_background(&mut self, image: &Path) -> Result<(), ThemeError> {
        self.store
            .relink(&self.store.background_link(), image)
            .await
    }

    /// Drop the background link (the active theme has no backgrounds)
    pub async fn clear_background(&mut self) -> Result<(), ThemeError> {
        let link = self.store.background_link();
        match tokio::fs::remove_file(&link).await {
            Ok(()) => {
                debug!("Cleared background link");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ThemeError::io(format!("clear pointer {}", link.display()), e)),
        }
    }
}

/// True if `slug` is a canonical slug (safe to use as a path component)
pub fn is_valid_slug(slug: &str) -> bool {
    !slug.is_empty() && slugify(slug) == slug
}

/// Image files in `dir`, sorted by file name
async fn list_images(dir: &Path) -> Vec<PathBuf> {
    let Ok(mut entries) = tokio::fs::read_dir(dir).await else {
        return Vec::new();
    };
    let mut images = Vec::new();
    while let Ok(Some(entry)) = entries.next_entry().await {
        let path = entry.path();
        if is_image(&path) && tokio::fs::metadata(&path).await.map(|m| m.is_file()).unwrap_or(false) {
            images.push(path);
        }
    }
    images.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    images
}

#[cfg(unix)]
async fn write_pointer(at: &Path, target: &Path) -> std::io::Result<()> {
    tokio::fs::symlink(target, at).await
}

#[cfg(not(unix))]
async fn write_pointer(at: &Path, target: &Path) -> std::io::Result<()> {
    tokio::fs::write(at, target.to_string_lossy().as_bytes()).await
}

#[cfg(unix)]
async fn read_pointer(link: &Path) -> Option<PathBuf> {
    tokio::fs::read_link(link).await.ok()
}

#[cfg(not(unix))]
async fn read_pointer(link: &Path) -> Option<PathBuf> {
    tokio::fs::read_to_string(link)
        .await
        .ok()
        .map(|s| PathBuf::from(s.trim()))
}
