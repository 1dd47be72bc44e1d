//! Theme engine
//!
//! Owns the store, catalog, installer, preview cache and rotator, and
//! exposes the operations callers see. Mutating operations hold the store's
//! writer lock from resolution until the desktop has been told about the
//! change; reads work from a fresh catalog snapshot and never block on it.

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, warn};

use crate::apply::Applier;
use crate::catalog::{Catalog, CatalogSnapshot};
use crate::config::Config;
use crate::fetch::Fetcher;
use crate::index::RemoteIndex;
use crate::install::Installer;
use crate::preview::{mime_type, PreviewCache, PreviewImage};
use crate::resolve::resolve;
use crate::rotator::Rotator;
use crate::store::{StoreWriter, ThemeStore};
use crate::theme::{SchemeFilter, Theme, ThemeError, ThemeFilter};

/// A result plus non-fatal warnings (apply hook failures, stale index)
#[derive(Debug, Clone, Serialize)]
pub struct Outcome<T> {
    #[serde(flatten)]
    pub value: T,
    pub warnings: Vec<String>,
}

impl<T> Outcome<T> {
    fn new(value: T, warnings: Vec<String>) -> Self {
        Self { value, warnings }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ThemeList {
    pub themes: Vec<Theme>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ThemeResult {
    pub theme: Theme,
}

/// Background shown after a rotation
#[derive(Debug, Clone, Serialize)]
pub struct Background {
    pub theme: String,
    pub path: PathBuf,
    pub mime_type: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Preview {
    pub theme: Theme,
    #[serde(flatten)]
    pub image: PreviewImage,
}

#[derive(Debug, Clone, Serialize)]
pub struct Removal {
    pub removed: String,
    /// Theme activated in place of the removed one
    pub activated: Option<String>,
}

/// Theme lifecycle facade
pub struct Engine {
    store: Arc<ThemeStore>,
    catalog: Catalog,
    installer: Installer,
    previews: PreviewCache,
    rotator: Rotator,
    applier: Applier,
}

impl Engine {
    /// Open the store (bootstrapping the active theme) and wire components
    pub async fn open(config: &Config) -> Result<Self, ThemeError> {
        let fetcher = Fetcher::new(config.fetch())?;
        let store = Arc::new(
            ThemeStore::open(&config.state_dir, &config.builtin_dir, &config.default_theme).await?,
        );
        let index = Arc::new(RemoteIndex::new(
            config.index_url.clone(),
            config.index_ttl(),
            fetcher.clone(),
        ));

        Ok(Self {
            catalog: Catalog::new(store.clone(), index, config.remove_policy),
            installer: Installer::new(
                fetcher.clone(),
                config.default_theme.clone(),
                config.remove_policy,
            ),
            previews: PreviewCache::new(&config.cache_dir, fetcher),
            rotator: Rotator::new(),
            applier: Applier::new(config.apply.clone()),
            store,
        })
    }

    pub fn store(&self) -> &ThemeStore {
        &self.store
    }

    /// Themes matching the filters. Index trouble degrades to a warning.
    pub async fn list_themes(
        &self,
        filter: ThemeFilter,
        scheme: SchemeFilter,
    ) -> Result<Outcome<ThemeList>, ThemeError> {
        let snapshot = self.catalog.snapshot(filter.needs_index()).await?;
        let themes = snapshot.list(filter, scheme).cloned().collect();
        Ok(Outcome::new(ThemeList { themes }, snapshot.warnings().to_vec()))
    }

    pub async fn current_theme(&self) -> Result<Theme, ThemeError> {
        let snapshot = self.catalog.snapshot(false).await?;
        snapshot
            .active()
            .cloned()
            .ok_or_else(|| ThemeError::NotFound("active theme".to_string()))
    }

    /// Resolve an installed theme and make it active
    pub async fn set_theme(&self, name: &str) -> Result<Outcome<ThemeResult>, ThemeError> {
        let mut writer = self.store.lock().await;
        let snapshot = self.catalog.snapshot(false).await?;
        let theme = resolve(name, snapshot.list(ThemeFilter::Installed, SchemeFilter::Any))?;
        let slug = theme.slug.clone();

        writer.activate(&slug).await?;
        let warnings = self.after_activation(&mut writer, &slug).await;
        drop(writer);

        info!("Theme set to '{}'", slug);
        Ok(Outcome::new(ThemeResult { theme: self.installed(&slug).await? }, warnings))
    }

    /// Rotate the active theme's background
    pub async fn next_background(&self) -> Result<Outcome<Background>, ThemeError> {
        let mut writer = self.store.lock().await;
        let path = self.rotator.next_background(&mut writer).await?;
        let theme = writer.store().active_slug().unwrap_or_default();

        let warnings = self.applier.apply_background(&path).await.into_iter().collect();
        Ok(Outcome::new(
            Background {
                theme,
                mime_type: mime_type(&path).to_string(),
                path,
            },
            warnings,
        ))
    }

    /// Preview image for any known theme, installed or not
    pub async fn preview_theme(&self, name: &str) -> Result<Outcome<Preview>, ThemeError> {
        let snapshot = self.catalog.snapshot(true).await?;
        let theme = self.resolve_listed(&snapshot, name, ThemeFilter::All)?;
        let image = self.previews.preview(theme).await?;
        Ok(Outcome::new(
            Preview {
                theme: theme.clone(),
                image,
            },
            snapshot.warnings().to_vec(),
        ))
    }

    /// Install a theme from the remote index and activate it
    pub async fn install_theme(&self, name: &str) -> Result<Outcome<ThemeResult>, ThemeError> {
        let mut writer = self.store.lock().await;
        let snapshot = self.catalog.snapshot(true).await?;

        let installed = match self.installer.install(&mut writer, &snapshot, name).await {
            Ok(installed) => installed,
            Err(ThemeError::NotFound(query)) => {
                return Err(self.index_unavailable(&snapshot).unwrap_or(ThemeError::NotFound(query)))
            }
            Err(e) => return Err(e),
        };

        let mut warnings = self.after_activation(&mut writer, &installed.slug).await;
        warnings.extend(snapshot.warnings().iter().cloned());
        drop(writer);

        Ok(Outcome::new(
            ThemeResult {
                theme: self.installed(&installed.slug).await?,
            },
            warnings,
        ))
    }

    /// Uninstall an extra theme
    pub async fn remove_theme(&self, name: &str) -> Result<Outcome<Removal>, ThemeError> {
        let mut writer = self.store.lock().await;
        let snapshot = self.catalog.snapshot(false).await?;
        let before = writer.store().active();
        let result = self.installer.uninstall(&mut writer, &snapshot, name).await;

        // The fallback activation stands even if the removal itself failed
        let after = writer.store().active();
        let warnings = match after.slug {
            Some(slug) if after.generation != before.generation => {
                self.after_activation(&mut writer, &slug).await
            }
            _ => Vec::new(),
        };
        let removed = result?;

        Ok(Outcome::new(
            Removal {
                removed: removed.slug,
                activated: removed.activated,
            },
            warnings,
        ))
    }

    /// Re-fetch the remote index now, returning the number of entries
    pub async fn refresh_index(&self) -> Result<usize, ThemeError> {
        self.catalog.index().refresh().await
    }

    /// Show the first background and notify the desktop. Never fails.
    async fn after_activation(&self, writer: &mut StoreWriter<'_>, slug: &str) -> Vec<String> {
        let mut warnings = Vec::new();
        let dir = writer.store().theme_path(slug);
        warnings.extend(self.applier.apply_theme(slug, &dir).await);

        match self.rotator.show_first(writer).await {
            Ok(Some(image)) => warnings.extend(self.applier.apply_background(&image).await),
            Ok(None) => {}
            Err(e) => {
                let warning = format!("could not set background for '{}': {}", slug, e);
                warn!("{}", warning);
                warnings.push(warning);
            }
        }
        warnings
    }

    fn resolve_listed<'a>(
        &self,
        snapshot: &'a CatalogSnapshot,
        name: &str,
        filter: ThemeFilter,
    ) -> Result<&'a Theme, ThemeError> {
        resolve(name, snapshot.list(filter, SchemeFilter::Any)).map_err(|e| match e {
            ThemeError::NotFound(query) => {
                self.index_unavailable(snapshot).unwrap_or(ThemeError::NotFound(query))
            }
            other => other,
        })
    }

    /// A name missing while the index is down is a network problem, not a typo.
    /// A stale index still answers, so a miss against it stays `NotFound`.
    fn index_unavailable(&self, snapshot: &CatalogSnapshot) -> Option<ThemeError> {
        if !snapshot.index_missing() {
            return None;
        }
        let warning = snapshot.warnings().first()?;
        let url = self.catalog.index().url()?;
        Some(ThemeError::Network {
            url: url.to_string(),
            message: warning.clone(),
        })
    }

    async fn installed(&self, slug: &str) -> Result<Theme, ThemeError> {
        let snapshot = self.catalog.snapshot(false).await?;
        snapshot
            .get(slug)
            .cloned()
            .ok_or_else(|| ThemeError::NotFound(slug.to_string()))
    }
}
