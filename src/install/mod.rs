//! Install and uninstall orchestration
//!
//! An install moves through `PendingFetch -> Fetched -> Validated ->
//! Installed`; any failing stage ends in `Failed` with no catalog change.
//! Callers hold the store's writer lock for the whole pipeline, and the
//! staging area deletes itself if the pipeline stops early for any reason
//! (error or a dropped future).

pub mod bundle;

use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::catalog::CatalogSnapshot;
use crate::fetch::Fetcher;
use crate::resolve::resolve;
use crate::store::{Manifest, StagingArea, StoreWriter, MANIFEST_FILE};
use crate::theme::{Origin, RemovePolicy, SchemeFilter, Theme, ThemeError, ThemeFilter};

/// Unpacked bundles may be this many times the download size limit
const UNPACK_FACTOR: u64 = 4;

/// Install pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallStage {
    PendingFetch,
    Fetched,
    Validated,
    Installed,
    Failed,
}

impl fmt::Display for InstallStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            InstallStage::PendingFetch => "pending_fetch",
            InstallStage::Fetched => "fetched",
            InstallStage::Validated => "validated",
            InstallStage::Installed => "installed",
            InstallStage::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Outcome of a successful install
#[derive(Debug, Clone)]
pub struct Installed {
    pub slug: String,
    pub display_name: String,
    pub path: PathBuf,
}

/// Outcome of a successful uninstall
#[derive(Debug, Clone)]
pub struct Removed {
    pub slug: String,
    pub display_name: String,
    /// Set when the active theme was removed and the default took over
    pub activated: Option<String>,
}

/// Runs install and uninstall against a locked store
pub struct Installer {
    fetcher: Fetcher,
    default_theme: String,
    remove_policy: RemovePolicy,
}

impl Installer {
    pub fn new(fetcher: Fetcher, default_theme: impl Into<String>, remove_policy: RemovePolicy) -> Self {
        Self {
            fetcher,
            default_theme: default_theme.into(),
            remove_policy,
        }
    }

    /// Resolve `name` among installable themes, then fetch, validate,
    /// commit and activate it.
    pub async fn install(
        &self,
        writer: &mut StoreWriter<'_>,
        snapshot: &CatalogSnapshot,
        name: &str,
    ) -> Result<Installed, ThemeError> {
        let theme = match resolve(name, snapshot.list(ThemeFilter::CanInstall, SchemeFilter::Any)) {
            Ok(theme) => theme,
            Err(ThemeError::NotFound(query)) => {
                return Err(
                    match resolve(name, snapshot.list(ThemeFilter::Installed, SchemeFilter::Any)) {
                        Ok(installed) => ThemeError::AlreadyInstalled(installed.slug.clone()),
                        Err(_) => ThemeError::NotFound(query),
                    },
                );
            }
            Err(e) => return Err(e),
        };

        let mut pipeline = Pipeline::new(&theme.slug);
        match self.run(writer, theme, &mut pipeline).await {
            Ok(installed) => Ok(installed),
            Err(e) => {
                pipeline.fail(&e);
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        writer: &mut StoreWriter<'_>,
        theme: &Theme,
        pipeline: &mut Pipeline,
    ) -> Result<Installed, ThemeError> {
        let source = theme.source.as_deref().ok_or_else(|| {
            ThemeError::Validation(format!("theme '{}' has no source", theme.display_name))
        })?;
        let url = bundle::archive_url(source)?;

        let fetched = self.fetcher.get(&url).await?;
        let staged = writer.store().new_staging().await?;
        let limit = self.fetcher.max_bytes().saturating_mul(UNPACK_FACTOR);
        unpack(fetched.data, &staged, limit).await?;
        pipeline.advance(InstallStage::Fetched);

        check(&staged).await?;
        pipeline.advance(InstallStage::Validated);

        write_manifest(&staged, theme).await?;
        let path = writer.commit(&theme.slug, staged).await?;

        if let Err(e) = writer.activate(&theme.slug).await {
            warn!("Activation of '{}' failed, rolling back commit", theme.slug);
            if let Err(cleanup) = writer.remove(&theme.slug).await {
                warn!("Rollback of '{}' failed: {}", theme.slug, cleanup);
            }
            return Err(e);
        }
        pipeline.advance(InstallStage::Installed);

        info!("Installed theme '{}' from {}", theme.slug, url);
        Ok(Installed {
            slug: theme.slug.clone(),
            display_name: theme.display_name.clone(),
            path,
        })
    }

    /// Resolve `name` among removable themes and delete it
    pub async fn uninstall(
        &self,
        writer: &mut StoreWriter<'_>,
        snapshot: &CatalogSnapshot,
        name: &str,
    ) -> Result<Removed, ThemeError> {
        let theme = match resolve(name, snapshot.list(ThemeFilter::CanRemove, SchemeFilter::Any)) {
            Ok(theme) => theme,
            Err(ThemeError::NotFound(query)) => {
                return Err(
                    match resolve(name, snapshot.list(ThemeFilter::Installed, SchemeFilter::Any)) {
                        Ok(t) if t.origin == Origin::BuiltIn => ThemeError::Immutable(t.slug.clone()),
                        Ok(t) if t.is_active => ThemeError::ActiveThemeConflict(t.slug.clone()),
                        _ => ThemeError::NotFound(query),
                    },
                );
            }
            Err(e) => return Err(e),
        };

        let mut activated = None;
        if theme.is_active {
            match self.remove_policy {
                RemovePolicy::Refuse => {
                    return Err(ThemeError::ActiveThemeConflict(theme.slug.clone()));
                }
                RemovePolicy::FallbackToDefault => {
                    info!(
                        "Removing active theme '{}', switching to '{}'",
                        theme.slug, self.default_theme
                    );
                    writer.activate(&self.default_theme).await?;
                    activated = Some(self.default_theme.clone());
                }
            }
        }

        writer.remove(&theme.slug).await?;
        Ok(Removed {
            slug: theme.slug.clone(),
            display_name: theme.display_name.clone(),
            activated,
        })
    }
}

/// Stage tracker for one install
struct Pipeline {
    slug: String,
    stage: InstallStage,
}

impl Pipeline {
    fn new(slug: &str) -> Self {
        debug!("Install '{}': {}", slug, InstallStage::PendingFetch);
        Self {
            slug: slug.to_string(),
            stage: InstallStage::PendingFetch,
        }
    }

    fn advance(&mut self, stage: InstallStage) {
        debug!("Install '{}': {} -> {}", self.slug, self.stage, stage);
        self.stage = stage;
    }

    fn fail(&mut self, err: &ThemeError) {
        warn!(
            "Install '{}' failed during {}: {}",
            self.slug, self.stage, err
        );
        self.stage = InstallStage::Failed;
    }
}

async fn unpack(data: Vec<u8>, staged: &StagingArea, limit: u64) -> Result<usize, ThemeError> {
    let dest = staged.path().to_path_buf();
    tokio::task::spawn_blocking(move || bundle::extract(&data, &dest, limit))
        .await
        .map_err(|e| ThemeError::Internal(format!("extraction task failed: {}", e)))?
}

async fn check(staged: &StagingArea) -> Result<(), ThemeError> {
    let dir = staged.path().to_path_buf();
    tokio::task::spawn_blocking(move || bundle::validate(&dir))
        .await
        .map_err(|e| ThemeError::Internal(format!("validation task failed: {}", e)))?
}

async fn write_manifest(staged: &StagingArea, theme: &Theme) -> Result<(), ThemeError> {
    let manifest = Manifest {
        display_name: theme.display_name.clone(),
        scheme: theme.scheme,
        source: theme.source.clone(),
        installed_at: Some(chrono::Utc::now().to_rfc3339()),
    };
    let json = serde_json::to_vec_pretty(&manifest)
        .map_err(|e| ThemeError::Internal(format!("serialize manifest: {}", e)))?;
    let path: &Path = staged.path();
    tokio::fs::write(path.join(MANIFEST_FILE), json)
        .await
        .map_err(|e| ThemeError::io("write manifest", e))
}
