//! Theme catalog
//!
//! Merges built-in definitions, installed extras from the store and entries
//! of the remote index into one slug-unique view. Snapshots are rebuilt on
//! demand and never take the store's writer lock.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::warn;

use crate::index::RemoteIndex;
use crate::store::{ThemeDir, ThemeStore};
use crate::theme::{
    display_name_from_slug, normalize, Origin, PreviewRef, RemovePolicy, SchemeFilter, Theme,
    ThemeError, ThemeFilter, BUILTIN_THEMES,
};

/// Builds catalog snapshots
pub struct Catalog {
    store: Arc<ThemeStore>,
    index: Arc<RemoteIndex>,
    remove_policy: RemovePolicy,
}

impl Catalog {
    pub fn new(store: Arc<ThemeStore>, index: Arc<RemoteIndex>, remove_policy: RemovePolicy) -> Self {
        Self {
            store,
            index,
            remove_policy,
        }
    }

    pub fn index(&self) -> &RemoteIndex {
        &self.index
    }

    /// Build a snapshot of installed themes, plus the remote index if asked
    pub async fn snapshot(&self, include_index: bool) -> Result<CatalogSnapshot, ThemeError> {
        let active = self.store.active_slug();
        let mut snapshot = CatalogSnapshot {
            themes: Vec::new(),
            warnings: Vec::new(),
            remove_active: self.remove_policy == RemovePolicy::FallbackToDefault,
            index_missing: false,
        };
        let mut keys = HashSet::new();

        for def in BUILTIN_THEMES {
            let dir = self.store.load(def.slug).await?;
            keys.insert(normalize(def.display_name));
            snapshot.themes.push(Theme {
                slug: def.slug.to_string(),
                display_name: def.display_name.to_string(),
                origin: Origin::BuiltIn,
                scheme: def.scheme,
                source: None,
                installed: true,
                is_active: active.as_deref() == Some(def.slug),
                backgrounds: dir.as_ref().map(|d| d.backgrounds.clone()).unwrap_or_default(),
                preview: dir.and_then(|d| d.preview).map(PreviewRef::Local),
            });
        }

        let lookup = if include_index {
            let lookup = self.index.lookup().await;
            if let Some(warning) = &lookup.warning {
                snapshot.warnings.push(warning.clone());
                snapshot.index_missing = lookup.entries.is_empty();
            }
            Some(lookup)
        } else {
            None
        };
        let entries = lookup.as_ref().map(|l| l.entries.as_slice()).unwrap_or(&[]);

        for dir in self.store.installed_extras().await? {
            let entry = entries.iter().find(|e| e.slug == dir.slug);
            let theme = extra_theme(dir, entry.map(|e| (e.display_name.as_str(), e.scheme, e.source.as_str())), active.as_deref());
            if !keys.insert(normalize(&theme.display_name)) {
                warn!("Installed theme '{}' shadows an existing theme, hidden", theme.slug);
                continue;
            }
            snapshot.themes.push(theme);
        }

        for entry in entries {
            if snapshot.themes.iter().any(|t| t.slug == entry.slug) {
                continue;
            }
            if !keys.insert(normalize(&entry.display_name)) {
                continue;
            }
            snapshot.themes.push(Theme {
                slug: entry.slug.clone(),
                display_name: entry.display_name.clone(),
                origin: Origin::Extra,
                scheme: entry.scheme,
                source: Some(entry.source.clone()),
                installed: false,
                is_active: false,
                backgrounds: Vec::new(),
                preview: entry.preview_url.clone().map(PreviewRef::Remote),
            });
        }

        snapshot
            .themes
            .sort_by_key(|t| t.display_name.to_lowercase());
        Ok(snapshot)
    }
}

/// Build the catalog record for an installed extra theme.
///
/// The manifest written at install time wins; a matching index entry fills
/// in for themes installed by hand.
fn extra_theme(
    dir: ThemeDir,
    entry: Option<(&str, crate::theme::Scheme, &str)>,
    active: Option<&str>,
) -> Theme {
    let (display_name, scheme, source) = match (&dir.manifest, entry) {
        (Some(m), _) => (m.display_name.clone(), m.scheme, m.source.clone()),
        (None, Some((name, scheme, source))) => {
            (name.to_string(), scheme, Some(source.to_string()))
        }
        (None, None) => (display_name_from_slug(&dir.slug), Default::default(), None),
    };

    Theme {
        is_active: active == Some(dir.slug.as_str()),
        slug: dir.slug,
        display_name,
        origin: Origin::Extra,
        scheme,
        source,
        installed: true,
        backgrounds: dir.backgrounds,
        preview: dir.preview.map(PreviewRef::Local),
    }
}

/// Point-in-time view of the catalog
#[derive(Debug, Clone)]
pub struct CatalogSnapshot {
    themes: Vec<Theme>,
    warnings: Vec<String>,
    /// Whether the active theme counts as removable
    remove_active: bool,
    /// The index was wanted but no entries (not even stale ones) came back
    index_missing: bool,
}

impl CatalogSnapshot {
    /// Lazily filter the snapshot. Call again to restart.
    pub fn list(
        &self,
        filter: ThemeFilter,
        scheme: SchemeFilter,
    ) -> impl Iterator<Item = &Theme> + '_ {
        let remove_active = self.remove_active;
        self.themes
            .iter()
            .filter(move |t| matches_filter(t, filter, remove_active))
            .filter(move |t| scheme.matches(t.scheme))
    }

    /// Warnings gathered while building (e.g. index unavailable)
    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// True when remote themes are absent because the index could not be read
    pub fn index_missing(&self) -> bool {
        self.index_missing
    }

    pub fn get(&self, slug: &str) -> Option<&Theme> {
        self.themes.iter().find(|t| t.slug == slug)
    }

    pub fn active(&self) -> Option<&Theme> {
        self.themes.iter().find(|t| t.is_active)
    }
}

fn matches_filter(theme: &Theme, filter: ThemeFilter, remove_active: bool) -> bool {
    match filter {
        ThemeFilter::Installed => theme.installed,
        ThemeFilter::All => true,
        ThemeFilter::Current => theme.is_active,
        ThemeFilter::BuiltIn => theme.origin == Origin::BuiltIn,
        ThemeFilter::CanRemove => {
            theme.origin == Origin::Extra && theme.installed && (remove_active || !theme.is_active)
        }
        ThemeFilter::CanInstall => !theme.installed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::{FetchConfig, Fetcher};
    use crate::store::test_utils::write_theme;
    use crate::theme::Scheme;
    use std::path::Path;
    use std::time::Duration;
    use tempfile::TempDir;

    const INDEX: &str = r#"[
        {"name": "Dune Sea", "scheme": "Light", "github_url": "https://github.com/example/dune-sea"},
        {"name": "Neon Rain", "scheme": "Dark", "github_url": "https://github.com/example/neon-rain",
         "preview_url": "https://example.test/neon.png"},
        {"name": "Nord", "scheme": "Dark", "github_url": "https://github.com/example/nord-clone"}
    ]"#;

    async fn catalog(tmp: &Path, index_url: Option<String>, policy: RemovePolicy) -> Catalog {
        let builtin = tmp.join("builtin");
        write_theme(&builtin.join("tokyo-night"), &["a.png", "b.png"]);
        write_theme(&builtin.join("nord"), &["a.png"]);
        let store = ThemeStore::open(tmp.join("state"), &builtin, "tokyo-night")
            .await
            .unwrap();
        let fetcher = Fetcher::new(FetchConfig::default()).unwrap();
        let index = RemoteIndex::new(index_url, Duration::from_secs(60), fetcher);
        Catalog::new(Arc::new(store), Arc::new(index), policy)
    }

    fn index_url(tmp: &Path) -> Option<String> {
        let path = tmp.join("index.json");
        std::fs::write(&path, INDEX).unwrap();
        Some(format!("file://{}", path.display()))
    }

    fn slugs<'a>(themes: impl Iterator<Item = &'a Theme>) -> Vec<&'a str> {
        themes.map(|t| t.slug.as_str()).collect()
    }

    #[tokio::test]
    async fn test_installed_view() {
        let tmp = TempDir::new().unwrap();
        let catalog = catalog(tmp.path(), None, RemovePolicy::Refuse).await;
        let snapshot = catalog.snapshot(false).await.unwrap();

        let installed: Vec<_> = snapshot.list(ThemeFilter::Installed, SchemeFilter::Any).collect();
        assert_eq!(installed.len(), BUILTIN_THEMES.len());
        assert!(installed.iter().all(|t| t.installed && t.origin == Origin::BuiltIn));

        let current = slugs(snapshot.list(ThemeFilter::Current, SchemeFilter::Any));
        assert_eq!(current, vec!["tokyo-night"]);

        let tokyo = snapshot.get("tokyo-night").unwrap();
        assert_eq!(tokyo.backgrounds.len(), 2);
        // Built-in without files on disk is still installed
        let gruvbox = snapshot.get("gruvbox").unwrap();
        assert!(gruvbox.installed && gruvbox.backgrounds.is_empty());

        assert!(snapshot.warnings().is_empty());
    }

    #[tokio::test]
    async fn test_scheme_filter() {
        let tmp = TempDir::new().unwrap();
        let catalog = catalog(tmp.path(), None, RemovePolicy::Refuse).await;
        let snapshot = catalog.snapshot(false).await.unwrap();

        let light = slugs(snapshot.list(ThemeFilter::BuiltIn, SchemeFilter::Light));
        assert_eq!(
            light,
            vec!["catppuccin-latte", "flexoki-light", "kanagawa", "rose-pine"]
        );
    }

    #[tokio::test]
    async fn test_index_merge_and_can_install() {
        let tmp = TempDir::new().unwrap();
        let catalog = catalog(tmp.path(), index_url(tmp.path()), RemovePolicy::Refuse).await;
        let snapshot = catalog.snapshot(true).await.unwrap();

        // "Nord" from the index collides with the built-in and is dropped
        let can_install = slugs(snapshot.list(ThemeFilter::CanInstall, SchemeFilter::Any));
        assert_eq!(can_install, vec!["dune-sea", "neon-rain"]);

        let all = snapshot.list(ThemeFilter::All, SchemeFilter::Any).count();
        assert_eq!(all, BUILTIN_THEMES.len() + 2);

        let neon = snapshot.get("neon-rain").unwrap();
        assert!(!neon.installed && neon.backgrounds.is_empty());
        assert_eq!(
            neon.preview,
            Some(PreviewRef::Remote("https://example.test/neon.png".to_string()))
        );
        assert_eq!(snapshot.get("nord").unwrap().origin, Origin::BuiltIn);
    }

    #[tokio::test]
    async fn test_index_failure_degrades_with_warning() {
        let tmp = TempDir::new().unwrap();
        let missing = Some(format!("file://{}/nope.json", tmp.path().display()));
        let catalog = catalog(tmp.path(), missing, RemovePolicy::Refuse).await;
        let snapshot = catalog.snapshot(true).await.unwrap();

        assert_eq!(snapshot.list(ThemeFilter::CanInstall, SchemeFilter::Any).count(), 0);
        assert_eq!(
            snapshot.list(ThemeFilter::All, SchemeFilter::Any).count(),
            snapshot.list(ThemeFilter::Installed, SchemeFilter::Any).count()
        );
        assert_eq!(snapshot.warnings().len(), 1);
    }

    #[tokio::test]
    async fn test_can_remove_respects_policy() {
        for (policy, expect_active) in [
            (RemovePolicy::Refuse, false),
            (RemovePolicy::FallbackToDefault, true),
        ] {
            let tmp = TempDir::new().unwrap();
            let catalog = catalog(tmp.path(), index_url(tmp.path()), policy).await;
            write_theme(&tmp.path().join("state/themes/dune-sea"), &["x.png"]);
            write_theme(&tmp.path().join("state/themes/handmade"), &["x.png"]);
            catalog
                .store
                .lock()
                .await
                .activate("handmade")
                .await
                .unwrap();

            let snapshot = catalog.snapshot(true).await.unwrap();
            let removable = slugs(snapshot.list(ThemeFilter::CanRemove, SchemeFilter::Any));
            assert!(removable.contains(&"dune-sea"));
            assert_eq!(removable.contains(&"handmade"), expect_active);

            // Hand-installed theme without manifest picks up the index metadata
            let dune = snapshot.get("dune-sea").unwrap();
            assert_eq!(dune.display_name, "Dune Sea");
            assert_eq!(dune.scheme, Scheme::Light);
            assert!(dune.installed);
            assert_eq!(snapshot.get("handmade").unwrap().display_name, "Handmade");
            assert_eq!(snapshot.active().unwrap().slug, "handmade");
        }
    }

    #[tokio::test]
    async fn test_list_is_restartable() {
        let tmp = TempDir::new().unwrap();
        let catalog = catalog(tmp.path(), None, RemovePolicy::Refuse).await;
        let snapshot = catalog.snapshot(false).await.unwrap();

        let first: Vec<_> = snapshot.list(ThemeFilter::BuiltIn, SchemeFilter::Dark).collect();
        let second: Vec<_> = snapshot.list(ThemeFilter::BuiltIn, SchemeFilter::Dark).collect();
        assert_eq!(first.len(), second.len());
        assert!(!first.is_empty());
    }
}
