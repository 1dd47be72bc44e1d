//! Theme data model
//!
//! A theme is either bundled with the desktop (built-in) or a community
//! theme installed from a remote repository (extra). This module holds the
//! catalog record, the filters used to query it, and the fixed table of
//! built-in definitions.

mod error;

use std::fmt;
use std::path::PathBuf;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

pub use error::ThemeError;

/// Where a theme comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    /// Shipped with the desktop, always installed, never removable
    BuiltIn,
    /// Community theme fetched from a remote source
    Extra,
}

/// Light/dark classification of a theme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scheme {
    Light,
    Dark,
    #[default]
    Unspecified,
}

impl Scheme {
    /// Parse from string ("Dark", "light", ...). Unknown values are unspecified.
    pub fn parse(s: &str) -> Scheme {
        match s.trim().to_lowercase().as_str() {
            "light" => Scheme::Light,
            "dark" => Scheme::Dark,
            _ => Scheme::Unspecified,
        }
    }
}

/// Image reference for a theme preview
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "location", rename_all = "snake_case")]
pub enum PreviewRef {
    /// File inside an installed theme directory (or the preview cache)
    Local(PathBuf),
    /// Remote image that must be fetched before it can be shown
    Remote(String),
}

/// A theme as seen by the catalog
#[derive(Debug, Clone, Serialize)]
pub struct Theme {
    /// Unique machine key, e.g. "tokyo-night"
    pub slug: String,
    /// Human readable name, e.g. "Tokyo Night"
    pub display_name: String,
    pub origin: Origin,
    pub scheme: Scheme,
    /// Remote repository reference (extra themes only)
    pub source: Option<String>,
    pub installed: bool,
    pub is_active: bool,
    /// Ordered background images (empty unless installed)
    pub backgrounds: Vec<PathBuf>,
    pub preview: Option<PreviewRef>,
}

/// Catalog query filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThemeFilter {
    /// Built-in plus installed extra themes
    #[default]
    Installed,
    /// Installed themes plus everything the remote index offers
    All,
    /// The active theme only
    Current,
    BuiltIn,
    /// Installed extras that may be uninstalled
    CanRemove,
    /// Remote index entries that are not installed yet
    CanInstall,
}

impl ThemeFilter {
    /// Parse from string, accepting "can_remove", "can-remove", "CanRemove", ...
    pub fn parse(s: &str) -> Option<ThemeFilter> {
        match normalize(s).as_str() {
            "" | "installed" => Some(ThemeFilter::Installed),
            "all" => Some(ThemeFilter::All),
            "current" | "active" => Some(ThemeFilter::Current),
            "builtin" => Some(ThemeFilter::BuiltIn),
            "canremove" | "removable" => Some(ThemeFilter::CanRemove),
            "caninstall" | "installable" => Some(ThemeFilter::CanInstall),
            _ => None,
        }
    }

    /// True if this filter needs the remote index
    pub fn needs_index(&self) -> bool {
        matches!(self, ThemeFilter::All | ThemeFilter::CanInstall)
    }
}

/// Light/dark narrowing for catalog queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemeFilter {
    Light,
    Dark,
    #[default]
    Any,
}

impl SchemeFilter {
    pub fn parse(s: &str) -> Option<SchemeFilter> {
        match normalize(s).as_str() {
            "" | "any" | "all" => Some(SchemeFilter::Any),
            "light" => Some(SchemeFilter::Light),
            "dark" => Some(SchemeFilter::Dark),
            _ => None,
        }
    }

    pub fn matches(&self, scheme: Scheme) -> bool {
        match self {
            SchemeFilter::Any => true,
            SchemeFilter::Light => scheme == Scheme::Light,
            SchemeFilter::Dark => scheme == Scheme::Dark,
        }
    }
}

impl fmt::Display for ThemeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ThemeFilter::Installed => "installed",
            ThemeFilter::All => "all",
            ThemeFilter::Current => "current",
            ThemeFilter::BuiltIn => "built_in",
            ThemeFilter::CanRemove => "can_remove",
            ThemeFilter::CanInstall => "can_install",
        };
        f.write_str(s)
    }
}

/// What uninstalling the active theme does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemovePolicy {
    /// Refuse with an active-theme conflict
    #[default]
    Refuse,
    /// Switch to the default theme first, then remove
    FallbackToDefault,
}

/// Matching key: lowercase with every non-alphanumeric character removed.
///
/// "Tokyo Night", "tokyo-night" and "tokyonight" share the key "tokyonight".
pub fn normalize(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

static SLUG_SEPARATORS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9]+").expect("static regex"));

/// Derive the on-disk slug from a display name ("Rosé Pine!" -> "ros-pine").
pub fn slugify(display_name: &str) -> String {
    let lower = display_name.to_lowercase();
    SLUG_SEPARATORS
        .replace_all(&lower, "-")
        .trim_matches('-')
        .to_string()
}

/// Turn a slug back into a presentable name ("tokyo-night" -> "Tokyo Night").
pub fn display_name_from_slug(slug: &str) -> String {
    slug.split(['-', '_'])
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// A bundled built-in theme definition
#[derive(Debug, Clone, Copy)]
pub struct BuiltinTheme {
    pub slug: &'static str,
    pub display_name: &'static str,
    pub scheme: Scheme,
}

/// Themes shipped with the desktop
pub const BUILTIN_THEMES: &[BuiltinTheme] = &[
    builtin("catppuccin", "Catppuccin", Scheme::Dark),
    builtin("catppuccin-latte", "Catppuccin Latte", Scheme::Light),
    builtin("ethereal", "Ethereal", Scheme::Dark),
    builtin("everforest", "Everforest", Scheme::Dark),
    builtin("flexoki-light", "Flexoki Light", Scheme::Light),
    builtin("gruvbox", "Gruvbox", Scheme::Dark),
    builtin("hackerman", "Hackerman", Scheme::Dark),
    builtin("kanagawa", "Kanagawa", Scheme::Light),
    builtin("matte-black", "Matte Black", Scheme::Dark),
    builtin("nord", "Nord", Scheme::Dark),
    builtin("osaka-jade", "Osaka Jade", Scheme::Dark),
    builtin("ristretto", "Ristretto", Scheme::Dark),
    builtin("rose-pine", "Rose Pine", Scheme::Light),
    builtin("tokyo-night", "Tokyo Night", Scheme::Dark),
];

const fn builtin(slug: &'static str, display_name: &'static str, scheme: Scheme) -> BuiltinTheme {
    BuiltinTheme {
        slug,
        display_name,
        scheme,
    }
}

/// Look up a built-in definition by slug
pub fn builtin_theme(slug: &str) -> Option<&'static BuiltinTheme> {
    BUILTIN_THEMES.iter().find(|t| t.slug == slug)
}

/// Default theme slug used at bootstrap and as the removal fallback
pub const DEFAULT_THEME_SLUG: &str = "tokyo-night";
