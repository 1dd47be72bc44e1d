//! Daemon configuration
//!
//! Layered with figment: built-in defaults, then an optional TOML file, then
//! `THEMED_*` environment variables (`__` separates nested keys, e.g.
//! `THEMED_APPLY__THEME_COMMAND`). Command-line flags are applied on top by
//! the binary.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::apply::ApplyConfig;
use crate::fetch::FetchConfig;
use crate::theme::{RemovePolicy, DEFAULT_THEME_SLUG};

/// Environment variable prefix
pub const ENV_PREFIX: &str = "THEMED_";

/// Server configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub bind_addr: SocketAddr,
    /// Mutable theme state (installed extras and active pointers)
    pub state_dir: PathBuf,
    /// Read-only built-in theme directories
    pub builtin_dir: PathBuf,
    /// Downloaded previews
    pub cache_dir: PathBuf,
    /// Remote theme index (http(s):// or file://)
    pub index_url: Option<String>,
    pub index_ttl_secs: u64,
    pub fetch_timeout_secs: u64,
    pub retry_delay_ms: u64,
    pub max_bundle_bytes: u64,
    /// Activated at bootstrap and when the active theme is removed
    pub default_theme: String,
    pub remove_policy: RemovePolicy,
    pub apply: ApplyConfig,
}

impl Default for Config {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        let builtin_dir = std::env::var_os("OMARCHY_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| home.join(".local/share/omarchy"))
            .join("themes");
        let cache_dir = dirs::cache_dir()
            .unwrap_or_else(|| home.join(".cache"))
            .join("themed");

        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8765)),
            state_dir: home.join(".config/omarchy"),
            builtin_dir,
            cache_dir,
            index_url: None,
            index_ttl_secs: 3600,
            fetch_timeout_secs: 30,
            retry_delay_ms: 500,
            max_bundle_bytes: 64 * 1024 * 1024,
            default_theme: DEFAULT_THEME_SLUG.to_string(),
            remove_policy: RemovePolicy::default(),
            apply: ApplyConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration.
    ///
    /// An explicit `path` must exist; otherwise the per-user config file is
    /// used when present.
    pub fn load(path: Option<&Path>) -> Result<Self, figment::Error> {
        let file = match path {
            Some(path) if !path.is_file() => {
                return Err(figment::Error::from(format!(
                    "config file {} not found",
                    path.display()
                )));
            }
            Some(path) => Some(path.to_path_buf()),
            None => default_config_file().filter(|p| p.is_file()),
        };
        Self::figment(file.as_deref()).extract()
    }

    /// Provider stack without reading anything yet
    pub fn figment(file: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(file) = file {
            figment = figment.merge(Toml::file(file));
        }
        figment.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    pub fn fetch(&self) -> FetchConfig {
        FetchConfig {
            timeout: Duration::from_secs(self.fetch_timeout_secs),
            retry_delay: Duration::from_millis(self.retry_delay_ms),
            max_bytes: self.max_bundle_bytes,
        }
    }

    pub fn index_ttl(&self) -> Duration {
        Duration::from_secs(self.index_ttl_secs)
    }
}

/// `$XDG_CONFIG_HOME/themed/config.toml`
pub fn default_config_file() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("themed").join("config.toml"))
}
