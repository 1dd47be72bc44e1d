//! Theme engine errors

use thiserror::Error;

/// Errors surfaced by the theme engine.
///
/// Everything except `Internal` is recoverable at the call boundary and
/// leaves catalog and store state untouched.
#[derive(Debug, Error)]
pub enum ThemeError {
    #[error("no theme matches '{0}'")]
    NotFound(String),

    #[error("'{query}' matches several themes: {}", candidates.join(", "))]
    Ambiguous {
        query: String,
        candidates: Vec<String>,
    },

    #[error("theme '{0}' is built in and cannot be modified")]
    Immutable(String),

    #[error("theme '{0}' is currently active; switch to another theme first")]
    ActiveThemeConflict(String),

    #[error("theme '{0}' is already installed")]
    AlreadyInstalled(String),

    #[error("failed to fetch {url}: {message}")]
    Network { url: String, message: String },

    #[error("invalid theme bundle: {0}")]
    Validation(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ThemeError {
    /// Stable machine-readable name of the error class
    pub fn kind(&self) -> &'static str {
        match self {
            ThemeError::NotFound(_) => "not_found",
            ThemeError::Ambiguous { .. } => "ambiguous_match",
            ThemeError::Immutable(_) => "immutable_theme",
            ThemeError::ActiveThemeConflict(_) => "active_theme_conflict",
            ThemeError::AlreadyInstalled(_) => "already_installed",
            ThemeError::Network { .. } => "network",
            ThemeError::Validation(_) => "validation",
            ThemeError::Internal(_) => "internal",
        }
    }

    /// Wrap an unexpected I/O failure with context
    pub(crate) fn io(context: impl std::fmt::Display, err: std::io::Error) -> Self {
        ThemeError::Internal(format!("{}: {}", context, err))
    }
}
