//! Staging areas for fetched theme bundles

use std::path::{Path, PathBuf};

use tracing::debug;

/// Isolated, uncommitted directory holding a theme bundle.
///
/// The directory is deleted when the guard is dropped unless it has been
/// committed into the store, so an error or a cancelled request never
/// leaves a partial bundle behind.
#[derive(Debug)]
pub struct StagingArea {
    path: PathBuf,
    armed: bool,
}

impl StagingArea {
    pub(super) fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Keep the directory (it has been moved into the store)
    pub(super) fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for StagingArea {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match std::fs::remove_dir_all(&self.path) {
            Ok(()) => debug!("Discarded staging area {}", self.path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => debug!("Failed to discard {}: {}", self.path.display(), e),
        }
    }
}
