//! Background rotation for the active theme
//!
//! The cursor is tagged with the store's activation generation. Any
//! activation (a different theme, or the same one again) invalidates it, so
//! rotation always restarts from the background shown on activation.

use std::path::PathBuf;

use parking_lot::Mutex;
use tracing::debug;

use crate::store::StoreWriter;
use crate::theme::ThemeError;

#[derive(Debug, Clone, Copy, Default)]
struct Cursor {
    generation: u64,
    index: usize,
}

/// Per-activation background cursor
#[derive(Debug, Default)]
pub struct Rotator {
    cursor: Mutex<Cursor>,
}

impl Rotator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Link the first background of the freshly activated theme.
    ///
    /// Returns `None` when the theme has no backgrounds; the background link
    /// is then removed so it never points into another theme.
    pub async fn show_first(
        &self,
        writer: &mut StoreWriter<'_>,
    ) -> Result<Option<PathBuf>, ThemeError> {
        let (generation, backgrounds) = active_backgrounds(writer).await?;
        let Some(first) = backgrounds.into_iter().next() else {
            writer.clear_background().await?;
            *self.cursor.lock() = Cursor {
                generation,
                index: 0,
            };
            return Ok(None);
        };

        writer.set_background(&first).await?;
        *self.cursor.lock() = Cursor {
            generation,
            index: 0,
        };
        Ok(Some(first))
    }

    /// Advance to the next background of the active theme, wrapping around
    pub async fn next_background(
        &self,
        writer: &mut StoreWriter<'_>,
    ) -> Result<PathBuf, ThemeError> {
        let (generation, backgrounds) = active_backgrounds(writer).await?;
        if backgrounds.is_empty() {
            return Err(ThemeError::NotFound(
                "backgrounds for the active theme".to_string(),
            ));
        }

        let current = *self.cursor.lock();
        let index = if current.generation == generation {
            (current.index + 1) % backgrounds.len()
        } else {
            // Stale cursor: the activation background was index 0
            1 % backgrounds.len()
        };

        let image = backgrounds[index].clone();
        writer.set_background(&image).await?;
        *self.cursor.lock() = Cursor { generation, index };

        debug!("Background {}/{}: {}", index + 1, backgrounds.len(), image.display());
        Ok(image)
    }
}

async fn active_backgrounds(
    writer: &StoreWriter<'_>,
) -> Result<(u64, Vec<PathBuf>), ThemeError> {
    let store = writer.store();
    let active = store.active();
    let slug = active
        .slug
        .ok_or_else(|| ThemeError::NotFound("active theme".to_string()))?;
    let dir = store
        .load(&slug)
        .await?
        .ok_or_else(|| ThemeError::NotFound(slug.clone()))?;
    Ok((active.generation, dir.backgrounds))
}
