//! Theme bundle archives
//!
//! Maps a source reference to a downloadable zip, unpacks it into a staging
//! directory and checks that the result looks like a theme. Extraction and
//! validation are blocking and run on the blocking pool.

use std::fs;
use std::io::{self, Cursor, Read};
use std::path::{Component, Path, PathBuf};

use tracing::debug;
use zip::ZipArchive;

use crate::store::{is_image, BACKGROUNDS_DIR};
use crate::theme::ThemeError;

/// Config files that mark a directory as a theme
pub const RECOGNIZED_CONFIGS: &[&str] = &[
    "alacritty.toml",
    "btop.theme",
    "chromium.theme",
    "ghostty.conf",
    "hyprland.conf",
    "hyprlock.conf",
    "icons.theme",
    "kitty.conf",
    "mako.ini",
    "neovim.lua",
    "swayosd.css",
    "walker.css",
    "waybar.css",
];

/// Turn a source reference into the URL of a zip archive.
///
/// GitHub repository URLs map to the archive of the default branch; direct
/// `.zip` URLs are used as-is.
pub fn archive_url(source: &str) -> Result<String, ThemeError> {
    let source = source.trim();
    let without_query = source.split(['?', '#']).next().unwrap_or(source);
    if without_query.to_lowercase().ends_with(".zip") {
        return Ok(source.to_string());
    }

    for prefix in ["https://github.com/", "http://github.com/"] {
        let Some(rest) = source.strip_prefix(prefix) else {
            continue;
        };
        let mut parts = rest.trim_end_matches('/').split('/');
        let (Some(owner), Some(repo)) = (parts.next(), parts.next()) else {
            break;
        };
        let repo = repo.strip_suffix(".git").unwrap_or(repo);
        if owner.is_empty() || repo.is_empty() {
            break;
        }
        return Ok(format!("https://github.com/{}/{}/archive/HEAD.zip", owner, repo));
    }

    Err(ThemeError::Validation(format!(
        "unsupported theme source '{}'",
        source
    )))
}

/// Unpack a zip archive into `dest`, returning the number of files written.
///
/// A single top-level directory shared by every entry is stripped. Entries
/// whose path would escape `dest`, entries that collide with each other and
/// archives unpacking to more than `max_bytes` fail the whole extraction.
pub fn extract(data: &[u8], dest: &Path, max_bytes: u64) -> Result<usize, ThemeError> {
    let mut archive = ZipArchive::new(Cursor::new(data))
        .map_err(|e| ThemeError::Validation(format!("invalid zip archive: {}", e)))?;

    let mut entries = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let file = archive
            .by_index(i)
            .map_err(|e| ThemeError::Validation(format!("invalid zip entry: {}", e)))?;
        let Some(path) = file.enclosed_name().map(|p| p.to_path_buf()) else {
            return Err(ThemeError::Validation(format!(
                "archive entry '{}' escapes the theme directory",
                file.name()
            )));
        };
        entries.push((i, path, file.is_dir()));
    }

    let strip = shared_root(&entries);
    if let Some(root) = &strip {
        debug!("Stripping top-level directory '{}'", root);
    }

    let mut written = 0;
    let mut remaining = max_bytes;
    for (i, path, is_dir) in entries {
        let relative = match &strip {
            Some(_) => path.components().skip(1).collect::<PathBuf>(),
            None => path,
        };
        if relative.as_os_str().is_empty() {
            continue;
        }
        let target = dest.join(&relative);

        if is_dir {
            fs::create_dir_all(&target).map_err(|e| conflict(&relative, e))?;
            continue;
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| conflict(&relative, e))?;
        }

        let file = archive
            .by_index(i)
            .map_err(|e| ThemeError::Validation(format!("invalid zip entry: {}", e)))?;
        let mut out = fs::File::create(&target).map_err(|e| conflict(&relative, e))?;
        let copied = io::copy(&mut file.take(remaining + 1), &mut out).map_err(|e| {
            ThemeError::Validation(format!("corrupt archive entry '{}': {}", relative.display(), e))
        })?;
        if copied > remaining {
            return Err(ThemeError::Validation(format!(
                "bundle unpacks to more than {} bytes",
                max_bytes
            )));
        }
        remaining -= copied;
        written += 1;
    }

    debug!(
        "Extracted {} files ({} bytes) into {}",
        written,
        max_bytes - remaining,
        dest.display()
    );
    Ok(written)
}

/// Staging is private to the install, so a failed write means the archive
/// itself is inconsistent (e.g. a file and a directory at the same path)
fn conflict(entry: &Path, err: io::Error) -> ThemeError {
    ThemeError::Validation(format!(
        "archive entry '{}' cannot be unpacked: {}",
        entry.display(),
        err
    ))
}

/// Name of the top-level directory every entry lives under, if there is one
fn shared_root(entries: &[(usize, PathBuf, bool)]) -> Option<String> {
    let mut root: Option<String> = None;
    for (_, path, is_dir) in entries {
        let mut components = path.components();
        let Some(Component::Normal(first)) = components.next() else {
            return None;
        };
        // A file sitting at the top level means there is no wrapper directory
        if !is_dir && components.next().is_none() {
            return None;
        }
        let first = first.to_string_lossy();
        match &root {
            Some(r) if *r != first => return None,
            Some(_) => {}
            None => root = Some(first.into_owned()),
        }
    }
    root
}

/// Check that `dir` holds a usable theme
pub fn validate(dir: &Path) -> Result<(), ThemeError> {
    let backgrounds = dir.join(BACKGROUNDS_DIR);
    let images = fs::read_dir(&backgrounds)
        .map(|entries| {
            entries
                .filter_map(Result::ok)
                .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
                .filter(|e| is_image(&e.path()))
                .count()
        })
        .unwrap_or(0);
    if images == 0 {
        return Err(ThemeError::Validation(
            "bundle has no images under backgrounds/".to_string(),
        ));
    }

    if !RECOGNIZED_CONFIGS.iter().any(|name| dir.join(name).is_file()) {
        return Err(ThemeError::Validation(
            "bundle contains no recognized theme config file".to_string(),
        ));
    }

    debug!("Bundle at {} has {} backgrounds", dir.display(), images);
    Ok(())
}
