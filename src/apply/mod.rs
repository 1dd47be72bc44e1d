//! Desktop apply hook
//!
//! After the active theme or background changes, configured commands tell
//! the desktop to reload. Failures are reported as warnings and never undo
//! the state change.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::{debug, warn};

/// Commands run after state changes, as argv lists
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplyConfig {
    /// Run after activation with the slug and theme directory appended
    #[serde(default)]
    pub theme_command: Option<Vec<String>>,
    /// Run after a background change with the image path appended
    #[serde(default)]
    pub background_command: Option<Vec<String>>,
}

/// Runs the configured apply commands
#[derive(Debug, Clone)]
pub struct Applier {
    config: ApplyConfig,
    env: Vec<(String, OsString)>,
    workdir: Option<PathBuf>,
}

impl Applier {
    pub fn new(config: ApplyConfig) -> Self {
        Self {
            config,
            env: session_env(),
            workdir: dirs::home_dir().filter(|h| h.is_dir()),
        }
    }

    /// Reload the desktop for a newly activated theme
    pub async fn apply_theme(&self, slug: &str, dir: &Path) -> Option<String> {
        let argv = self.config.theme_command.as_ref()?;
        self.run(argv, &[OsString::from(slug), dir.as_os_str().to_owned()])
            .await
    }

    /// Show a new background image
    pub async fn apply_background(&self, image: &Path) -> Option<String> {
        let argv = self.config.background_command.as_ref()?;
        self.run(argv, &[image.as_os_str().to_owned()]).await
    }

    async fn run(&self, argv: &[String], extra: &[OsString]) -> Option<String> {
        let (program, args) = argv.split_first()?;

        let mut cmd = Command::new(program);
        cmd.args(args)
            .args(extra)
            .envs(self.env.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        if let Some(dir) = &self.workdir {
            cmd.current_dir(dir);
        }

        debug!("Running apply command {:?}", argv);
        let warning = match cmd.output().await {
            Ok(output) if output.status.success() => return None,
            Ok(output) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                format!(
                    "apply command '{}' exited with {}: {}",
                    program,
                    output.status,
                    stderr.trim()
                )
            }
            Err(e) => format!("apply command '{}' could not run: {}", program, e),
        };
        warn!("{}", warning);
        Some(warning)
    }
}

/// Wayland session variables to add when the daemon runs outside a session
fn session_env() -> Vec<(String, OsString)> {
    let Some(uid) = user_id() else {
        return Vec::new();
    };
    let runtime = format!("/run/user/{}", uid);
    let defaults = [
        ("XDG_RUNTIME_DIR", runtime.clone()),
        ("WAYLAND_DISPLAY", "wayland-1".to_string()),
        ("DBUS_SESSION_BUS_ADDRESS", format!("unix:path={}/bus", runtime)),
    ];

    defaults
        .into_iter()
        .filter(|(key, _)| std::env::var_os(key).is_none())
        .map(|(key, value)| (key.to_string(), OsString::from(value)))
        .collect()
}

#[cfg(unix)]
fn user_id() -> Option<u32> {
    use std::os::unix::fs::MetadataExt;
    let home = dirs::home_dir()?;
    std::fs::metadata(home).ok().map(|m| m.uid())
}

#[cfg(not(unix))]
fn user_id() -> Option<u32> {
    None
}
