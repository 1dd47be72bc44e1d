//! ThemedTest and BinaryServer - end-to-end server harnesses
//!
//! Each instance gets its own temp directory holding the built-in themes,
//! the state directory and the preview cache, so tests never share state.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use reqwest::Client;
use tempfile::TempDir;
use themed::engine::Engine;
use themed::{Config, Server};
use tokio::task::JoinHandle;

/// Built-in themes given real directories, with their background file names
const BUILTIN_DIRS: &[(&str, &[&str])] = &[
    ("tokyo-night", &["1-city.png", "2-neon.png", "3-rain.jpg"]),
    ("kanagawa", &["wave.png"]),
    ("osaka-jade", &["jade.png", "temple.png"]),
    ("nord", &["fjord.png"]),
    ("catppuccin", &["mocha.png"]),
];

/// Write the built-in theme directories under `dir`
pub fn write_builtins(dir: &Path) -> Result<()> {
    for (slug, backgrounds) in BUILTIN_DIRS {
        let theme = dir.join(slug);
        std::fs::create_dir_all(theme.join("backgrounds"))?;
        std::fs::write(theme.join("alacritty.toml"), "[colors]\n")?;
        for bg in *backgrounds {
            std::fs::write(theme.join("backgrounds").join(bg), format!("image {}", bg))?;
        }
    }
    Ok(())
}

/// Test harness that runs a themed server in-process on a random port
pub struct ThemedTest {
    pub addr: SocketAddr,
    pub client: Client,
    pub config: Config,
    server: Arc<Server>,
    temp_dir: TempDir,
    _handle: JoinHandle<()>,
}

impl ThemedTest {
    /// Start with no remote index configured
    pub async fn start() -> Result<Self> {
        Self::start_with(|_| {}).await
    }

    /// Start with the index pointing at `remote`
    pub async fn with_remote(remote: &super::RemoteFixture) -> Result<Self> {
        let index_url = remote.index_url();
        Self::start_with(move |config| config.index_url = Some(index_url)).await
    }

    /// Start a new test server, adjusting the config first
    pub async fn start_with(customize: impl FnOnce(&mut Config)) -> Result<Self> {
        let temp_dir = TempDir::new()?;
        write_builtins(&temp_dir.path().join("builtin"))?;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let mut config = Config {
            bind_addr: addr,
            state_dir: temp_dir.path().join("state"),
            builtin_dir: temp_dir.path().join("builtin"),
            cache_dir: temp_dir.path().join("cache"),
            index_url: None,
            fetch_timeout_secs: 5,
            retry_delay_ms: 10,
            ..Config::default()
        };
        customize(&mut config);

        let server = Arc::new(Server::new(config.clone()).await?);
        let server_clone = server.clone();

        // Spawn the server in a background task
        let handle = tokio::spawn(async move {
            if let Err(e) = server_clone.serve(listener).await {
                eprintln!("Server error: {}", e);
            }
        });

        let client = Client::builder().timeout(Duration::from_secs(10)).build()?;

        // Poll until server is ready (max 2 seconds)
        let mut ready = false;
        for _ in 0..20 {
            if client
                .get(format!("http://{}/health", addr))
                .send()
                .await
                .is_ok()
            {
                ready = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        if !ready {
            panic!("Server failed to start within 2 seconds");
        }

        Ok(Self {
            addr,
            client,
            config,
            server,
            temp_dir,
            _handle: handle,
        })
    }

    /// Get the base URL for the server
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn state_dir(&self) -> PathBuf {
        self.temp_dir.path().join("state")
    }

    /// Make a GET request
    pub async fn get(&self, path: &str) -> Result<reqwest::Response> {
        Ok(self
            .client
            .get(format!("{}{}", self.base_url(), path))
            .send()
            .await?)
    }

    /// Make a POST request with JSON body
    pub async fn post<T: serde::Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<reqwest::Response> {
        Ok(self
            .client
            .post(format!("{}{}", self.base_url(), path))
            .json(body)
            .send()
            .await?)
    }

    /// Make a PUT request with JSON body
    pub async fn put<T: serde::Serialize + ?Sized>(
        &self,
        path: &str,
        body: &T,
    ) -> Result<reqwest::Response> {
        Ok(self
            .client
            .put(format!("{}{}", self.base_url(), path))
            .json(body)
            .send()
            .await?)
    }

    /// Make a DELETE request
    pub async fn delete(&self, path: &str) -> Result<reqwest::Response> {
        Ok(self
            .client
            .delete(format!("{}{}", self.base_url(), path))
            .send()
            .await?)
    }

    /// GET and parse the JSON body
    pub async fn get_json(&self, path: &str) -> Result<serde_json::Value> {
        Ok(self.get(path).await?.json().await?)
    }

    /// Slugs returned by `GET /themes` with the given query string
    pub async fn slugs(&self, query: &str) -> Result<Vec<String>> {
        let body = self.get_json(&format!("/themes?{}", query)).await?;
        Ok(body["themes"]
            .as_array()
            .map(|themes| {
                themes
                    .iter()
                    .filter_map(|t| t["slug"].as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default())
    }

    /// Set the active theme, asserting success
    pub async fn set_theme(&self, name: &str) -> Result<serde_json::Value> {
        let resp = self
            .put("/themes/current", &serde_json::json!({ "name": name }))
            .await?;
        anyhow::ensure!(resp.status() == 200, "set_theme({}) returned {}", name, resp.status());
        Ok(resp.json().await?)
    }

    /// Entries in the state directory's `themes/`
    pub fn extra_dirs(&self) -> Vec<String> {
        list_dir(&self.state_dir().join("themes"))
    }

    /// Entries left in the staging directory
    pub fn staging_entries(&self) -> Vec<String> {
        list_dir(&self.state_dir().join(".staging"))
    }

    /// Engine behind the server, for driving operations directly
    pub fn engine(&self) -> Arc<Engine> {
        self.server.engine()
    }

    /// Shutdown the server gracefully
    pub fn shutdown(&self) {
        self.server.shutdown();
    }
}

fn list_dir(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().to_string())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}

/// Test harness that spawns the actual themed binary on a random port
pub struct BinaryServer {
    pub addr: SocketAddr,
    pub client: Client,
    child: Child,
    _temp_dir: TempDir,
}

impl BinaryServer {
    pub async fn start(index_url: Option<&str>) -> Result<Self> {
        let temp_dir = TempDir::new()?;
        let builtin = temp_dir.path().join("builtin");
        write_builtins(&builtin)?;

        // Find a random available port
        let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
        let addr = listener.local_addr()?;
        drop(listener);

        let mut cmd = Command::new(env!("CARGO_BIN_EXE_themed"));
        cmd.arg("--bind")
            .arg(addr.to_string())
            .arg("--state-dir")
            .arg(temp_dir.path().join("state"))
            .arg("--builtin-dir")
            .arg(&builtin)
            .arg("--log-json")
            .env("XDG_CONFIG_HOME", temp_dir.path().join("config"))
            .env("XDG_CACHE_HOME", temp_dir.path().join("cache"))
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        if let Some(url) = index_url {
            cmd.arg("--index-url").arg(url);
        }
        let child = cmd
            .spawn()
            .map_err(|e| anyhow::anyhow!("Failed to spawn themed binary: {}", e))?;

        let client = Client::builder().timeout(Duration::from_secs(5)).build()?;

        // Poll until server is ready (max 5 seconds)
        let mut ready = false;
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            if client
                .get(format!("http://{}/health", addr))
                .send()
                .await
                .is_ok()
            {
                ready = true;
                break;
            }
        }

        let mut server = Self {
            addr,
            client,
            child,
            _temp_dir: temp_dir,
        };
        if !ready {
            server.kill();
            anyhow::bail!("themed binary failed to start within 5 seconds");
        }
        Ok(server)
    }

    pub async fn get(&self, path: &str) -> Result<reqwest::Response> {
        Ok(self
            .client
            .get(format!("http://{}{}", self.addr, path))
            .send()
            .await?)
    }

    fn kill(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

impl Drop for BinaryServer {
    fn drop(&mut self) {
        self.kill();
    }
}
