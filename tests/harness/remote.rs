//! RemoteFixture - fake theme index, bundle and preview host
//!
//! Serves:
//! - `/index.json` - index whose sources point back at this server
//! - `/bundles/dune.zip` - valid bundle wrapped in a top-level directory
//! - `/bundles/neon.zip` - valid flat bundle
//! - `/bundles/broken.zip` - config file but no backgrounds
//! - `/bundles/flaky.zip` - 503 on the first request, valid afterwards
//! - `/bundles/offline.zip` - always 500
//! - `/bundles/stall.zip` - never answers in time
//! - `/previews/neon.png` - preview image

use std::io::{Cursor, Write};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use tokio::task::JoinHandle;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

/// Bytes served as the Neon Rain preview
pub const NEON_PREVIEW: &[u8] = b"\x89PNG\r\n\x1a\nneon-preview";

#[derive(Clone)]
struct FixtureState {
    addr: SocketAddr,
    flaky_hits: Arc<AtomicUsize>,
    bundle_hits: Arc<AtomicUsize>,
    stall_hits: Arc<AtomicUsize>,
}

/// Remote host stand-in running on a random port
pub struct RemoteFixture {
    pub addr: SocketAddr,
    flaky_hits: Arc<AtomicUsize>,
    bundle_hits: Arc<AtomicUsize>,
    stall_hits: Arc<AtomicUsize>,
    _handle: JoinHandle<()>,
}

impl RemoteFixture {
    pub async fn start() -> Result<Self> {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let state = FixtureState {
            addr,
            flaky_hits: Arc::new(AtomicUsize::new(0)),
            bundle_hits: Arc::new(AtomicUsize::new(0)),
            stall_hits: Arc::new(AtomicUsize::new(0)),
        };

        let router = Router::new()
            .route("/index.json", get(index))
            .route("/bundles/{name}", get(bundle))
            .route("/previews/{name}", get(preview))
            .with_state(state.clone());

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router).await {
                eprintln!("Fixture server error: {}", e);
            }
        });

        Ok(Self {
            addr,
            flaky_hits: state.flaky_hits,
            bundle_hits: state.bundle_hits,
            stall_hits: state.stall_hits,
            _handle: handle,
        })
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn index_url(&self) -> String {
        self.url("/index.json")
    }

    /// Requests seen by the flaky bundle route
    pub fn flaky_hits(&self) -> usize {
        self.flaky_hits.load(Ordering::SeqCst)
    }

    /// Requests seen by the stalling bundle route
    pub fn stall_hits(&self) -> usize {
        self.stall_hits.load(Ordering::SeqCst)
    }

    /// Requests seen by all bundle routes
    pub fn bundle_hits(&self) -> usize {
        self.bundle_hits.load(Ordering::SeqCst)
    }
}

async fn index(State(state): State<FixtureState>) -> Response {
    let base = format!("http://{}", state.addr);
    let body = serde_json::json!([
        {
            "name": "Dune Sea",
            "scheme": "Light",
            "source": format!("{}/bundles/dune.zip", base),
        },
        {
            "name": "Neon Rain",
            "scheme": "Dark",
            "github_url": format!("{}/bundles/neon.zip", base),
            "preview_url": format!("{}/previews/neon.png", base),
        },
        {
            "name": "Broken Glass",
            "scheme": "Dark",
            "source": format!("{}/bundles/broken.zip", base),
        },
        {
            "name": "Flaky Fern",
            "scheme": "dark",
            "source": format!("{}/bundles/flaky.zip", base),
        },
        {
            "name": "Offline Orchard",
            "source": format!("{}/bundles/offline.zip", base),
        },
        {
            "name": "Stalled Stream",
            "scheme": "Dark",
            "source": format!("{}/bundles/stall.zip", base),
        },
        {
            "name": "Sourceless Sky",
            "scheme": "Light",
        },
        {
            "name": "Nord",
            "scheme": "Dark",
            "source": format!("{}/bundles/nord.zip", base),
        },
    ]);
    (
        [(header::CONTENT_TYPE, "application/json")],
        body.to_string(),
    )
        .into_response()
}

async fn bundle(State(state): State<FixtureState>, Path(name): Path<String>) -> Response {
    state.bundle_hits.fetch_add(1, Ordering::SeqCst);
    match name.as_str() {
        "dune.zip" => zip_response(&[
            ("dune-sea-main/alacritty.toml", b"[colors]\n"),
            ("dune-sea-main/waybar.css", b"* {}\n"),
            ("dune-sea-main/backgrounds/1-dunes.png", b"\x89PNG1"),
            ("dune-sea-main/backgrounds/2-sky.png", b"\x89PNG2"),
            ("dune-sea-main/backgrounds/3-oasis.png", b"\x89PNG3"),
            ("dune-sea-main/preview.png", b"\x89PNGp"),
        ]),
        "neon.zip" => zip_response(&[
            ("kitty.conf", b"foreground #fff\n"),
            ("backgrounds/neon.jpg", b"\xff\xd8neon"),
        ]),
        "broken.zip" => zip_response(&[
            ("broken-glass/alacritty.toml", b"[colors]\n"),
            ("broken-glass/README.md", b"no backgrounds here\n"),
        ]),
        "flaky.zip" => {
            if state.flaky_hits.fetch_add(1, Ordering::SeqCst) == 0 {
                return StatusCode::SERVICE_UNAVAILABLE.into_response();
            }
            zip_response(&[
                ("hyprland.conf", b"general {}\n"),
                ("backgrounds/fern.webp", b"RIFFfern"),
            ])
        }
        "offline.zip" => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
        "stall.zip" => {
            state.stall_hits.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(60)).await;
            StatusCode::GATEWAY_TIMEOUT.into_response()
        }
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn preview(Path(name): Path<String>) -> Response {
    match name.as_str() {
        "neon.png" => ([(header::CONTENT_TYPE, "image/png")], NEON_PREVIEW).into_response(),
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

fn zip_response(files: &[(&str, &[u8])]) -> Response {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();
    for (name, data) in files {
        if writer.start_file(*name, options).is_err() || writer.write_all(data).is_err() {
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    }
    match writer.finish() {
        Ok(cursor) => (
            [(header::CONTENT_TYPE, "application/zip")],
            cursor.into_inner(),
        )
            .into_response(),
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
}
