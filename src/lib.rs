//! themed - desktop theme daemon
//!
//! Resolves fuzzy theme names, installs community themes from a remote
//! index, and keeps the active theme and background consistent on disk.

pub mod api;
pub mod apply;
pub mod catalog;
pub mod config;
pub mod engine;
pub mod fetch;
pub mod index;
pub mod install;
pub mod preview;
pub mod resolve;
pub mod rotator;
pub mod store;
pub mod theme;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;

pub use config::Config;
use engine::Engine;

/// The themed server instance
pub struct Server {
    config: Config,
    engine: Arc<Engine>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Server {
    /// Create a new server instance
    pub async fn new(config: Config) -> Result<Self> {
        let engine = Engine::open(&config).await?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Ok(Self {
            config,
            engine: Arc::new(engine),
            shutdown_tx,
            shutdown_rx,
        })
    }

    /// Get the engine handle
    pub fn engine(&self) -> Arc<Engine> {
        self.engine.clone()
    }

    /// Build the router
    fn router(&self) -> Router {
        api::router(self.engine.clone())
    }

    /// Run the server until shutdown
    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve(listener).await
    }

    /// Run on an already bound listener
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let local_addr = listener.local_addr()?;
        info!("themed listening on {}", local_addr);

        let router = self.router();
        let mut shutdown_rx = self.shutdown_rx.clone();

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                shutdown_rx.changed().await.ok();
            })
            .await?;

        info!("themed shutdown complete");
        Ok(())
    }

    /// Signal the server to shutdown
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Get the configured bind address
    pub fn bind_addr(&self) -> SocketAddr {
        self.config.bind_addr
    }
}
