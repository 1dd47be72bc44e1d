//! themed - desktop theme daemon

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use themed::{Config, Server};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Desktop theme catalog and lifecycle daemon
#[derive(Parser, Debug)]
#[command(name = "themed", version, about = "Serve desktop theme operations over HTTP")]
struct Args {
    /// Config file (default: $XDG_CONFIG_HOME/themed/config.toml if present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to listen on
    #[arg(long)]
    bind: Option<SocketAddr>,

    /// Directory holding installed themes and the active pointers
    #[arg(long)]
    state_dir: Option<PathBuf>,

    /// Directory holding the built-in themes
    #[arg(long)]
    builtin_dir: Option<PathBuf>,

    /// Remote theme index URL
    #[arg(long)]
    index_url: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "themed=info,tower_http=debug".into());
    let registry = tracing_subscriber::registry().with(filter);
    if args.log_json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    let mut config = Config::load(args.config.as_deref())?;
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }
    if let Some(dir) = args.state_dir {
        config.state_dir = dir;
    }
    if let Some(dir) = args.builtin_dir {
        config.builtin_dir = dir;
    }
    if let Some(url) = args.index_url {
        config.index_url = Some(url);
    }

    // Create and run server
    let server = Server::new(config).await?;
    server.run().await?;

    Ok(())
}
