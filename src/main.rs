//! mini-gateway
//!
//! A path-prefix reverse proxy built with Tokio, Hyper and Axum.
//!
//! # Architecture Overview
//!
//! ```text
//!                          ┌───────────────────────────────────────────────────┐
//!                          │                   MINI-GATEWAY                    │
//!                          │                                                   │
//!     Client Request       │  ┌─────────┐    ┌─────────┐    ┌──────────────┐   │
//!     ─────────────────────┼─▶│   net   │───▶│  http   │───▶│   routing    │   │
//!                          │  │listener │    │ server  │    │ route table  │   │
//!                          │  └─────────┘    └─────────┘    │ + rewrite    │   │
//!                          │                                └──────┬───────┘   │
//!                          │                                       ▼           │
//!                          │                               ┌──────────────┐    │
//!                          │                               │  upstream    │    │
//!                          │                               │ dispatcher   │    │
//!                          │                               └──────┬───────┘    │
//!                          │                                       ▼           │
//!     Client Response      │  ┌──────────────────┐         ┌──────────────┐    │
//!     ◀────────────────────┼──│ relay / splice   │◀────────│ pool / dedi- │◀───┼──── Upstream
//!                          │  └──────────────────┘         │ cated conn   │    │
//!                          │                               └──────────────┘    │
//!                          │  ┌─────────────────────────────────────────────┐  │
//!                          │  │ config · lifecycle · health · observability │  │
//!                          │  └─────────────────────────────────────────────┘  │
//!                          └───────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;

use mini_gateway::config::load_startup_config;
use mini_gateway::lifecycle::{signals, startup};
use mini_gateway::observability::init_logging;
use mini_gateway::Shutdown;

#[derive(Parser)]
#[command(name = "mini-gateway")]
#[command(about = "Path-prefix reverse proxy for HTTP and WebSocket upstreams", long_about = None)]
struct Args {
    /// TOML configuration file (defaults to $GATEWAY_CONFIG).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listener bind address.
    #[arg(short, long)]
    bind: Option<String>,

    /// Validate the configuration and exit.
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = load_startup_config(args.config.as_deref())?;
    if let Some(bind) = args.bind {
        config.listener.bind_address = bind;
    }

    if args.check {
        println!("configuration ok: {} route(s)", config.routes.len());
        return Ok(());
    }

    init_logging(&config.observability)?;
    tracing::info!("mini-gateway v{} starting", env!("CARGO_PKG_VERSION"));

    let shutdown = Shutdown::new();
    signals::spawn_signal_forwarder(shutdown.clone());

    startup::run(config, &shutdown).await?;
    Ok(())
}
