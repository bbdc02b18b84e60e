//! Accelerating reverse proxy.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client ──▶ request id / trace / timeout ──▶ send_data middleware ──▶ proxy_handler
//!                                                                              │
//!                                           upload route? ──▶ upload interceptor ──▶ storage
//!                                                                              │
//!     Client ◀── file / zip entry / blob ◀── hijack? ◀──────────────── upstream app
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use accel_proxy::config::loader::load_config;
use accel_proxy::lifecycle::{signals, startup, Shutdown};
use accel_proxy::observability::{logging, metrics};
use accel_proxy::{HttpServer, ProxyConfig};

#[derive(Parser)]
#[command(name = "accel-proxy", version, about = "Accelerating reverse proxy")]
struct Cli {
    /// TOML configuration file; built-in defaults when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ProxyConfig::default(),
    };

    logging::init(&config.observability);
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "accel-proxy starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        upstream = %config.upstream.address,
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let signer = startup::claims_signer(&config.uploads)?;

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    tokio::spawn(async move {
        signals::wait_for_shutdown_signal().await;
        shutdown.trigger();
    });

    HttpServer::new(config, signer)?
        .run(listener, server_shutdown)
        .await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
