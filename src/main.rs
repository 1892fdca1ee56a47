//! CMS request gate.
//!
//! Serves the CMS admin API behind three gates:
//!
//! ```text
//!     Client Request
//!     ──────────────▶ request id ─▶ trace ─▶ timeout / body limit
//!                                                 │
//!                                                 ▼
//!                     ┌──────────────┐   ┌──────────────────┐   ┌────────────┐
//!                     │  rate limit  │──▶│  authorization   │──▶│    CSRF    │──▶ handler
//!                     │ (per profile)│   │ (role/permission)│   │ (mutations)│
//!                     └──────┬───────┘   └──────────────────┘   └─────┬──────┘
//!                            │                                        │
//!                            ▼                                        ▼
//!                     RateLimitStore ◀──── sweepers ────▶ CsrfTokenStore
//! ```

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;

use cms_gate::config::{load_config, GatewayConfig};
use cms_gate::lifecycle::{signals, Shutdown};
use cms_gate::observability::{logging, metrics};
use cms_gate::HttpServer;

#[derive(Parser)]
#[command(name = "cms-gate", version, about = "Request gate for the CMS admin API")]
struct Args {
    /// Path to a TOML config file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => GatewayConfig::default(),
    };

    logging::init(&config.observability);
    tracing::info!("cms-gate v{} starting", env!("CARGO_PKG_VERSION"));

    tracing::info!(
        config = ?args.config,
        bind_address = %config.listener.bind_address,
        request_timeout_secs = config.listener.request_timeout_secs,
        rate_limit_enabled = config.rate_limit.enabled,
        sessions = config.sessions.len(),
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

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    let local_addr = listener.local_addr()?;
    tracing::info!(address = %local_addr, "Listening for connections");

    let shutdown = Shutdown::new();
    signals::spawn_signal_handler(shutdown.clone());

    let server = HttpServer::new(config);
    server.run(listener, &shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
