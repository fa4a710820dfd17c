//! HTTP load balancer (v1)
//!
//! # Architecture Overview
//!
//! ```text
//!                         ┌──────────────────────────────────────────────┐
//!                         │                 LOAD BALANCER                │
//!     Client Request      │  ┌─────────┐    ┌────────────┐               │
//!     ────────────────────┼─▶│  http   │───▶│ dispatcher │               │
//!                         │  │ server  │    └─────┬──────┘               │
//!                         │  └─────────┘          │ select / release     │
//!                         │                       ▼                      │
//!                         │               ┌──────────────┐               │
//!                         │               │   policy +   │               │
//!                         │               │   registry   │               │
//!                         │               └──────┬───────┘               │
//!                         │                      │ forward               │
//!     Client Response     │  ┌─────────┐   ┌─────▼──────┐                │
//!     ◀───────────────────┼──│dispatch │◀──│ transport  │◀───────────────┼──── Backend
//!                         │  └─────────┘   └────────────┘                │
//!                         └──────────────────────────────────────────────┘
//! ```

use clap::Parser;
use std::path::PathBuf;

use lb_proxy::lifecycle::{signals, startup, Shutdown};
use lb_proxy::load_balancer::PolicyKind;
use lb_proxy::observability::logging;

#[derive(Parser)]
#[command(name = "lb-proxy")]
#[command(about = "HTTP load balancer over a static backend pool", long_about = None)]
struct Cli {
    /// Configuration file (TOML, or JSON with a .json extension)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// JSON array of backends; defaults to servers.json when no config file is given
    #[arg(short, long)]
    backends: Option<PathBuf>,

    /// Load balancer algorithm (random, leastconn, weightrand, leasttime, dynamic, dynamic2)
    #[arg(short, long)]
    algorithm: Option<PolicyKind>,

    /// Listen address, e.g. 0.0.0.0:3000
    #[arg(short, long)]
    listen: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    logging::init(logging::DEFAULT_FILTER)?;

    tracing::info!("lb-proxy v{} starting", env!("CARGO_PKG_VERSION"));

    let config = startup::resolve_config(
        cli.config.as_deref(),
        startup::Overrides {
            backends: cli.backends,
            algorithm: cli.algorithm,
            listen: cli.listen,
        },
    )?;

    tracing::info!(
        bind_address = %config.listener.bind_address,
        algorithm = %config.algorithm,
        backends = config.backends.len(),
        "Configuration loaded"
    );

    let shutdown = Shutdown::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        signals::wait_for_shutdown().await;
        trigger.trigger();
    });

    startup::run(config, &shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
