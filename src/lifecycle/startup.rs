//! Startup sequence.
//!
//! Resolve configuration (file, then command line overrides), validate it,
//! build the server, bind listeners and serve until shutdown.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tokio::net::TcpListener;

use crate::admin;
use crate::config::loader::{load_backends, parse_config};
use crate::config::validation::validate_config;
use crate::config::{ConfigError, LbConfig, ValidationError};
use crate::http::LbServer;
use crate::lifecycle::Shutdown;
use crate::load_balancer::PolicyKind;
use crate::observability::metrics;

/// Backend list read when neither a config file nor a backend file is given.
pub const DEFAULT_BACKENDS_FILE: &str = "servers.json";

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("invalid backend pool: {0}")]
    Registry(#[from] ValidationError),

    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },

    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),
}

/// Command line values that take precedence over the config file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub backends: Option<PathBuf>,
    pub algorithm: Option<PolicyKind>,
    pub listen: Option<String>,
}

/// Build the effective configuration and validate it.
pub fn resolve_config(
    config_path: Option<&Path>,
    overrides: Overrides,
) -> Result<LbConfig, ConfigError> {
    let mut config = match config_path {
        Some(path) => parse_config(path)?,
        None => LbConfig::default(),
    };

    let backends_path = match (overrides.backends, config_path) {
        (Some(path), _) => Some(path),
        (None, None) => Some(PathBuf::from(DEFAULT_BACKENDS_FILE)),
        (None, Some(_)) => None,
    };
    if let Some(path) = backends_path {
        config.backends = load_backends(&path)?;
    }
    if let Some(algorithm) = overrides.algorithm {
        config.algorithm = algorithm;
    }
    if let Some(listen) = overrides.listen {
        config.listener.bind_address = listen;
    }

    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

async fn bind(address: &str) -> Result<TcpListener, StartupError> {
    TcpListener::bind(address)
        .await
        .map_err(|source| StartupError::Bind {
            address: address.to_string(),
            source,
        })
}

/// Start every listener and serve until `shutdown` fires.
pub async fn run(config: LbConfig, shutdown: &Shutdown) -> Result<(), StartupError> {
    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let server = LbServer::new(&config)?;

    if config.admin.enabled {
        let listener = bind(&config.admin.bind_address).await?;
        let router = admin::router(server.registry(), config.algorithm);
        let admin_shutdown = shutdown.subscribe();
        tokio::spawn(async move {
            if let Err(e) = admin::serve(listener, router, admin_shutdown).await {
                tracing::error!(error = %e, "Admin API stopped");
            }
        });
    }

    let listener = bind(&config.listener.bind_address).await?;
    tracing::info!(
        address = %config.listener.bind_address,
        algorithm = %config.algorithm,
        "Load balancer running"
    );

    server
        .run(listener, shutdown.subscribe())
        .await
        .map_err(StartupError::Serve)
}
