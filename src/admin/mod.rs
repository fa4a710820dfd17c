//! Admin API.
//!
//! Served on its own listener so the proxy port stays a pure pass-through.
//!
//! - `GET /admin/status`: version, state, configured algorithm
//! - `GET /admin/backends`: per-backend weight, connections, latency

pub mod handlers;

use axum::{routing::get, Router};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;

use crate::load_balancer::{registry::BackendRegistry, PolicyKind};

#[derive(Clone)]
pub struct AdminState {
    pub registry: Arc<BackendRegistry>,
    pub algorithm: PolicyKind,
}

pub fn router(registry: Arc<BackendRegistry>, algorithm: PolicyKind) -> Router {
    Router::new()
        .route("/admin/status", get(handlers::get_status))
        .route("/admin/backends", get(handlers::get_backends))
        .with_state(AdminState {
            registry,
            algorithm,
        })
}

/// Serve the admin router until `shutdown` fires.
pub async fn serve(
    listener: TcpListener,
    router: Router,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<(), std::io::Error> {
    tracing::info!(address = %listener.local_addr()?, "Admin API listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = shutdown.recv().await;
        })
        .await
}
