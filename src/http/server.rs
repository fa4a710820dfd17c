//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Build the registry, policy and dispatcher from configuration
//! - Create Axum Router that proxies every path and method
//! - Wire up middleware (request ID, tracing)
//! - Serve until the shutdown signal fires

use axum::{
    body::Body,
    extract::State,
    http::Request,
    response::Response,
    routing::any,
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower::ServiceBuilder;
use tower_http::{
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

use crate::config::{LbConfig, ValidationError};
use crate::http::dispatcher::RequestDispatcher;
use crate::http::transport::HyperTransport;
use crate::load_balancer::{registry::BackendRegistry, ThreadRandom};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<RequestDispatcher<HyperTransport>>,
}

/// HTTP server for the load balancer.
pub struct LbServer {
    router: Router,
    dispatcher: Arc<RequestDispatcher<HyperTransport>>,
}

impl LbServer {
    /// Create a new server from a validated configuration.
    ///
    /// Fails only if the backend pool cannot be built.
    pub fn new(config: &LbConfig) -> Result<Self, ValidationError> {
        let registry = Arc::new(BackendRegistry::new(&config.backends)?);
        let policy = config
            .algorithm
            .build(Arc::new(ThreadRandom), config.selection.zero_weight_fallback);

        let dispatcher = Arc::new(
            RequestDispatcher::new(
                registry,
                policy,
                HyperTransport::new().with_max_body(config.limits.max_response_body_bytes),
            )
                .with_upstream_timeout(config.timeouts.upstream_secs.map(Duration::from_secs)),
        );

        tracing::info!(
            algorithm = %config.algorithm,
            backends = config.backends.len(),
            upstream_timeout_secs = ?config.timeouts.upstream_secs,
            max_response_body_bytes = config.limits.max_response_body_bytes,
            "Load balancer initialized"
        );

        let router = Self::build_router(AppState {
            dispatcher: dispatcher.clone(),
        });
        Ok(Self { router, dispatcher })
    }

    /// Build the Axum router with all middleware layers.
    fn build_router(state: AppState) -> Router {
        Router::new()
            .route("/{*path}", any(proxy_handler))
            .route("/", any(proxy_handler))
            .with_state(state)
            .layer(
                ServiceBuilder::new()
                    .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                    .layer(TraceLayer::new_for_http().make_span_with(
                        |request: &Request<Body>| {
                            let request_id = request
                                .headers()
                                .get("x-request-id")
                                .and_then(|v| v.to_str().ok())
                                .unwrap_or("unknown");
                            tracing::info_span!(
                                "request",
                                method = %request.method(),
                                uri = %request.uri(),
                                request_id = %request_id,
                            )
                        },
                    ))
                    .layer(PropagateRequestIdLayer::x_request_id()),
            )
    }

    /// The registry backing this server's dispatcher.
    pub fn registry(&self) -> Arc<BackendRegistry> {
        self.dispatcher.registry().clone()
    }

    pub fn dispatcher(&self) -> &Arc<RequestDispatcher<HyperTransport>> {
        &self.dispatcher
    }

    /// Run the server, accepting connections on the given listener until
    /// `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Main proxy handler.
async fn proxy_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    state.dispatcher.dispatch(request).await
}
