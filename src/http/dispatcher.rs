//! Per-request dispatch cycle.
//!
//! # Data Flow
//! ```text
//! request
//!     → policy.select (may reserve a slot)
//!     → registry.lease
//!     → transport.forward (optionally bounded by a timeout)
//!     → success: record latency, return backend response
//!     → failure: 500 with a short diagnostic
//!     → lease dropped: reserved slot released
//! ```
//!
//! The lease is an RAII guard, so the slot is also released when the
//! request future is dropped mid-forward.

use axum::body::Body;
use axum::http::{Request, Response, StatusCode};
use axum::response::IntoResponse;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::http::transport::{Transport, TransportError};
use crate::load_balancer::{
    registry::BackendRegistry, BackendLease, PolicyKind, SelectionError, SelectionPolicy,
};
use crate::observability::metrics;

/// Body returned when no backend could be selected.
pub const SELECTION_FAILED: &str = "No backend available";
/// Body returned when the forward failed.
pub const FORWARD_FAILED: &str = "Failed to forward the request";

/// Routes requests to the backends of one registry with one policy.
#[derive(Debug)]
pub struct RequestDispatcher<T> {
    registry: Arc<BackendRegistry>,
    policy: Box<dyn SelectionPolicy>,
    transport: T,
    upstream_timeout: Option<Duration>,
}

impl<T: Transport> RequestDispatcher<T> {
    pub fn new(
        registry: Arc<BackendRegistry>,
        policy: Box<dyn SelectionPolicy>,
        transport: T,
    ) -> Self {
        Self {
            registry,
            policy,
            transport,
            upstream_timeout: None,
        }
    }

    /// Bound every forward by `timeout`. `None` waits indefinitely.
    pub fn with_upstream_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.upstream_timeout = timeout;
        self
    }

    pub fn registry(&self) -> &Arc<BackendRegistry> {
        &self.registry
    }

    pub fn policy(&self) -> PolicyKind {
        self.policy.kind()
    }

    /// Select a backend and wrap it in a lease matching the policy's
    /// reservation behaviour.
    pub fn acquire(&self) -> Result<BackendLease, SelectionError> {
        let backend = self.policy.select(&self.registry)?;
        Ok(self.registry.lease(backend, self.policy.reserves_slot()))
    }

    /// Run one request through select, forward, record and release.
    ///
    /// Never fails: selection and forward errors become 500 responses.
    pub async fn dispatch(&self, request: Request<Body>) -> Response<Body> {
        let method = request.method().clone();

        let lease = match self.acquire() {
            Ok(lease) => lease,
            Err(e) => {
                tracing::error!(policy = %self.policy.kind(), error = %e, "Backend selection failed");
                metrics::record_request(method.as_str(), 500, "none", Duration::ZERO);
                return (StatusCode::INTERNAL_SERVER_ERROR, SELECTION_FAILED).into_response();
            }
        };

        tracing::debug!(
            backend = %lease.address(),
            method = %method,
            path = %request.uri().path(),
            reserved = lease.is_reserved(),
            "Forwarding request"
        );

        let start = Instant::now();
        let result = self.forward(&lease, request).await;
        let elapsed = start.elapsed();

        match result {
            Ok(response) => {
                lease.record_response_time(elapsed);
                metrics::record_request(
                    method.as_str(),
                    response.status().as_u16(),
                    lease.authority(),
                    elapsed,
                );
                response
            }
            Err(e) => {
                tracing::warn!(backend = %lease.address(), error = %e, "Error when proxying to backend");
                metrics::record_request(method.as_str(), 500, lease.authority(), elapsed);
                (StatusCode::INTERNAL_SERVER_ERROR, FORWARD_FAILED).into_response()
            }
        }
    }

    async fn forward(
        &self,
        lease: &BackendLease,
        request: Request<Body>,
    ) -> Result<Response<Body>, TransportError> {
        let forward = self.transport.forward(lease.backend(), request);
        match self.upstream_timeout {
            Some(limit) => tokio::time::timeout(limit, forward)
                .await
                .map_err(|_| TransportError::Timeout(limit))?,
            None => forward.await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_balancer::backend::Backend;
    use crate::load_balancer::test_support::{registry, set_connections};
    use crate::load_balancer::{SequenceRandom, ZeroWeightFallback};
    use std::sync::Mutex;

    /// Answers 200 with the backend's authority after an optional delay,
    /// remembering each backend's connection count seen mid-flight.
    #[derive(Debug, Default)]
    struct EchoTransport {
        delay: Duration,
        seen: Mutex<Vec<(String, usize)>>,
    }

    impl Transport for EchoTransport {
        async fn forward(
            &self,
            backend: &Backend,
            _request: Request<Body>,
        ) -> Result<Response<Body>, TransportError> {
            self.seen
                .lock()
                .unwrap()
                .push((backend.authority().to_string(), backend.active_connections()));
            tokio::time::sleep(self.delay).await;
            Ok(Response::new(Body::from(backend.authority().to_string())))
        }
    }

    #[derive(Debug)]
    struct FailingTransport;

    impl Transport for FailingTransport {
        async fn forward(
            &self,
            _backend: &Backend,
            _request: Request<Body>,
        ) -> Result<Response<Body>, TransportError> {
            Err(TransportError::Timeout(Duration::ZERO))
        }
    }

    fn dispatcher<T: Transport>(
        kind: PolicyKind,
        weights: &[u32],
        transport: T,
    ) -> RequestDispatcher<T> {
        let policy = kind.build(
            Arc::new(SequenceRandom::new(vec![0])),
            ZeroWeightFallback::Error,
        );
        RequestDispatcher::new(registry(weights), policy, transport)
    }

    fn request() -> Request<Body> {
        Request::builder().uri("/").body(Body::empty()).unwrap()
    }

    async fn body_text(response: Response<Body>) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_reserved_slot_held_during_forward_and_released_after() {
        let d = dispatcher(PolicyKind::LeastConnections, &[1, 1], EchoTransport::default());

        let response = d.dispatch(request()).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "127.0.0.1:8080");

        let seen = d.transport.seen.lock().unwrap().clone();
        assert_eq!(seen, vec![("127.0.0.1:8080".to_string(), 1)]);
        assert!(d.registry().backends().iter().all(|b| b.active_connections() == 0));
    }

    #[tokio::test]
    async fn test_unreserving_policy_never_touches_counters() {
        let d = dispatcher(PolicyKind::WeightedRandom, &[1, 1], EchoTransport::default());
        d.dispatch(request()).await;

        let seen = d.transport.seen.lock().unwrap().clone();
        assert_eq!(seen[0].1, 0);
        assert!(d.registry().backends().iter().all(|b| b.active_connections() == 0));
    }

    #[tokio::test]
    async fn test_response_time_recorded() {
        let transport = EchoTransport {
            delay: Duration::from_millis(20),
            ..Default::default()
        };
        let d = dispatcher(PolicyKind::LeastResponseTime, &[1, 1], transport);
        d.dispatch(request()).await;

        assert!(d.registry().backends()[0].last_response_time() >= Duration::from_millis(20));
        assert_eq!(d.registry().backends()[1].last_response_time(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_failed_forward_releases_slot() {
        for kind in PolicyKind::ALL {
            let d = dispatcher(kind, &[1, 1, 1], FailingTransport);
            for _ in 0..5 {
                let response = d.dispatch(request()).await;
                assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
                assert_eq!(body_text(response).await, FORWARD_FAILED);
                assert!(d.registry().backends().iter().all(|b| b.active_connections() == 0));
            }
            // failures do not count as observed latency
            assert!(d
                .registry()
                .backends()
                .iter()
                .all(|b| b.last_response_time() == Duration::ZERO));
        }
    }

    #[tokio::test]
    async fn test_selection_failure_is_a_server_error() {
        let d = dispatcher(PolicyKind::DynamicWeighted, &[1, 1], EchoTransport::default());
        set_connections(d.registry(), &[1, 1]);

        let response = d.dispatch(request()).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_text(response).await, SELECTION_FAILED);
        assert!(d.transport.seen.lock().unwrap().is_empty());
        assert!(d.registry().backends().iter().all(|b| b.active_connections() == 1));
    }

    #[tokio::test]
    async fn test_upstream_timeout_releases_slot() {
        let transport = EchoTransport {
            delay: Duration::from_secs(5),
            ..Default::default()
        };
        let d = dispatcher(PolicyKind::LeastConnections, &[1], transport)
            .with_upstream_timeout(Some(Duration::from_millis(50)));

        let response = d.dispatch(request()).await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(d.registry().backends()[0].active_connections(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_dispatch_releases_slot() {
        let transport = EchoTransport {
            delay: Duration::from_secs(5),
            ..Default::default()
        };
        let d = dispatcher(PolicyKind::LeastConnections, &[1], transport);

        let outcome = tokio::time::timeout(Duration::from_millis(50), d.dispatch(request())).await;
        assert!(outcome.is_err());
        assert_eq!(d.registry().backends()[0].active_connections(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_dispatch_returns_to_baseline() {
        let transport = EchoTransport {
            delay: Duration::from_millis(10),
            ..Default::default()
        };
        let d = Arc::new(dispatcher(PolicyKind::LeastConnections, &[1, 1, 1], transport));

        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..60 {
            let d = d.clone();
            tasks.spawn(async move { d.dispatch(request()).await.status() });
        }
        while let Some(status) = tasks.join_next().await {
            assert_eq!(status.unwrap(), StatusCode::OK);
        }

        assert!(d.registry().backends().iter().all(|b| b.active_connections() == 0));
        let seen = d.transport.seen.lock().unwrap().clone();
        assert_eq!(seen.len(), 60);
        assert!(seen.iter().all(|(_, count)| *count >= 1));
    }
}
