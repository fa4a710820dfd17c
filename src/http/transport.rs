//! Upstream transport.
//!
//! # Responsibilities
//! - Rewrite the request target to the selected backend
//! - Rewrite the `Host` header to the backend's authority
//! - Send the request and read the full response, up to a size limit
//! - Reframe the buffered response: drop hop-by-hop headers and set
//!   `Content-Length`
//!
//! Method, path, query, the remaining headers and the body pass through
//! unchanged.

use axum::body::Body;
use axum::http::{
    header, HeaderMap, HeaderName, HeaderValue, Method, Request, Response, StatusCode, Uri, Version,
};
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use std::future::Future;
use std::time::Duration;

use crate::load_balancer::backend::Backend;

/// Default cap on a buffered upstream response body.
pub const DEFAULT_MAX_RESPONSE_BODY: usize = 1024 * 1024;

/// Connection-scoped headers that describe the upstream hop only.
static HOP_BY_HOP: [HeaderName; 7] = [
    header::CONNECTION,
    HeaderName::from_static("keep-alive"),
    HeaderName::from_static("proxy-connection"),
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

/// Failure to obtain a complete response from a backend.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("invalid upstream request: {0}")]
    Request(#[from] axum::http::Error),

    #[error("invalid host header: {0}")]
    Host(#[from] header::InvalidHeaderValue),

    #[error("upstream request failed: {0}")]
    Upstream(#[from] hyper_util::client::legacy::Error),

    #[error("failed to read upstream response body: {0}")]
    Body(#[source] axum::Error),

    #[error("upstream did not respond within {0:?}")]
    Timeout(Duration),
}

/// Sends one request to one backend.
pub trait Transport: Send + Sync + 'static {
    fn forward(
        &self,
        backend: &Backend,
        request: Request<Body>,
    ) -> impl Future<Output = Result<Response<Body>, TransportError>> + Send;
}

/// Build the upstream URI: backend scheme, authority and base path followed
/// by the original path and query.
pub fn upstream_uri(backend: &Backend, original: &Uri) -> Result<Uri, axum::http::Error> {
    let path_and_query = original
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let base_path = backend.address().path().trim_end_matches('/');

    Uri::builder()
        .scheme(backend.address().scheme())
        .authority(backend.authority())
        .path_and_query(format!("{}{}", base_path, path_and_query))
        .build()
}

/// Remove hop-by-hop headers, including any named in `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::try_from(name.trim()).ok())
        .collect();
    for name in HOP_BY_HOP.iter().chain(listed.iter()) {
        headers.remove(name);
    }
}

/// HTTP/1.1 transport over a pooled hyper client.
#[derive(Debug, Clone)]
pub struct HyperTransport {
    client: Client<HttpConnector, Body>,
    max_body: usize,
}

impl HyperTransport {
    pub fn new() -> Self {
        let client = Client::builder(TokioExecutor::new()).build(HttpConnector::new());
        Self {
            client,
            max_body: DEFAULT_MAX_RESPONSE_BODY,
        }
    }

    /// Fail forwards whose response body exceeds `max_body` bytes.
    pub fn with_max_body(mut self, max_body: usize) -> Self {
        self.max_body = max_body;
        self
    }

    pub fn max_body(&self) -> usize {
        self.max_body
    }
}

impl Default for HyperTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for HyperTransport {
    async fn forward(
        &self,
        backend: &Backend,
        request: Request<Body>,
    ) -> Result<Response<Body>, TransportError> {
        let (mut parts, body) = request.into_parts();
        let is_head = parts.method == Method::HEAD;
        parts.uri = upstream_uri(backend, &parts.uri)?;
        parts.version = Version::HTTP_11;
        parts
            .headers
            .insert(header::HOST, HeaderValue::from_str(backend.authority())?);

        let response = self.client.request(Request::from_parts(parts, body)).await?;

        // Buffered: recorded latency includes the body, and a broken body
        // fails the forward.
        let (mut parts, body) = response.into_parts();
        let bytes = axum::body::to_bytes(Body::new(body), self.max_body)
            .await
            .map_err(TransportError::Body)?;

        strip_hop_by_hop(&mut parts.headers);
        // HEAD, 204 and 304 carry no body; their length header is left alone.
        let bodiless = is_head
            || parts.status == StatusCode::NO_CONTENT
            || parts.status == StatusCode::NOT_MODIFIED;
        if !bodiless {
            parts
                .headers
                .insert(header::CONTENT_LENGTH, HeaderValue::from(bytes.len()));
        }
        Ok(Response::from_parts(parts, Body::from(bytes)))
    }
}
