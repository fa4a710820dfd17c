//! Shared utilities for integration and load testing.

use std::collections::HashMap;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use lb_proxy::config::{BackendConfig, LbConfig};
use lb_proxy::{BackendRegistry, LbServer, PolicyKind, Shutdown};

/// A request as seen by a mock backend.
#[allow(dead_code)]
pub struct RawRequest {
    pub method: String,
    pub target: String,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

/// Read one HTTP/1.1 request: head up to the blank line, then
/// `Content-Length` bytes of body.
async fn read_request(socket: &mut TcpStream) -> Option<RawRequest> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let head_end = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).into_owned();
    let mut lines = head.split("\r\n");
    let mut request_line = lines.next()?.split_whitespace();
    let method = request_line.next()?.to_string();
    let target = request_line.next()?.to_string();
    let headers: HashMap<String, String> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_string()))
        .collect();

    let length: usize = headers
        .get("content-length")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    let mut body = buf[head_end + 4..].to_vec();
    while body.len() < length {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..n]);
    }

    Some(RawRequest {
        method,
        target,
        headers,
        body,
    })
}

/// Start a mock backend on a raw socket. `f` turns each request into the
/// exact bytes written back; the connection is closed afterwards.
pub async fn start_raw_backend<F, Fut>(f: F) -> SocketAddr
where
    F: Fn(RawRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = String> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let f = Arc::new(f);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let f = f.clone();
                    tokio::spawn(async move {
                        if let Some(request) = read_request(&mut socket).await {
                            let response = f(request).await;
                            let _ = socket.write_all(response.as_bytes()).await;
                        }
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });
    addr
}

/// A complete response framed with `Content-Length`.
pub fn http_response(status: &str, extra_headers: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n{}\r\n{}",
        status,
        body.len(),
        extra_headers,
        body
    )
}

/// Start a mock backend that answers every request with `name` after
/// `delay`.
pub async fn start_named_backend(name: &'static str, delay: Duration) -> SocketAddr {
    start_raw_backend(move |_| async move {
        tokio::time::sleep(delay).await;
        http_response("200 OK", "", name)
    })
    .await
}

/// Start a mock backend that answers with a fixed status line and body.
#[allow(dead_code)]
pub async fn start_status_backend(status: &'static str, body: &'static str) -> SocketAddr {
    start_raw_backend(move |_| async move { http_response(status, "", body) }).await
}

/// Start a mock backend that streams `chunks` with chunked transfer
/// encoding.
#[allow(dead_code)]
pub async fn start_chunked_backend(chunks: &'static [&'static str]) -> SocketAddr {
    start_raw_backend(move |_| async move {
        let mut response =
            "HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n".to_string();
        for chunk in chunks {
            response.push_str(&format!("{:x}\r\n{}\r\n", chunk.len(), chunk));
        }
        response.push_str("0\r\n\r\n");
        response
    })
    .await
}

/// Start a mock backend that reflects the request it received as a JSON
/// document, answering 201 with an `x-backend: echo` header.
#[allow(dead_code)]
pub async fn start_echo_backend() -> SocketAddr {
    start_raw_backend(|request| async move {
        let header = |name: &str| request.headers.get(name).cloned().unwrap_or_default();
        let (path, query) = request
            .target
            .split_once('?')
            .unwrap_or((request.target.as_str(), ""));
        let doc = serde_json::json!({
            "method": request.method,
            "path": path,
            "query": query,
            "host": header("host"),
            "custom": header("x-custom"),
            "body": String::from_utf8_lossy(&request.body),
        });
        http_response(
            "201 Created",
            "Content-Type: application/json\r\nx-backend: echo\r\n",
            &doc.to_string(),
        )
    })
    .await
}

/// An address nothing listens on.
#[allow(dead_code)]
pub async fn dead_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

pub fn config(algorithm: PolicyKind, backends: &[SocketAddr]) -> LbConfig {
    let mut config = LbConfig::default();
    config.listener.bind_address = "127.0.0.1:0".into();
    config.algorithm = algorithm;
    config.backends = backends
        .iter()
        .map(|addr| BackendConfig {
            address: format!("http://{}", addr),
            weight: 1,
        })
        .collect();
    config
}

/// A running load balancer.
pub struct Proxy {
    pub addr: SocketAddr,
    pub registry: Arc<BackendRegistry>,
    pub shutdown: Shutdown,
}

impl Proxy {
    pub async fn start(config: LbConfig) -> Self {
        let server = LbServer::new(&config).unwrap();
        let registry = server.registry();
        let listener = TcpListener::bind(&config.listener.bind_address).await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = Shutdown::new();
        let rx = shutdown.subscribe();
        tokio::spawn(async move {
            let _ = server.run(listener, rx).await;
        });
        Self {
            addr,
            registry,
            shutdown,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Active connection count of every backend, in registry order.
    pub fn connections(&self) -> Vec<usize> {
        self.registry
            .backends()
            .iter()
            .map(|b| b.active_connections())
            .collect()
    }
}

impl Drop for Proxy {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}
