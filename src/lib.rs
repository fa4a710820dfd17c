//! HTTP load balancer over a static backend pool.
//!
//! Requests are spread across the pool by one of six selection policies
//! (`random`, `leastconn`, `weightrand`, `leasttime`, `dynamic`,
//! `dynamic2`) that read live per-backend load: active connections and the
//! latency of the last completed request.

pub mod admin;
pub mod config;
pub mod http;
pub mod lifecycle;
pub mod load_balancer;
pub mod observability;

pub use config::LbConfig;
pub use http::{LbServer, RequestDispatcher};
pub use lifecycle::Shutdown;
pub use load_balancer::{registry::BackendRegistry, PolicyKind, SelectionPolicy};
