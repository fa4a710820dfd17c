//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! registry / dispatcher / server produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Request ID (`x-request-id`) is attached to every request span
//! - Metrics are cheap (atomic increments), and free without a recorder

pub mod logging;
pub mod metrics;
