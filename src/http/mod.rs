//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, tracing)
//!     → dispatcher.rs (select backend, account load)
//!     → transport.rs (forward to backend, read response)
//!     → Send to client
//! ```

pub mod dispatcher;
pub mod server;
pub mod transport;

pub use dispatcher::RequestDispatcher;
pub use server::LbServer;
pub use transport::{HyperTransport, Transport, TransportError};
