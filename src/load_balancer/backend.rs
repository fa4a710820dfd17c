//! Backend abstraction.
//!
//! # Responsibilities
//! - Represent a single backend server
//! - Track active connections (for the slot-reserving policies)
//! - Track the latency of the most recent completed request
//!
//! The two mutable fields are only written through
//! [`BackendRegistry`](super::registry::BackendRegistry).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use url::Url;

use crate::config::validation::{parse_backend_address, ValidationError};
use crate::config::BackendConfig;

/// A single backend server.
#[derive(Debug)]
pub struct Backend {
    /// Base URL of the backend (scheme and authority).
    address: Url,
    /// Value for the `Host` header of forwarded requests.
    authority: String,
    /// Static weight for weighted selection.
    weight: u32,
    /// Number of requests in flight under a slot-reserving policy.
    active_connections: AtomicUsize,
    /// Duration of the most recently completed request.
    last_response_time: Mutex<Duration>,
}

impl Backend {
    /// Create a backend from an already-parsed address.
    pub fn new(address: Url, weight: u32) -> Self {
        let host = address.host_str().unwrap_or_default();
        let authority = match address.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };
        Self {
            address,
            authority,
            weight,
            active_connections: AtomicUsize::new(0),
            last_response_time: Mutex::new(Duration::ZERO),
        }
    }

    /// Create a backend from its configuration descriptor.
    pub fn from_config(config: &BackendConfig) -> Result<Self, ValidationError> {
        if config.weight == 0 {
            return Err(ValidationError::ZeroWeight {
                address: config.address.clone(),
            });
        }
        let address = parse_backend_address(&config.address)?;
        Ok(Self::new(address, config.weight))
    }

    pub fn address(&self) -> &Url {
        &self.address
    }

    /// `host[:port]` of the backend, used to rewrite the `Host` header.
    pub fn authority(&self) -> &str {
        &self.authority
    }

    pub fn weight(&self) -> u32 {
        self.weight
    }

    /// Get the current number of active connections.
    pub fn active_connections(&self) -> usize {
        self.active_connections.load(Ordering::Acquire)
    }

    /// Read the last recorded response time.
    ///
    /// Takes the per-backend lock for the duration of the read only.
    pub fn last_response_time(&self) -> Duration {
        *self
            .last_response_time
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub(super) fn inc_connections(&self) {
        self.active_connections.fetch_add(1, Ordering::AcqRel);
    }

    /// Decrement the active connection count.
    ///
    /// Returns `false` (and leaves the counter untouched) if it is already
    /// zero.
    pub(super) fn dec_connections(&self) -> bool {
        self.active_connections
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |count| {
                count.checked_sub(1)
            })
            .is_ok()
    }

    pub(super) fn store_response_time(&self, elapsed: Duration) {
        *self
            .last_response_time
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = elapsed;
    }
}
