//! Backend registry.
//!
//! # Responsibilities
//! - Own the ordered, static pool of backends
//! - Route every mutation of runtime statistics through one accessor set
//! - Provide short scan windows to policies that read all counters
//! - Hand out leases that release reserved slots on drop

use serde::Serialize;
use std::ops::Deref;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::config::validation::ValidationError;
use crate::config::BackendConfig;
use crate::load_balancer::backend::Backend;
use crate::observability::metrics;

/// The fixed pool of backends and their runtime statistics.
#[derive(Debug)]
pub struct BackendRegistry {
    backends: Vec<Arc<Backend>>,
    total_weight: u64,
    /// Held while a policy scans counters and reserves a slot.
    scan_lock: Mutex<()>,
}

/// Serializable view of one backend, as exposed by the admin API.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct BackendStats {
    pub address: String,
    pub weight: u32,
    pub active_connections: usize,
    pub last_response_time_ms: u64,
}

impl BackendRegistry {
    /// Build the registry from configuration, in configuration order.
    pub fn new(configs: &[BackendConfig]) -> Result<Self, ValidationError> {
        let backends = configs
            .iter()
            .map(Backend::from_config)
            .collect::<Result<Vec<_>, _>>()?;
        Self::from_backends(backends)
    }

    /// Build the registry from already constructed backends.
    pub fn from_backends(backends: Vec<Backend>) -> Result<Self, ValidationError> {
        if backends.is_empty() {
            return Err(ValidationError::EmptyPool);
        }
        let total_weight = backends.iter().map(|b| u64::from(b.weight())).sum();
        Ok(Self {
            backends: backends.into_iter().map(Arc::new).collect(),
            total_weight,
            scan_lock: Mutex::new(()),
        })
    }

    /// Backends in registry order. Never empty.
    pub fn backends(&self) -> &[Arc<Backend>] {
        &self.backends
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    /// Always `false`; an empty pool is rejected at construction.
    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    /// Sum of all static weights, computed at load time.
    pub fn total_weight(&self) -> u64 {
        self.total_weight
    }

    /// Open a scan window over all backends.
    ///
    /// Concurrent snapshots are serialized so that a scan followed by a
    /// reservation is not interleaved with another one. Individual counters
    /// are still independent atomics and may move under requests that are
    /// completing concurrently.
    pub fn snapshot(&self) -> Snapshot<'_> {
        Snapshot {
            _guard: self.scan_lock.lock().unwrap_or_else(PoisonError::into_inner),
            backends: &self.backends,
        }
    }

    pub fn increment_connections(&self, backend: &Backend) {
        backend.inc_connections();
        metrics::connection_opened(backend.authority());
    }

    pub fn decrement_connections(&self, backend: &Backend) {
        let released = backend.dec_connections();
        debug_assert!(
            released,
            "released a connection slot on {} that was never reserved",
            backend.address()
        );
        if released {
            metrics::connection_closed(backend.authority());
        } else {
            tracing::error!(
                backend = %backend.address(),
                "Connection release without a matching reservation"
            );
        }
    }

    pub fn record_response_time(&self, backend: &Backend, elapsed: Duration) {
        backend.store_response_time(elapsed);
    }

    /// Wrap a selected backend in a lease.
    ///
    /// When `reserved` is set the lease releases one connection slot when it
    /// is dropped.
    pub fn lease(self: &Arc<Self>, backend: Arc<Backend>, reserved: bool) -> BackendLease {
        BackendLease {
            registry: self.clone(),
            backend,
            reserved,
        }
    }

    /// Current statistics for every backend, in registry order.
    pub fn stats(&self) -> Vec<BackendStats> {
        self.backends
            .iter()
            .map(|b| BackendStats {
                address: b.address().to_string(),
                weight: b.weight(),
                active_connections: b.active_connections(),
                last_response_time_ms: b.last_response_time().as_millis() as u64,
            })
            .collect()
    }
}

/// A locked view over the registry's backends.
pub struct Snapshot<'a> {
    _guard: MutexGuard<'a, ()>,
    backends: &'a [Arc<Backend>],
}

impl Deref for Snapshot<'_> {
    type Target = [Arc<Backend>];
    fn deref(&self) -> &Self::Target {
        self.backends
    }
}

/// A RAII guard over a selected backend.
#[derive(Debug)]
pub struct BackendLease {
    registry: Arc<BackendRegistry>,
    backend: Arc<Backend>,
    reserved: bool,
}

impl BackendLease {
    pub fn backend(&self) -> &Arc<Backend> {
        &self.backend
    }

    /// Whether dropping this lease releases a connection slot.
    pub fn is_reserved(&self) -> bool {
        self.reserved
    }

    pub fn record_response_time(&self, elapsed: Duration) {
        self.registry.record_response_time(&self.backend, elapsed);
    }
}

impl Deref for BackendLease {
    type Target = Backend;
    fn deref(&self) -> &Self::Target {
        &self.backend
    }
}

impl Drop for BackendLease {
    fn drop(&mut self) {
        if self.reserved {
            self.registry.decrement_connections(&self.backend);
        }
    }
}
