//! Least Response Time load balancing strategy.

use std::sync::Arc;

use crate::load_balancer::{
    backend::Backend, registry::BackendRegistry, PolicyKind, SelectionError, SelectionPolicy,
};

/// Selects the backend whose most recent request completed fastest.
///
/// Each backend's response time is read under its own lock. Backends that
/// have not served a request yet report zero and are therefore preferred.
#[derive(Debug, Default)]
pub struct LeastResponseTime;

impl LeastResponseTime {
    pub fn new() -> Self {
        Self
    }
}

impl SelectionPolicy for LeastResponseTime {
    fn select(&self, registry: &BackendRegistry) -> Result<Arc<Backend>, SelectionError> {
        let snapshot = registry.snapshot();

        let chosen = snapshot
            .iter()
            .min_by_key(|b| b.last_response_time())
            .cloned()
            .unwrap_or_else(|| snapshot[0].clone());

        registry.increment_connections(&chosen);
        Ok(chosen)
    }

    fn reserves_slot(&self) -> bool {
        true
    }

    fn kind(&self) -> PolicyKind {
        PolicyKind::LeastResponseTime
    }
}
