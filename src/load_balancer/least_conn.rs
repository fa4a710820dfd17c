//! Least Connections load balancing strategy.

use std::sync::Arc;

use crate::load_balancer::{
    backend::Backend, registry::BackendRegistry, PolicyKind, SelectionError, SelectionPolicy,
};

/// Least connections selector.
/// Selects the backend with the minimum number of active connections and
/// reserves a slot on it.
#[derive(Debug, Default)]
pub struct LeastConnections;

impl LeastConnections {
    pub fn new() -> Self {
        Self
    }
}

impl SelectionPolicy for LeastConnections {
    fn select(&self, registry: &BackendRegistry) -> Result<Arc<Backend>, SelectionError> {
        let snapshot = registry.snapshot();

        // In case of tie, the first one is selected (stability)
        let chosen = snapshot
            .iter()
            .min_by_key(|b| b.active_connections())
            .cloned()
            .unwrap_or_else(|| snapshot[0].clone());

        registry.increment_connections(&chosen);
        Ok(chosen)
    }

    fn reserves_slot(&self) -> bool {
        true
    }

    fn kind(&self) -> PolicyKind {
        PolicyKind::LeastConnections
    }
}
