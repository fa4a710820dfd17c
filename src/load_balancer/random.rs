//! Uniform random load balancing strategy.

use std::sync::Arc;

use crate::load_balancer::{
    backend::Backend, registry::BackendRegistry, rng::RandomSource, PolicyKind, SelectionError,
    SelectionPolicy,
};

/// Picks any backend with equal probability.
///
/// Does not reserve a connection slot.
#[derive(Debug)]
pub struct RandomPolicy {
    rng: Arc<dyn RandomSource>,
}

impl RandomPolicy {
    pub fn new(rng: Arc<dyn RandomSource>) -> Self {
        Self { rng }
    }
}

impl SelectionPolicy for RandomPolicy {
    fn select(&self, registry: &BackendRegistry) -> Result<Arc<Backend>, SelectionError> {
        let backends = registry.backends();
        let index = self.rng.below(backends.len() as u64) as usize;
        Ok(backends[index].clone())
    }

    fn reserves_slot(&self) -> bool {
        false
    }

    fn kind(&self) -> PolicyKind {
        PolicyKind::Random
    }
}
