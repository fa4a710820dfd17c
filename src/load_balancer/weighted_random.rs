//! Static weighted random load balancing strategy.

use std::sync::Arc;

use crate::load_balancer::{
    backend::Backend, pick_weighted, registry::BackendRegistry, rng::RandomSource, PolicyKind,
    SelectionError, SelectionPolicy, ZeroWeightFallback,
};

/// Picks a backend with probability proportional to its configured weight.
///
/// Does not reserve a connection slot.
#[derive(Debug)]
pub struct WeightedRandom {
    rng: Arc<dyn RandomSource>,
    zero_weight: ZeroWeightFallback,
}

impl WeightedRandom {
    pub fn new(rng: Arc<dyn RandomSource>, zero_weight: ZeroWeightFallback) -> Self {
        Self { rng, zero_weight }
    }
}

impl SelectionPolicy for WeightedRandom {
    fn select(&self, registry: &BackendRegistry) -> Result<Arc<Backend>, SelectionError> {
        let backends = registry.backends();
        let weights: Vec<u64> = backends.iter().map(|b| u64::from(b.weight())).collect();
        debug_assert_eq!(weights.iter().sum::<u64>(), registry.total_weight());

        let index = pick_weighted(&weights, self.rng.as_ref(), self.zero_weight)?;
        Ok(backends[index].clone())
    }

    fn reserves_slot(&self) -> bool {
        false
    }

    fn kind(&self) -> PolicyKind {
        PolicyKind::WeightedRandom
    }
}
