//! Load-aware weighted random strategies.
//!
//! Both variants derive an effective weight for every backend from its live
//! statistics, draw over those weights like [`WeightedRandom`] does, and
//! reserve a slot on the chosen backend.
//!
//! The effective weights are computed once per selection inside the
//! registry's scan window, so the draw and the reservation see the same
//! counters.
//!
//! [`WeightedRandom`]: crate::load_balancer::weighted_random::WeightedRandom

use std::sync::Arc;

use crate::load_balancer::{
    backend::Backend, pick_weighted, registry::BackendRegistry, rng::RandomSource, PolicyKind,
    SelectionError, SelectionPolicy, ZeroWeightFallback,
};

/// Scale applied to real-valued weights before truncation.
pub const WEIGHT_SCALE: f64 = 1000.0;

/// Effective weight `1 / (active + 1)` in integer arithmetic.
///
/// Truncates to zero as soon as a backend has one active connection, which
/// makes an idle backend the only candidate whenever one exists. A pool with
/// no idle backend is resolved by the zero-weight fallback.
pub fn connection_weight(backend: &Backend) -> u64 {
    1 / (backend.active_connections() as u64 + 1)
}

/// Effective weight `1000 / (active + 1 + last response in ms)`, truncated.
pub fn connection_time_weight(backend: &Backend) -> u64 {
    let millis = backend.last_response_time().as_nanos() as f64 / 1_000_000.0;
    let denominator = backend.active_connections() as f64 + 1.0 + millis;
    (WEIGHT_SCALE / denominator) as u64
}

/// Weighted random over `1 / (active connections + 1)`.
#[derive(Debug)]
pub struct DynamicWeighted {
    rng: Arc<dyn RandomSource>,
    zero_weight: ZeroWeightFallback,
}

impl DynamicWeighted {
    pub fn new(rng: Arc<dyn RandomSource>, zero_weight: ZeroWeightFallback) -> Self {
        Self { rng, zero_weight }
    }
}

impl SelectionPolicy for DynamicWeighted {
    fn select(&self, registry: &BackendRegistry) -> Result<Arc<Backend>, SelectionError> {
        select_by(registry, self.rng.as_ref(), self.zero_weight, connection_weight)
    }

    fn reserves_slot(&self) -> bool {
        true
    }

    fn kind(&self) -> PolicyKind {
        PolicyKind::DynamicWeighted
    }
}

/// Weighted random over active connections combined with response time.
#[derive(Debug)]
pub struct ConnectionTimeWeighted {
    rng: Arc<dyn RandomSource>,
    zero_weight: ZeroWeightFallback,
}

impl ConnectionTimeWeighted {
    pub fn new(rng: Arc<dyn RandomSource>, zero_weight: ZeroWeightFallback) -> Self {
        Self { rng, zero_weight }
    }
}

impl SelectionPolicy for ConnectionTimeWeighted {
    fn select(&self, registry: &BackendRegistry) -> Result<Arc<Backend>, SelectionError> {
        select_by(registry, self.rng.as_ref(), self.zero_weight, connection_time_weight)
    }

    fn reserves_slot(&self) -> bool {
        true
    }

    fn kind(&self) -> PolicyKind {
        PolicyKind::DynamicWeighted2
    }
}

fn select_by(
    registry: &BackendRegistry,
    rng: &dyn RandomSource,
    zero_weight: ZeroWeightFallback,
    weight_of: fn(&Backend) -> u64,
) -> Result<Arc<Backend>, SelectionError> {
    let snapshot = registry.snapshot();
    let weights: Vec<u64> = snapshot.iter().map(|b| weight_of(b)).collect();

    let index = pick_weighted(&weights, rng, zero_weight).inspect_err(|_| {
        tracing::warn!(?weights, "Every effective weight is zero");
    })?;

    let chosen = snapshot[index].clone();
    registry.increment_connections(&chosen);
    Ok(chosen)
}
