//! Load balancing subsystem.
//!
//! # Data Flow
//! ```text
//! Request arrives at the dispatcher
//!     → policy.select(&registry)
//!         - random.rs          (uniform index)
//!         - least_conn.rs      (fewest active connections)
//!         - weighted_random.rs (static weights)
//!         - least_time.rs      (fastest last response)
//!         - dynamic.rs         (weights derived from live load)
//!     → registry.lease(backend, policy.reserves_slot())
//!     → forward, record latency, drop lease (releases slot if reserved)
//! ```
//!
//! # Design Decisions
//! - Policies hold no per-backend state; the registry owns all counters
//! - Slot reservation is a per-policy property and is not uniform:
//!   `random` and `weightrand` never touch connection counters
//! - Randomness is injected so selections can be replayed exactly

pub mod backend;
pub mod dynamic;
pub mod least_conn;
pub mod least_time;
pub mod random;
pub mod registry;
pub mod rng;
pub mod weighted_random;

use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug};
use std::str::FromStr;
use std::sync::Arc;

use crate::load_balancer::backend::Backend;
use crate::load_balancer::registry::BackendRegistry;
use crate::load_balancer::rng::RandomSource;

pub use registry::{BackendLease, BackendStats};
pub use rng::{SeededRandom, SequenceRandom, ThreadRandom};

/// A backend selection algorithm.
pub trait SelectionPolicy: Send + Sync + Debug {
    /// Choose one backend. Slot-reserving policies increment the chosen
    /// backend's connection counter before returning.
    fn select(&self, registry: &BackendRegistry) -> Result<Arc<Backend>, SelectionError>;

    /// Whether `select` reserves a connection slot that the caller must
    /// release.
    fn reserves_slot(&self) -> bool;

    fn kind(&self) -> PolicyKind;
}

/// Errors produced at selection time.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectionError {
    #[error("all effective weights truncated to zero")]
    ZeroTotalWeight,
}

/// What weighted policies do when every effective weight is zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ZeroWeightFallback {
    /// Pick uniformly among all backends.
    #[default]
    Uniform,
    /// Fail the selection with [`SelectionError::ZeroTotalWeight`].
    Error,
}

/// The configured policy, by its configuration token.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
pub enum PolicyKind {
    #[serde(rename = "random")]
    Random,
    #[default]
    #[serde(rename = "leastconn")]
    LeastConnections,
    #[serde(rename = "weightrand")]
    WeightedRandom,
    #[serde(rename = "leasttime")]
    LeastResponseTime,
    #[serde(rename = "dynamic")]
    DynamicWeighted,
    #[serde(rename = "dynamic2")]
    DynamicWeighted2,
}

impl PolicyKind {
    pub const ALL: [PolicyKind; 6] = [
        PolicyKind::Random,
        PolicyKind::LeastConnections,
        PolicyKind::WeightedRandom,
        PolicyKind::LeastResponseTime,
        PolicyKind::DynamicWeighted,
        PolicyKind::DynamicWeighted2,
    ];

    pub fn token(self) -> &'static str {
        match self {
            PolicyKind::Random => "random",
            PolicyKind::LeastConnections => "leastconn",
            PolicyKind::WeightedRandom => "weightrand",
            PolicyKind::LeastResponseTime => "leasttime",
            PolicyKind::DynamicWeighted => "dynamic",
            PolicyKind::DynamicWeighted2 => "dynamic2",
        }
    }

    /// Instantiate the policy with the given random source.
    pub fn build(
        self,
        rng: Arc<dyn RandomSource>,
        zero_weight: ZeroWeightFallback,
    ) -> Box<dyn SelectionPolicy> {
        match self {
            PolicyKind::Random => Box::new(random::RandomPolicy::new(rng)),
            PolicyKind::LeastConnections => Box::new(least_conn::LeastConnections::new()),
            PolicyKind::WeightedRandom => {
                Box::new(weighted_random::WeightedRandom::new(rng, zero_weight))
            }
            PolicyKind::LeastResponseTime => Box::new(least_time::LeastResponseTime::new()),
            PolicyKind::DynamicWeighted => {
                Box::new(dynamic::DynamicWeighted::new(rng, zero_weight))
            }
            PolicyKind::DynamicWeighted2 => {
                Box::new(dynamic::ConnectionTimeWeighted::new(rng, zero_weight))
            }
        }
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown load balancing algorithm: {0} (expected one of random, leastconn, weightrand, leasttime, dynamic, dynamic2)")]
pub struct UnknownPolicy(pub String);

impl FromStr for PolicyKind {
    type Err = UnknownPolicy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PolicyKind::ALL
            .into_iter()
            .find(|kind| kind.token() == s)
            .ok_or_else(|| UnknownPolicy(s.to_string()))
    }
}

/// Draw an index proportionally to `weights`.
///
/// Walks the weights in order, subtracting each from the draw until it goes
/// negative; the last index is the fallback. A zero total is resolved by
/// `fallback` instead of drawing from an empty range.
pub(crate) fn pick_weighted(
    weights: &[u64],
    rng: &dyn RandomSource,
    fallback: ZeroWeightFallback,
) -> Result<usize, SelectionError> {
    let total: u64 = weights.iter().sum();
    if total == 0 {
        return match fallback {
            ZeroWeightFallback::Uniform => Ok(rng.below(weights.len() as u64) as usize),
            ZeroWeightFallback::Error => Err(SelectionError::ZeroTotalWeight),
        };
    }

    let mut remaining = rng.below(total);
    for (i, weight) in weights.iter().enumerate() {
        if remaining < *weight {
            return Ok(i);
        }
        remaining -= weight;
    }
    Ok(weights.len() - 1)
}
