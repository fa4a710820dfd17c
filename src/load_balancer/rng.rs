//! Random sources for the randomized policies.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fmt::Debug;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

/// A source of uniformly distributed integers.
pub trait RandomSource: Send + Sync + Debug {
    /// Return a value in `[0, bound)`. `bound` is never zero.
    fn below(&self, bound: u64) -> u64;
}

/// Thread-local generator, used in production.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn below(&self, bound: u64) -> u64 {
        rand::thread_rng().gen_range(0..bound)
    }
}

/// Reproducible generator seeded with a fixed value.
#[derive(Debug)]
pub struct SeededRandom {
    rng: Mutex<StdRng>,
}

impl SeededRandom {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl RandomSource for SeededRandom {
    fn below(&self, bound: u64) -> u64 {
        self.rng
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .gen_range(0..bound)
    }
}

/// Replays a fixed sequence of values, wrapping around at the end.
///
/// Each value is reduced modulo the requested bound.
#[derive(Debug)]
pub struct SequenceRandom {
    values: Vec<u64>,
    cursor: AtomicUsize,
}

impl SequenceRandom {
    /// # Panics
    ///
    /// Panics if `values` is empty.
    pub fn new(values: Vec<u64>) -> Self {
        assert!(!values.is_empty(), "SequenceRandom needs at least one value");
        Self {
            values,
            cursor: AtomicUsize::new(0),
        }
    }
}

impl RandomSource for SequenceRandom {
    fn below(&self, bound: u64) -> u64 {
        let i = self.cursor.fetch_add(1, Ordering::Relaxed) % self.values.len();
        self.values[i] % bound
    }
}
