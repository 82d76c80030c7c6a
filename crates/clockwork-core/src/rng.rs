//! Seedable random source for randomized tie-breaks.

use rand::prelude::*;
use rand_chacha::ChaCha8Rng;

/// A reproducible generator for kernel-level random choices.
///
/// Used by the randomizing event list and the random queue discipline.
/// Model-level distributions are external collaborators and do not draw
/// from this stream.
#[derive(Clone, Debug)]
pub struct SeededRng {
    seed: u64,
    inner: ChaCha8Rng,
}

impl SeededRng {
    /// Create a generator from a 64-bit seed.
    pub fn new(seed: u64) -> Self {
        Self {
            seed,
            inner: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Restart the stream from `seed`.
    pub fn reseed(&mut self, seed: u64) {
        *self = Self::new(seed);
    }

    /// The seed this stream was last started from.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Uniform index in `[0, upper]` (both ends inclusive).
    pub fn index_inclusive(&mut self, upper: usize) -> usize {
        self.inner.random_range(0..=upper)
    }
}
