//! Seeded uniform integer source.
//!
//! Production controllers seed from OS entropy. Tests pass a fixed seed, or
//! derive one per scope with `H(root_seed || scope)` (xxh3) so independent
//! scenarios get independent but reproducible streams.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use xxhash_rust::xxh3::xxh3_64;

#[derive(Debug, Clone)]
pub struct RandomSource {
    rng: StdRng,
}

impl RandomSource {
    #[must_use]
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    #[must_use]
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Seed derived from a root seed and a scope name.
    #[must_use]
    pub fn derived(root_seed: u64, scope: &str) -> Self {
        let mut buf = Vec::with_capacity(8 + scope.len());
        buf.extend_from_slice(&root_seed.to_le_bytes());
        buf.extend_from_slice(scope.as_bytes());
        Self::from_seed(xxh3_64(&buf))
    }

    /// Uniform draw from `[low, high]`. Returns `low` when the range is empty.
    pub fn uniform_inclusive(&mut self, low: u64, high: u64) -> u64 {
        if high <= low {
            return low;
        }
        self.rng.gen_range(low..=high)
    }

    /// Uniform index into a sequence of `len` elements. `len` must be > 0.
    pub fn index(&mut self, len: usize) -> usize {
        debug_assert!(len > 0, "index() over an empty sequence");
        if len <= 1 {
            return 0;
        }
        self.rng.gen_range(0..len)
    }
}
