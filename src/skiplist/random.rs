//! Tower-height draws for the skiplist, from a capped geometric
//! distribution over the ladder `[8, 64, 512, 4096, 32768, 262144]`.

use std::time::{SystemTime, UNIX_EPOCH};

/// A small, self-contained PRNG (splitmix64) seeded from the wall clock by
/// default. Deterministic seeding is exposed for tests.
pub struct RandomGenerator {
    state: u64,
    ladder: [usize; 6],
}

impl RandomGenerator {
    pub fn new(ladder: [usize; 6]) -> Self {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0x9E3779B97F4A7C15);
        Self::with_seed(ladder, seed)
    }

    pub fn with_seed(ladder: [usize; 6], seed: u64) -> Self {
        RandomGenerator { state: seed ^ 0x9E3779B97F4A7C15, ladder }
    }

    fn next_u64(&mut self) -> u64 {
        self.state = self.state.wrapping_add(0x9E3779B97F4A7C15);
        let mut z = self.state;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
        z ^ (z >> 31)
    }

    /// Draws a random integer uniformly in `[0, ladder.last())` and returns
    /// the height `len(ladder) - 1 - i`, where `i` is the least index with
    /// `ladder[i] >= val`. Height 0 means a leaf-only node.
    pub fn next_height(&mut self) -> usize {
        let max = *self.ladder.last().expect("ladder is non-empty") as u64;
        let val = self.next_u64() % max;
        let i = self.ladder.partition_point(|&rung| (rung as u64) < val);
        self.ladder.len() - 1 - i
    }
}
