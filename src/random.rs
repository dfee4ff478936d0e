//! Pluggable randomness for split decisions.
//!
//! Tree shape depends on random choices (two-means seeding, tie-breaking on
//! the hyperplane). Keeping the generator behind a trait makes split outcomes
//! reproducible under test while production draws from a real PRNG.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Source of the two random decisions the index needs.
pub trait RandomSource {
    /// Uniform integer in `[0, n)`.
    fn index(&mut self, n: usize) -> usize;

    /// Fair coin, `0` or `1`.
    fn flip(&mut self) -> usize;
}

/// Production randomness backed by `rand::StdRng`.
#[derive(Debug)]
pub struct StdRandom {
    rng: StdRng,
}

impl StdRandom {
    /// Entropy-seeded generator.
    #[must_use]
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    /// Fixed-seed generator for reproducible runs.
    #[must_use]
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for StdRandom {
    fn default() -> Self {
        Self::new()
    }
}

impl RandomSource for StdRandom {
    fn index(&mut self, n: usize) -> usize {
        if n == 0 {
            return 0;
        }
        self.rng.gen_range(0..n)
    }

    fn flip(&mut self) -> usize {
        usize::from(self.rng.gen::<bool>())
    }
}

/// Deterministic cycling source for tests: emits `0, 1, ..., max, 0, ...`.
///
/// With `max == 1` the coin alternates strictly, which spreads tied items
/// evenly across both sides of a degenerate hyperplane.
#[derive(Debug)]
pub struct LoopRandom {
    max: usize,
    current: usize,
}

impl LoopRandom {
    #[must_use]
    pub fn new(max: usize) -> Self {
        Self { max, current: 0 }
    }

    fn next(&mut self) -> usize {
        self.current = (self.current + 1) % (self.max + 1);
        self.current
    }
}

impl RandomSource for LoopRandom {
    fn index(&mut self, n: usize) -> usize {
        if n == 0 {
            return 0;
        }
        self.next() % n
    }

    fn flip(&mut self) -> usize {
        self.next() % 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn std_random_index_in_range() {
        let mut r = StdRandom::seeded(42);
        for _ in 0..100 {
            assert!(r.index(7) < 7);
            assert!(r.flip() < 2);
        }
    }

    #[test]
    fn seeded_random_is_reproducible() {
        let mut a = StdRandom::seeded(7);
        let mut b = StdRandom::seeded(7);
        let xs: Vec<usize> = (0..20).map(|_| a.index(1000)).collect();
        let ys: Vec<usize> = (0..20).map(|_| b.index(1000)).collect();
        assert_eq!(xs, ys);
    }

    #[test]
    fn loop_random_alternates_flips() {
        let mut r = LoopRandom::new(1);
        let flips: Vec<usize> = (0..6).map(|_| r.flip()).collect();
        assert_eq!(flips, vec![1, 0, 1, 0, 1, 0]);
    }

    #[test]
    fn loop_random_index_cycles() {
        let mut r = LoopRandom::new(1);
        assert_eq!(r.index(3), 1);
        assert_eq!(r.index(3), 0);
        assert_eq!(r.index(3), 1);
    }
}
