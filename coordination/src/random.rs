//! Injectable randomness for turn scheduling and challenge selection.
//!
//! The engines never touch a global RNG; they hold a [`RandomSource`] that
//! tests replace with [`SeededRandom`] for reproducible runs.

use rand::{rngs::StdRng, Rng, SeedableRng};

/// Abstraction for random number generation
pub trait RandomSource: Send {
    /// Uniform float in `[0.0, 1.0)`
    fn next_f64(&mut self) -> f64;

    /// Uniform integer in `start..=end`; returns `start` when `end <= start`
    fn gen_range_u64(&mut self, start: u64, end: u64) -> u64;

    /// Uniform index into a collection of `len` items; `None` when empty
    fn pick_index(&mut self, len: usize) -> Option<usize>;
}

/// System randomness using entropy-seeded RNG (Send-safe)
pub struct SystemRandom {
    rng: StdRng,
}

impl SystemRandom {
    pub fn new() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }
}

impl Default for SystemRandom {
    fn default() -> Self {
        Self::new()
    }
}

impl RandomSource for SystemRandom {
    fn next_f64(&mut self) -> f64 {
        self.rng.gen()
    }

    fn gen_range_u64(&mut self, start: u64, end: u64) -> u64 {
        range_inclusive(&mut self.rng, start, end)
    }

    fn pick_index(&mut self, len: usize) -> Option<usize> {
        (len > 0).then(|| self.rng.gen_range(0..len))
    }
}

/// Deterministic randomness using seeded RNG
pub struct SeededRandom {
    rng: StdRng,
    seed: u64,
}

impl SeededRandom {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            seed,
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }
}

impl RandomSource for SeededRandom {
    fn next_f64(&mut self) -> f64 {
        self.rng.gen()
    }

    fn gen_range_u64(&mut self, start: u64, end: u64) -> u64 {
        range_inclusive(&mut self.rng, start, end)
    }

    fn pick_index(&mut self, len: usize) -> Option<usize> {
        (len > 0).then(|| self.rng.gen_range(0..len))
    }
}

fn range_inclusive(rng: &mut StdRng, start: u64, end: u64) -> u64 {
    if end <= start {
        start
    } else {
        rng.gen_range(start..=end)
    }
}
