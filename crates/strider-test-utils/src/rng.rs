//! Deterministic RNG utilities for reproducible tests.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Create a deterministic `ChaCha8Rng` from a seed.
///
/// All test randomization should go through this to ensure reproducibility.
pub fn seeded_rng(seed: u64) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(seed)
}

/// `count` ground heights, each within `amplitude` of the previous one.
pub fn bumpy_heights(count: usize, amplitude: f32, seed: u64) -> Vec<f32> {
    let mut rng = seeded_rng(seed);
    let mut height = 0.0;
    (0..count)
        .map(|_| {
            height += rng.gen_range(-amplitude..=amplitude);
            height
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
