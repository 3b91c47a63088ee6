//! Seeded, reproducible randomness for the simulation.
//!
//! Every random decision in the game flows through a [`GameRng`] so that the
//! same seed always produces the same sequence of draws, across runs and
//! across processes. Combat and espionage build composite string seeds (for
//! example `"pvp-<attackerId>-<defenderId>-<tick>"`) so that both sides of an
//! interaction recompute identical outcomes independently.
//!
//! String seeds are reduced to a 64-bit seed through SHA-256, which keeps the
//! mapping stable regardless of platform hash randomization.

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64Mcg;
use sha2::{Digest, Sha256};

// ---------------------------------------------------------------------------
// GameRng
// ---------------------------------------------------------------------------

/// Deterministic PCG-backed random number generator.
///
/// The construction seed is retained so the generator can be rewound with
/// [`reset`](Self::reset). All draws advance the underlying stream by exactly
/// one step per returned value, which makes [`skip`](Self::skip) well-defined.
#[derive(Debug, Clone)]
pub struct GameRng {
    seed: u64,
    rng: Pcg64Mcg,
}

impl GameRng {
    /// Create a generator from a string seed.
    ///
    /// The string is hashed with SHA-256 and the first eight bytes (little
    /// endian) become the numeric seed, so arbitrarily long composite seeds
    /// stay stable across processes.
    pub fn from_seed(seed: &str) -> Self {
        let digest = Sha256::digest(seed.as_bytes());
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest[..8]);
        Self::from_u64(u64::from_le_bytes(bytes))
    }

    /// Create a generator from a numeric seed.
    pub fn from_u64(seed: u64) -> Self {
        Self {
            seed,
            rng: Pcg64Mcg::seed_from_u64(seed),
        }
    }

    /// The numeric seed this generator was built from.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Next value in `[0, 1)`.
    pub fn next(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }

    /// Next value in `[lo, hi)`.
    pub fn next_range(&mut self, lo: f64, hi: f64) -> f64 {
        lo + self.next() * (hi - lo)
    }

    /// Next integer in `[lo, hi]`, inclusive on both ends.
    pub fn next_int(&mut self, lo: i64, hi: i64) -> i64 {
        debug_assert!(lo <= hi, "next_int bounds inverted: [{lo}, {hi}]");
        let span = (hi - lo + 1) as f64;
        lo + (self.next() * span) as i64
    }

    /// Bernoulli draw: `true` with probability `p`.
    pub fn chance(&mut self, p: f64) -> bool {
        self.next() < p
    }

    /// Pick a uniformly random element of a non-empty slice.
    ///
    /// # Panics
    ///
    /// Panics if `items` is empty. Callers guarantee non-empty input.
    pub fn pick<'a, T>(&mut self, items: &'a [T]) -> &'a T {
        assert!(!items.is_empty(), "pick called on empty slice");
        let idx = self.next_int(0, items.len() as i64 - 1) as usize;
        &items[idx]
    }

    /// Advance the stream by `n` draws without using the values.
    pub fn skip(&mut self, n: usize) {
        for _ in 0..n {
            self.next();
        }
    }

    /// Rewind the generator to its freshly-seeded state.
    pub fn reset(&mut self) {
        self.rng = Pcg64Mcg::seed_from_u64(self.seed);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    // -- 1. Determinism -----------------------------------------------------

    #[test]
    fn same_string_seed_same_sequence() {
        let mut a = GameRng::from_seed("pvp-p1-p2-42");
        let mut b = GameRng::from_seed("pvp-p1-p2-42");
        for _ in 0..100 {
            assert_eq!(a.next().to_bits(), b.next().to_bits());
        }
    }

    #[test]
    fn different_seeds_diverge() {
        let mut a = GameRng::from_seed("alpha");
        let mut b = GameRng::from_seed("beta");
        let va: Vec<u64> = (0..8).map(|_| a.next().to_bits()).collect();
        let vb: Vec<u64> = (0..8).map(|_| b.next().to_bits()).collect();
        assert_ne!(va, vb);
    }

    #[test]
    fn numeric_and_string_seeding_agree_via_hash() {
        // from_seed reduces through SHA-256; reconstructing the numeric seed
        // by hand must give the same stream.
        let s = "composite-seed-xyz";
        let digest = Sha256::digest(s.as_bytes());
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest[..8]);
        let mut a = GameRng::from_seed(s);
        let mut b = GameRng::from_u64(u64::from_le_bytes(bytes));
        for _ in 0..32 {
            assert_eq!(a.next().to_bits(), b.next().to_bits());
        }
    }

    // -- 2. Ranges ----------------------------------------------------------

    #[test]
    fn next_is_unit_interval() {
        let mut rng = GameRng::from_u64(7);
        for _ in 0..1000 {
            let v = rng.next();
            assert!((0.0..1.0).contains(&v), "out of [0,1): {v}");
        }
    }

    #[test]
    fn next_range_respects_bounds() {
        let mut rng = GameRng::from_u64(11);
        for _ in 0..1000 {
            let v = rng.next_range(0.75, 1.25);
            assert!((0.75..1.25).contains(&v), "out of [0.75,1.25): {v}");
        }
    }

    #[test]
    fn next_int_is_inclusive() {
        let mut rng = GameRng::from_u64(13);
        let mut saw_lo = false;
        let mut saw_hi = false;
        for _ in 0..2000 {
            let v = rng.next_int(1, 6);
            assert!((1..=6).contains(&v));
            saw_lo |= v == 1;
            saw_hi |= v == 6;
        }
        assert!(saw_lo && saw_hi, "2000 d6 rolls should hit both ends");
    }

    // -- 3. chance / pick ---------------------------------------------------

    #[test]
    fn chance_extremes() {
        let mut rng = GameRng::from_u64(17);
        for _ in 0..100 {
            assert!(!rng.chance(0.0));
            assert!(rng.chance(1.0));
        }
    }

    #[test]
    fn pick_returns_element_of_slice() {
        let mut rng = GameRng::from_u64(19);
        let items = ["wood", "food", "stone"];
        for _ in 0..50 {
            let p = rng.pick(&items);
            assert!(items.contains(p));
        }
    }

    #[test]
    #[should_panic(expected = "empty slice")]
    fn pick_empty_panics() {
        let mut rng = GameRng::from_u64(23);
        let empty: [u8; 0] = [];
        rng.pick(&empty);
    }

    // -- 4. skip / reset ----------------------------------------------------

    #[test]
    fn skip_advances_by_exactly_n() {
        let mut a = GameRng::from_u64(29);
        let mut b = GameRng::from_u64(29);
        a.skip(5);
        for _ in 0..5 {
            b.next();
        }
        assert_eq!(a.next().to_bits(), b.next().to_bits());
    }

    #[test]
    fn reset_rewinds_to_start() {
        let mut rng = GameRng::from_u64(31);
        let first: Vec<u64> = (0..10).map(|_| rng.next().to_bits()).collect();
        rng.reset();
        let second: Vec<u64> = (0..10).map(|_| rng.next().to_bits()).collect();
        assert_eq!(first, second);
    }

    // -- 5. Property: determinism over arbitrary call sequences -------------

    proptest::proptest! {
        #[test]
        fn determinism_over_mixed_calls(seed in proptest::prelude::any::<u64>(), ops in proptest::collection::vec(0u8..4, 0..64)) {
            let mut a = GameRng::from_u64(seed);
            let mut b = GameRng::from_u64(seed);
            for op in &ops {
                match op {
                    0 => assert_eq!(a.next().to_bits(), b.next().to_bits()),
                    1 => assert_eq!(a.next_range(1.0, 9.0).to_bits(), b.next_range(1.0, 9.0).to_bits()),
                    2 => assert_eq!(a.next_int(0, 100), b.next_int(0, 100)),
                    _ => assert_eq!(a.chance(0.5), b.chance(0.5)),
                }
            }
        }
    }
}
