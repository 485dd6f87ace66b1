//! Seedable PRNG and sampling helpers for the simulator.
//!
//! The whole workspace draws randomness from [`Xoroshiro128Plus`], a small
//! non-cryptographic generator with a 128-bit state. It implements the
//! `rand_core` traits, so the `rand` adapters (ranges, shuffles) work on it
//! directly. Generators are always passed explicitly as `&mut` parameters;
//! there is no hidden global RNG, which keeps single-threaded runs
//! reproducible from a seed.
//!
//! Besides the generator itself this crate provides the two sampling
//! primitives the drivers need:
//!
//! - [`sample_distinct`]: k distinct values from `[0, bound)` with exclusions
//! - [`choose_weighted`]: index selection over a prefix-sum weight table

use rand_core::impls;
use std::collections::HashSet;

pub use rand_core::{Error, RngCore, SeedableRng};

/// xoroshiro128+ generator (<http://xoroshiro.di.unimi.it/>).
///
/// Fast, tiny state, good statistical quality for simulation workloads.
/// Not suitable for cryptographic use.
#[derive(Debug, Clone)]
pub struct Xoroshiro128Plus {
    s: [u64; 2],
}

impl Xoroshiro128Plus {
    /// Build a generator directly from the two state words.
    ///
    /// An all-zero state would make the generator emit zeros forever, so it
    /// is silently bumped to the canonical `(1, 0)` starting state.
    pub fn from_pair(s0: u64, s1: u64) -> Self {
        if s0 == 0 && s1 == 0 {
            Self { s: [1, 0] }
        } else {
            Self { s: [s0, s1] }
        }
    }

    #[inline]
    fn rotl(x: u64, k: u32) -> u64 {
        (x << k) | (x >> (64 - k))
    }
}

impl Default for Xoroshiro128Plus {
    fn default() -> Self {
        Self::from_pair(1, 0)
    }
}

impl RngCore for Xoroshiro128Plus {
    #[inline]
    fn next_u32(&mut self) -> u32 {
        // The high bits of xoroshiro+ have better statistical quality.
        (self.next_u64() >> 32) as u32
    }

    #[inline]
    fn next_u64(&mut self) -> u64 {
        let s0 = self.s[0];
        let mut s1 = self.s[1];
        let result = s0.wrapping_add(s1);
        s1 ^= s0;
        self.s[0] = Self::rotl(s0, 55) ^ s1 ^ (s1 << 14);
        self.s[1] = Self::rotl(s1, 36);
        result
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        impls::fill_bytes_via_next(self, dest)
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}

impl SeedableRng for Xoroshiro128Plus {
    type Seed = [u8; 16];

    fn from_seed(seed: Self::Seed) -> Self {
        let mut lo = [0u8; 8];
        let mut hi = [0u8; 8];
        lo.copy_from_slice(&seed[..8]);
        hi.copy_from_slice(&seed[8..]);
        Self::from_pair(u64::from_le_bytes(lo), u64::from_le_bytes(hi))
    }
}

/// Draw `count` distinct values from `[0, bound)`, avoiding `excluded`.
///
/// When fewer than `count` admissible values exist, all of them are returned
/// (in random order). Small requests use rejection sampling; requests close
/// to the population size fall back to a partial shuffle of the admissible
/// values so the call always terminates.
pub fn sample_distinct<R: RngCore>(
    rng: &mut R,
    count: usize,
    bound: u64,
    excluded: &[u64],
) -> Vec<u64> {
    let excluded: HashSet<u64> = excluded.iter().copied().collect();
    let available = (bound as usize).saturating_sub(excluded.len());
    let count = count.min(available);
    if count == 0 {
        return Vec::new();
    }

    // Rejection sampling is only efficient while the hit rate stays high.
    if count * 2 <= available {
        let mut picked = HashSet::with_capacity(count);
        let mut out = Vec::with_capacity(count);
        while out.len() < count {
            let v = rng.next_u64() % bound;
            if !excluded.contains(&v) && picked.insert(v) {
                out.push(v);
            }
        }
        return out;
    }

    // Dense request: materialize the admissible values and partially shuffle.
    let mut pool: Vec<u64> = (0..bound).filter(|v| !excluded.contains(v)).collect();
    for i in 0..count {
        let j = i + (rng.next_u64() as usize) % (pool.len() - i);
        pool.swap(i, j);
    }
    pool.truncate(count);
    pool
}

/// Pick an index according to a prefix-sum weight table.
///
/// `prefix_sums` must be non-decreasing with a positive last element; entry
/// `i` is chosen with probability proportional to
/// `prefix_sums[i] - prefix_sums[i - 1]`. Zero-width entries are never
/// selected.
pub fn choose_weighted<R: RngCore>(rng: &mut R, prefix_sums: &[u64]) -> usize {
    let total = *prefix_sums
        .last()
        .expect("choose_weighted: empty weight table");
    assert!(total > 0, "choose_weighted: all weights are zero");
    let r = rng.next_u64() % total;
    prefix_sums.partition_point(|&p| p <= r)
}
