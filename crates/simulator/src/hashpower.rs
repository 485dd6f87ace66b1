//! Hash-power assignment.
//!
//! Miners draw their power from a weighted distribution of device classes
//! (consumer CPUs through several ASIC generations, each worth 10x the
//! previous). Raw draws rarely hit the requested coalition share, so a
//! rebalance loop replaces outlier draws until the selfish share lands
//! within one percentage point of the target.

use distsim_rng::{choose_weighted, RngCore};
use rand::seq::SliceRandom;
use thiserror::Error;

/// Prefix sums of the relative frequency of each device class.
const DEVICE_CLASS_WEIGHTS: [u64; 6] = [
    0b0100000, // CPU
    0b1000000, // GPU
    0b1001000, // FPGA
    0b1001100, // ASIC
    0b1001110, // ASIC, second generation
    0b1001111, // ASIC, third generation
];

#[derive(Debug, Error)]
pub enum HashPowerError {
    #[error("a selfish power share of {share} needs at least one selfish miner")]
    NoSelfishMiners { share: f64 },
}

fn draw_power<R: RngCore>(rng: &mut R) -> u64 {
    let class = choose_weighted(rng, &DEVICE_CLASS_WEIGHTS) as u32;
    (rng.next_u64() % 9 + 1) * 10u64.pow(class)
}

fn replace_at<R: RngCore>(rng: &mut R, powers: &mut [u64], total: &mut u64, index: usize) {
    *total -= powers[index];
    powers[index] = draw_power(rng);
    *total += powers[index];
}

fn replace_min<R: RngCore>(rng: &mut R, powers: &mut [u64], total: &mut u64) {
    let index = powers
        .iter()
        .enumerate()
        .min_by_key(|&(_, &p)| p)
        .map(|(i, _)| i);
    if let Some(index) = index {
        replace_at(rng, powers, total, index);
    }
}

fn replace_max<R: RngCore>(rng: &mut R, powers: &mut [u64], total: &mut u64) {
    let index = powers
        .iter()
        .enumerate()
        .max_by_key(|&(_, &p)| p)
        .map(|(i, _)| i);
    if let Some(index) = index {
        replace_at(rng, powers, total, index);
    }
}

/// Draw per-miner hash powers so the selfish coalition controls roughly
/// `selfish_share` of the total (within ±1%).
///
/// Returns `(honest_powers, selfish_powers)`, both shuffled.
pub fn assign_hash_power<R: RngCore>(
    rng: &mut R,
    num_honest: u64,
    num_selfish: u64,
    selfish_share: f64,
) -> Result<(Vec<u64>, Vec<u64>), HashPowerError> {
    if selfish_share != 0.0 && num_selfish == 0 {
        return Err(HashPowerError::NoSelfishMiners {
            share: selfish_share,
        });
    }
    let mut honest: Vec<u64> = (0..num_honest).map(|_| draw_power(rng)).collect();
    let mut selfish: Vec<u64> = (0..num_selfish).map(|_| draw_power(rng)).collect();
    let mut honest_total: u64 = honest.iter().sum();
    let mut selfish_total: u64 = selfish.iter().sum();

    // With only one side populated the ratio is forced; don't churn draws.
    if num_honest > 0 && num_selfish > 0 {
        loop {
            let total = (honest_total + selfish_total) as f64;
            if (selfish_total as f64) < total * (selfish_share - 0.01) {
                // Coalition too weak: redraw its weakest or the strongest honest draw.
                if rng.next_u64() % 2 == 1 {
                    replace_min(rng, &mut selfish, &mut selfish_total);
                } else {
                    replace_max(rng, &mut honest, &mut honest_total);
                }
            } else if selfish_total as f64 > total * (selfish_share + 0.01) {
                if rng.next_u64() % 2 == 1 {
                    replace_max(rng, &mut selfish, &mut selfish_total);
                } else {
                    replace_min(rng, &mut honest, &mut honest_total);
                }
            } else {
                break;
            }
        }
    }

    honest.shuffle(rng);
    selfish.shuffle(rng);
    Ok((honest, selfish))
}
