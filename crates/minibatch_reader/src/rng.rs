//! Thread-local randomness for per-record transforms.
//!
//! Random crops and ratio jitter must not depend on which thread decodes a
//! record, so the generator is re-seeded from the record itself before its
//! transforms run.

use rand::rngs::StdRng;
use rand::{Rng as _, SeedableRng};
use std::cell::RefCell;

thread_local! {
    static RECORD_RNG: RefCell<Option<StdRng>> = const { RefCell::new(None) };
}

/// Seeds this thread's generator for one record.
/// Seed formula: base_seed + (sweep << 32) + index
pub fn init_record_rng(base_seed: u64, sweep: u64, index: usize) {
    let seed = base_seed
        .wrapping_add(sweep << 32)
        .wrapping_add(index as u64);
    RECORD_RNG.with(|rng| *rng.borrow_mut() = Some(StdRng::seed_from_u64(seed)));
}

/// Uniform draw from `[low, high]`, from the record generator when seeded.
pub fn gen_f64(low: f64, high: f64) -> f64 {
    if low >= high {
        return low;
    }
    RECORD_RNG.with(|rng| match rng.borrow_mut().as_mut() {
        Some(rng) => rng.random_range(low..=high),
        None => rand::rng().random_range(low..=high),
    })
}

/// Uniform draw from `0..=max`.
pub fn gen_offset(max: u32) -> u32 {
    if max == 0 {
        return 0;
    }
    RECORD_RNG.with(|rng| match rng.borrow_mut().as_mut() {
        Some(rng) => rng.random_range(0..=max),
        None => rand::rng().random_range(0..=max),
    })
}
