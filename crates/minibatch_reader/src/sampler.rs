use rand::seq::SliceRandom;
use rand::{rngs::StdRng, SeedableRng};

/// A `Sampler` decides the order in which the sequences of a source are
/// visited during one sweep.
///
/// # Method
/// - `iter(sweep)`: the order for that sweep. Implementations are pure in
///   `sweep`, so a checkpoint only needs the sweep number to rebuild the
///   order.
pub trait Sampler: Send + Sync {
    type Item;

    fn iter(&self, sweep: u64) -> Box<dyn Iterator<Item = Self::Item> + Send + '_>;
}

/// ============================================================================
/// Yields indices in order `(0,1,2,...,size-1)` every sweep.
///
/// # Examples
/// ```ignore
/// let sampler = SequentialSampler::new(5);
/// let indices: Vec<_> = sampler.iter(0).collect();
/// assert_eq!(indices, vec![0, 1, 2, 3, 4]);
/// ```
#[derive(Debug, Clone)]
pub struct SequentialSampler {
    size: usize,
}

impl SequentialSampler {
    pub fn new(size: usize) -> Self {
        Self { size }
    }
}

impl Sampler for SequentialSampler {
    type Item = usize;

    fn iter(&self, _sweep: u64) -> Box<dyn Iterator<Item = usize> + Send + '_> {
        Box::new(0..self.size)
    }
}

/// ============================================================================
/// A fresh permutation of `0..size` per sweep, without replacement.
///
/// # Seed Handling
/// The generator for sweep `s` is seeded with `base_seed + s`: every sweep is
/// shuffled differently, and the same `base_seed` reproduces the same orders.
///
/// # Example usage
/// ```ignore
/// let sampler = RandomSampler::new(1000, 42);
/// let first: Vec<_> = sampler.iter(0).collect();
/// let second: Vec<_> = sampler.iter(1).collect(); // a different permutation
/// ```
#[derive(Debug, Clone)]
pub struct RandomSampler {
    size: usize,
    base_seed: u64,
}

impl RandomSampler {
    pub fn new(size: usize, base_seed: u64) -> Self {
        Self { size, base_seed }
    }

    #[inline]
    fn derive_rng_for_sweep(&self, sweep: u64) -> StdRng {
        StdRng::seed_from_u64(self.base_seed.wrapping_add(sweep))
    }
}

impl Sampler for RandomSampler {
    type Item = usize;

    fn iter(&self, sweep: u64) -> Box<dyn Iterator<Item = usize> + Send + '_> {
        let mut rng = self.derive_rng_for_sweep(sweep);
        let mut indices: Vec<_> = (0..self.size).collect();
        indices.shuffle(&mut rng);
        Box::new(indices.into_iter())
    }
}

/// Sequential or seeded random order over `size` sequences.
pub fn sweep_sampler(
    size: usize,
    randomize: bool,
    seed: u64,
) -> Box<dyn Sampler<Item = usize>> {
    if randomize {
        Box::new(RandomSampler::new(size, seed))
    } else {
        Box::new(SequentialSampler::new(size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    const TEST_SEED: u64 = 42;
    const TEST_SIZE: usize = 100;

    mod sequential_sampler_tests {
        use super::*;

        #[test]
        fn yields_sequential_indices() {
            let sampler = SequentialSampler::new(TEST_SIZE);
            let indices: Vec<usize> = sampler.iter(0).collect();
            assert_eq!(indices, (0..TEST_SIZE).collect::<Vec<_>>());
            assert_eq!(sampler.iter(7).collect::<Vec<_>>(), indices);
        }

        #[test]
        fn handles_empty_source() {
            let sampler = SequentialSampler::new(0);
            assert_eq!(sampler.iter(0).count(), 0);
        }
    }

    mod random_sampler_tests {
        use super::*;

        #[test]
        fn yields_a_permutation() {
            let sampler = RandomSampler::new(TEST_SIZE, TEST_SEED);
            let indices: Vec<usize> = sampler.iter(0).collect();
            assert_eq!(indices.len(), TEST_SIZE);
            let unique: HashSet<_> = indices.iter().collect();
            assert_eq!(unique.len(), TEST_SIZE);
            assert!(indices.iter().all(|&i| i < TEST_SIZE));
        }

        #[test]
        fn same_seed_same_sweep_is_reproducible() {
            let a = RandomSampler::new(TEST_SIZE, TEST_SEED);
            let b = RandomSampler::new(TEST_SIZE, TEST_SEED);
            assert_eq!(a.iter(3).collect::<Vec<_>>(), b.iter(3).collect::<Vec<_>>());
        }

        #[test]
        fn sweeps_and_seeds_differ() {
            let sampler = RandomSampler::new(TEST_SIZE, TEST_SEED);
            let sweep0: Vec<_> = sampler.iter(0).collect();
            let sweep1: Vec<_> = sampler.iter(1).collect();
            assert_ne!(sweep0, sweep1);

            let other = RandomSampler::new(TEST_SIZE, TEST_SEED + 100);
            assert_ne!(sweep0, other.iter(0).collect::<Vec<_>>());
        }
    }

    #[test]
    fn sweep_sampler_dispatches_on_randomize() {
        let ordered: Vec<_> = sweep_sampler(10, false, TEST_SEED).iter(0).collect();
        assert_eq!(ordered, (0..10).collect::<Vec<_>>());

        let shuffled: Vec<_> = sweep_sampler(10, true, TEST_SEED).iter(0).collect();
        let expected: Vec<_> = RandomSampler::new(10, TEST_SEED).iter(0).collect();
        assert_eq!(shuffled, expected);
    }
}
