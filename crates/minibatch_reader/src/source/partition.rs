use crate::error::ReaderError;
use anyhow::{ensure, Result};

/// Position of this process among the workers reading one source.
///
/// Worker `rank` takes every `num_workers`-th sequence of each sweep order,
/// starting at `rank`, so the shares of all workers are disjoint and cover
/// the whole sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkerPartition {
    rank: usize,
    num_workers: usize,
}

impl WorkerPartition {
    pub fn new(rank: usize, num_workers: usize) -> Result<Self> {
        ensure!(
            num_workers > 0,
            ReaderError::config("number of workers must be positive")
        );
        ensure!(
            rank < num_workers,
            ReaderError::config(format!(
                "worker rank {} is out of range for {} workers",
                rank, num_workers
            ))
        );
        Ok(Self { rank, num_workers })
    }

    pub fn single() -> Self {
        Self {
            rank: 0,
            num_workers: 1,
        }
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn num_workers(&self) -> usize {
        self.num_workers
    }

    /// This worker's share of a sweep order.
    pub fn share(&self, order: impl IntoIterator<Item = usize>) -> Vec<usize> {
        order
            .into_iter()
            .skip(self.rank)
            .step_by(self.num_workers)
            .collect()
    }

    /// Length of [`Self::share`] for an order of `total` sequences.
    pub fn share_len(&self, total: usize) -> usize {
        if self.rank >= total {
            0
        } else {
            (total - self.rank).div_ceil(self.num_workers)
        }
    }

    /// This worker's part of a sample budget; remainders go to the lowest ranks.
    pub fn budget_share(&self, total: u64) -> u64 {
        let workers = self.num_workers as u64;
        total / workers + u64::from((self.rank as u64) < total % workers)
    }
}

impl Default for WorkerPartition {
    fn default() -> Self {
        Self::single()
    }
}
