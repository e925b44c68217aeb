use super::bundler::Bundler;
use super::checkpoint::CheckpointState;
use super::collator::{Collator, PaddingCollator};
use super::minibatch::{Minibatch, MinibatchData, MinibatchRequest};
use super::partition::WorkerPartition;
use crate::config::{EpochSize, ReaderConfig, TextFormatDeserializerBuilder};
use crate::deserializers::{self, ReadContext};
use crate::device::default_device;
use crate::error::ReaderError;
use crate::sampler::{sweep_sampler, Sampler};
use crate::stream::{StorageFormat, StreamConfiguration, StreamInfo};
use anyhow::{bail, ensure, Context, Result};
use std::collections::HashMap;
use std::hash::Hash;
use std::path::Path;

/// Whether a source still has data for the current epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceState {
    Ready,
    Exhausted,
}

/// Pull-based reader that turns deserialized sequences into padded,
/// masked, device-resident minibatches.
///
/// Sequences are visited in sweeps. Each sweep has its own order (shuffled
/// when `randomize` is set, from `seed` and the sweep number), of which a
/// worker reads its [`WorkerPartition`] share. A minibatch never spans two
/// sweeps; the last one of a sweep has `sweep_end` set.
///
/// # Example
/// ```ignore
/// let mut source = MinibatchSource::text_format(
///     "train.ctf",
///     &[StreamConfiguration::new("features", 3), StreamConfiguration::new("labels", 2)],
///     EpochSize::FullDataSweep,
///     false,
/// )?;
/// loop {
///     let batch = source.next_minibatch(MinibatchRequest::samples(64))?;
///     if batch.is_empty() {
///         break;
///     }
///     let features = batch.get("features")?;
/// }
/// ```
pub struct MinibatchSource {
    bundler: Bundler,
    sampler: Box<dyn Sampler<Item = usize>>,
    collator: Box<dyn Collator>,
    partition: WorkerPartition,
    epoch_size: EpochSize,
    randomize: bool,
    seed: u64,

    sweep: u64,
    position: usize,
    samples_seen: u64,
    order: Vec<usize>,
    order_sweep: Option<u64>,
}

impl MinibatchSource {
    pub fn new(config: ReaderConfig) -> Result<Self> {
        Self::with_partition(config, WorkerPartition::single())
    }

    /// Opens every deserializer of `config` and reads the share of worker
    /// `partition`.
    pub fn with_partition(config: ReaderConfig, partition: WorkerPartition) -> Result<Self> {
        config.validate()?;
        let deserializers = config
            .deserializers
            .iter()
            .map(deserializers::open)
            .collect::<Result<Vec<_>>>()?;
        let bundler = Bundler::new(deserializers)?;
        let sampler = sweep_sampler(bundler.sequence_count(), config.randomize, config.seed);

        log::info!(
            "minibatch source: {} streams, {} sequences, randomize={}, epoch size {:?}, worker {}/{}",
            bundler.streams().len(),
            bundler.sequence_count(),
            config.randomize,
            config.epoch_size,
            partition.rank(),
            partition.num_workers()
        );
        if partition.share_len(bundler.sequence_count()) == 0 {
            log::warn!(
                "minibatch source has no sequences for worker {}/{}",
                partition.rank(),
                partition.num_workers()
            );
        }

        Ok(Self {
            bundler,
            sampler,
            collator: Box::new(PaddingCollator),
            partition,
            epoch_size: config.epoch_size,
            randomize: config.randomize,
            seed: config.seed,
            sweep: 0,
            position: 0,
            samples_seen: 0,
            order: Vec::new(),
            order_sweep: None,
        })
    }

    /// A source over one text-format file.
    pub fn text_format(
        path: impl AsRef<Path>,
        streams: &[StreamConfiguration],
        epoch_size: impl Into<EpochSize>,
        randomize: bool,
    ) -> Result<Self> {
        Self::text_format_with_partition(
            path,
            streams,
            epoch_size,
            randomize,
            WorkerPartition::single(),
        )
    }

    /// [`Self::text_format`] reading the share of one distributed worker.
    pub fn text_format_with_partition(
        path: impl AsRef<Path>,
        streams: &[StreamConfiguration],
        epoch_size: impl Into<EpochSize>,
        randomize: bool,
        partition: WorkerPartition,
    ) -> Result<Self> {
        let mut builder = TextFormatDeserializerBuilder::new(path.as_ref());
        for stream in streams {
            let alias = (!stream.stream_alias.is_empty()).then_some(stream.stream_alias.as_str());
            builder = builder.map_input(
                stream.name.as_str(),
                stream.dimension,
                StorageFormat::from_sparse_flag(stream.is_sparse),
                alias,
            );
        }
        ReaderConfig::builder()
            .deserializer(builder.build()?)
            .randomize(randomize)
            .epoch_size(epoch_size)
            .build()
            .minibatch_source_with_partition(partition)
    }

    /// Replaces the default [`PaddingCollator`].
    pub fn with_collator(mut self, collator: impl Collator + 'static) -> Self {
        self.collator = Box::new(collator);
        self
    }

    pub fn stream_infos(&self) -> &[StreamInfo] {
        self.bundler.streams()
    }

    /// The stream called `name`; it must be unique in the source.
    pub fn stream_info(&self, name: &str) -> Result<&StreamInfo> {
        let mut matches = self.stream_infos().iter().filter(|info| info.name == name);
        match (matches.next(), matches.next()) {
            (Some(info), None) => Ok(info),
            (None, _) => bail!(ReaderError::lookup(format!(
                "stream '{}' does not exist in the minibatch source",
                name
            ))),
            (Some(_), Some(_)) => bail!(ReaderError::lookup(format!(
                "stream name '{}' is ambiguous in the minibatch source",
                name
            ))),
        }
    }

    pub fn partition(&self) -> WorkerPartition {
        self.partition
    }

    pub fn state(&self) -> SourceState {
        if self.partition.share_len(self.bundler.sequence_count()) == 0 {
            return SourceState::Exhausted;
        }
        let exhausted = match self.epoch_size {
            EpochSize::InfinitelyRepeat => false,
            EpochSize::FullDataSweep => self.sweep >= 1,
            EpochSize::Samples(total) => self.samples_seen >= self.partition.budget_share(total),
        };
        if exhausted {
            SourceState::Exhausted
        } else {
            SourceState::Ready
        }
    }

    /// Samples left in the epoch, `None` when only sweeps bound it.
    fn remaining_budget(&self) -> Option<u64> {
        match self.epoch_size {
            EpochSize::Samples(total) => Some(
                self.partition
                    .budget_share(total)
                    .saturating_sub(self.samples_seen),
            ),
            _ => None,
        }
    }

    fn ensure_order(&mut self) {
        if self.order_sweep != Some(self.sweep) {
            self.order = self.partition.share(self.sampler.iter(self.sweep));
            self.order_sweep = Some(self.sweep);
            log::debug!(
                "sweep {}: {} sequences for this worker",
                self.sweep,
                self.order.len()
            );
        }
    }

    /// Next sequences of the current sweep that fit the request. At least one
    /// sequence is taken when any remains.
    fn pick(&self, sample_limit: Option<u64>, sequence_limit: Option<usize>) -> (Vec<usize>, u64) {
        let mut picked = Vec::new();
        let mut samples = 0u64;
        for &index in &self.order[self.position..] {
            let len = self.bundler.sequence_length(index) as u64;
            if !picked.is_empty() {
                if sequence_limit.is_some_and(|limit| picked.len() >= limit) {
                    break;
                }
                if sample_limit.is_some_and(|limit| samples + len > limit) {
                    break;
                }
            }
            picked.push(index);
            samples += len;
        }
        (picked, samples)
    }

    /// Reads the next minibatch; empty when the epoch is exhausted.
    pub fn next_minibatch(&mut self, request: MinibatchRequest) -> Result<Minibatch> {
        let (sample_limit, sequence_limit) = request.limits()?;
        let device = request.device.unwrap_or_else(default_device);
        if self.state() == SourceState::Exhausted {
            return Ok(Minibatch::default());
        }

        self.ensure_order();
        let sample_limit = match (sample_limit.map(|n| n as u64), self.remaining_budget()) {
            (Some(requested), Some(left)) => Some(requested.min(left)),
            (requested, left) => requested.or(left),
        };
        let (picked, samples) = self.pick(sample_limit, sequence_limit);

        let context = ReadContext {
            seed: self.seed,
            sweep: self.sweep,
        };
        let tensors = self.bundler.read(&picked, context)?;
        let sweep_end = self.position + picked.len() == self.order.len();

        let mut streams = Vec::with_capacity(tensors.len());
        for (info, sequences) in self.bundler.streams().iter().zip(tensors) {
            let value = self
                .collator
                .collate(&sequences, device)
                .with_context(|| format!("Failed to collate stream '{}'", info.name))?;
            let num_samples = sequences.iter().map(|s| s.size()[0] as usize).sum();
            streams.push((
                info.clone(),
                MinibatchData {
                    value,
                    num_sequences: picked.len(),
                    num_samples,
                    sweep_end,
                },
            ));
        }

        self.position += picked.len();
        self.samples_seen += samples;
        if sweep_end {
            log::debug!("sweep {} finished after {} samples", self.sweep, self.samples_seen);
            self.sweep += 1;
            self.position = 0;
        }
        Ok(Minibatch::new(streams))
    }

    /// Like [`Self::next_minibatch`], keyed by the caller's keys.
    ///
    /// Every stream name is resolved before anything is read. Returns `None`
    /// when the epoch is exhausted.
    pub fn next_minibatch_mapped<K>(
        &mut self,
        request: MinibatchRequest,
        input_map: &HashMap<K, String>,
    ) -> Result<Option<HashMap<K, MinibatchData>>>
    where
        K: Eq + Hash + Clone,
    {
        let resolved = input_map
            .iter()
            .map(|(key, name)| Ok((key.clone(), self.stream_info(name)?.clone())))
            .collect::<Result<Vec<_>>>()?;

        let minibatch = self.next_minibatch(request)?;
        if minibatch.is_empty() {
            return Ok(None);
        }
        let mut mapped = HashMap::with_capacity(resolved.len());
        for (key, info) in resolved {
            let data = minibatch
                .by_info(&info)
                .with_context(|| format!("stream '{}' missing from minibatch", info.name))?;
            mapped.insert(key, data.clone());
        }
        Ok(Some(mapped))
    }

    pub fn get_checkpoint_state(&self) -> CheckpointState {
        CheckpointState {
            sweep: self.sweep,
            position: self.position,
            samples_seen: self.samples_seen,
            seed: self.seed,
            randomize: self.randomize,
            num_sequences: self.bundler.sequence_count(),
        }
    }

    /// Moves the read position to `state`. Restoring the same state twice
    /// has the same effect as restoring it once.
    pub fn restore_from_checkpoint(&mut self, state: &CheckpointState) -> Result<()> {
        ensure!(
            state.num_sequences == self.bundler.sequence_count(),
            ReaderError::config(format!(
                "checkpoint was taken from a source with {} sequences, this one has {}",
                state.num_sequences,
                self.bundler.sequence_count()
            ))
        );
        ensure!(
            state.seed == self.seed && state.randomize == self.randomize,
            ReaderError::config(format!(
                "checkpoint ordering (seed {}, randomize {}) does not match the source (seed {}, randomize {})",
                state.seed, state.randomize, self.seed, self.randomize
            ))
        );
        let share_len = self.partition.share_len(self.bundler.sequence_count());
        ensure!(
            state.position < share_len.max(1),
            ReaderError::config(format!(
                "checkpoint position {} is outside the worker's {} sequences",
                state.position, share_len
            ))
        );

        self.sweep = state.sweep;
        self.position = state.position;
        self.samples_seen = state.samples_seen;
        log::debug!(
            "restored checkpoint: sweep {}, position {}, {} samples seen",
            self.sweep,
            self.position,
            self.samples_seen
        );
        Ok(())
    }
}

impl std::fmt::Debug for MinibatchSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MinibatchSource")
            .field("streams", &self.bundler.streams())
            .field("partition", &self.partition)
            .field("epoch_size", &self.epoch_size)
            .field("checkpoint", &self.get_checkpoint_state())
            .finish()
    }
}
