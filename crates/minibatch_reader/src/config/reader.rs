//! src/config/reader.rs
//!
//! Configuration for a minibatch source.
//!
//! A `ReaderConfig` bundles the deserializers with the sweep settings. It is
//! consumed once by [`ReaderConfig::minibatch_source`]:
//! ```ignore
//! let source = ReaderConfig::builder()
//!     .deserializer(images)
//!     .randomize(false)
//!     .epoch_size(EpochSize::FullDataSweep)
//!     .build()
//!     .minibatch_source()?;
//! ```
//!
//! The same configuration can be written as a dictionary:
//! ```text
//! { "epochSize": 18446744073709551615, "randomize": true, "randomSeed": 0,
//!   "deserializers": [ { "type": "CNTKTextFormatDeserializer", "file": "train.ctf",
//!                        "input": { "features": { "dim": 3, "format": "dense", "alias": "x" } } } ] }
//! ```

use super::deserializer::DeserializerConfig;
use crate::error::ReaderError;
use crate::source::{MinibatchSource, WorkerPartition};
use anyhow::{Context, Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::error::Category;
use std::path::Path;

/// How many samples make up one epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "u64", into = "u64")]
pub enum EpochSize {
    /// Sweep over the data forever.
    #[default]
    InfinitelyRepeat,
    /// Stop after one pass over every sequence.
    FullDataSweep,
    /// Stop after this many samples.
    Samples(u64),
}

impl EpochSize {
    pub const INFINITELY_REPEAT: u64 = u64::MAX;
    pub const FULL_DATA_SWEEP: u64 = u64::MAX - 2;
}

impl From<u64> for EpochSize {
    /// `0` means one full sweep, as do the reserved sentinel values.
    fn from(size: u64) -> Self {
        match size {
            Self::INFINITELY_REPEAT => Self::InfinitelyRepeat,
            0 | Self::FULL_DATA_SWEEP => Self::FullDataSweep,
            samples => Self::Samples(samples),
        }
    }
}

impl From<EpochSize> for u64 {
    fn from(size: EpochSize) -> Self {
        match size {
            EpochSize::InfinitelyRepeat => EpochSize::INFINITELY_REPEAT,
            EpochSize::FullDataSweep => EpochSize::FULL_DATA_SWEEP,
            EpochSize::Samples(samples) => samples,
        }
    }
}

fn default_randomize() -> bool {
    true
}

/// Deserializers plus the sweep settings of a minibatch source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReaderConfig {
    pub deserializers: Vec<DeserializerConfig>,
    /// Shuffle the sequence order of every sweep.
    #[serde(default = "default_randomize")]
    pub randomize: bool,
    #[serde(rename = "epochSize", default)]
    pub epoch_size: EpochSize,
    /// Base seed for sweep shuffling and random transforms.
    #[serde(rename = "randomSeed", default)]
    pub seed: u64,
}

impl ReaderConfig {
    pub fn new(deserializers: Vec<DeserializerConfig>) -> Self {
        Self {
            deserializers,
            randomize: default_randomize(),
            epoch_size: EpochSize::default(),
            seed: 0,
        }
    }

    pub fn builder() -> ReaderConfigBuilder {
        ReaderConfigBuilder::default()
    }

    /// The dictionary form of this configuration.
    pub fn to_dictionary(&self) -> Result<serde_json::Value> {
        serde_json::to_value(self).context("Failed to serialize reader configuration")
    }

    /// Parses and validates the dictionary form.
    pub fn from_dictionary(dictionary: serde_json::Value) -> Result<Self> {
        let config: Self = serde_json::from_value(dictionary).map_err(|err| {
            Error::new(ReaderError::config(format!(
                "malformed reader configuration: {}",
                err
            )))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Parses JSON text straight into the configuration, so a stream name
    /// written twice in one `input` map is still seen and rejected.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text).map_err(|err| {
            let problem = match err.classify() {
                Category::Data => "malformed reader configuration",
                _ => "reader configuration is not valid JSON",
            };
            Error::new(ReaderError::config(format!("{}: {}", problem, err)))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read reader configuration: {}", path.display()))?;
        Self::from_json_str(&text)
            .with_context(|| format!("Invalid reader configuration: {}", path.display()))
    }

    /// Checks every deserializer. An empty list is left to the source.
    pub fn validate(&self) -> Result<()> {
        for (index, deserializer) in self.deserializers.iter().enumerate() {
            deserializer.validate().with_context(|| {
                format!(
                    "deserializer #{} ({} '{}')",
                    index,
                    deserializer.type_name(),
                    deserializer.file().display()
                )
            })?;
        }
        Ok(())
    }

    /// Consumes the configuration into a single-worker minibatch source.
    pub fn minibatch_source(self) -> Result<MinibatchSource> {
        MinibatchSource::new(self)
    }

    /// Consumes the configuration into the share of one distributed worker.
    pub fn minibatch_source_with_partition(self, partition: WorkerPartition) -> Result<MinibatchSource> {
        MinibatchSource::with_partition(self, partition)
    }
}

impl From<DeserializerConfig> for ReaderConfig {
    fn from(deserializer: DeserializerConfig) -> Self {
        Self::new(vec![deserializer])
    }
}

impl From<Vec<DeserializerConfig>> for ReaderConfig {
    fn from(deserializers: Vec<DeserializerConfig>) -> Self {
        Self::new(deserializers)
    }
}

/// Builder for ReaderConfig with method chaining
pub struct ReaderConfigBuilder {
    config: ReaderConfig,
}

impl Default for ReaderConfigBuilder {
    fn default() -> Self {
        Self {
            config: ReaderConfig::new(Vec::new()),
        }
    }
}

impl ReaderConfigBuilder {
    /// Appends one deserializer.
    pub fn deserializer(mut self, deserializer: DeserializerConfig) -> Self {
        self.config.deserializers.push(deserializer);
        self
    }

    pub fn deserializers(mut self, deserializers: impl IntoIterator<Item = DeserializerConfig>) -> Self {
        self.config.deserializers.extend(deserializers);
        self
    }

    pub fn randomize(mut self, randomize: bool) -> Self {
        self.config.randomize = randomize;
        self
    }

    pub fn epoch_size(mut self, epoch_size: impl Into<EpochSize>) -> Self {
        self.config.epoch_size = epoch_size.into();
        self
    }

    /// Set the random seed for reproducible sweeps and transforms.
    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = seed;
        self
    }

    pub fn build(self) -> ReaderConfig {
        self.config
    }
}
