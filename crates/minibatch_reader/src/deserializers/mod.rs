//! src/deserializers/mod.rs
//!
//! Runtime decoders behind a [`DeserializerConfig`].
//!
//! ```text
//! deserializers/
//! ├── text_format.rs  → CTF parser and writer
//! ├── image.rs        → map file + image pipeline per feature stream
//! └── pool.rs         → crossbeam worker pool used for image decoding
//! ```
//!
//! A deserializer exposes a fixed number of sequences. Reading a set of
//! sequences yields, per stream, one `[len, ...sample_shape]` tensor per
//! requested sequence, in request order.

pub mod image;
pub(crate) mod pool;
pub mod text_format;

use crate::config::DeserializerConfig;
use crate::stream::StreamInfo;
use anyhow::{Context, Result};
use tch::Tensor;

pub use image::ImageDeserializer;
pub use text_format::{
    dense_to_str, sparse_to_str, tensors_to_text_format, TextFormatDeserializer, TextSequence,
};

/// Position of a read inside the source, used to seed per-record randomness.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadContext {
    pub seed: u64,
    pub sweep: u64,
}

pub trait DataDeserializer: Send {
    /// Streams in declaration order; ids are local to this deserializer.
    fn streams(&self) -> &[StreamInfo];

    fn sequence_count(&self) -> usize;

    /// Samples in sequence `index`, the maximum over its streams.
    fn sequence_length(&self, index: usize) -> usize;

    /// Tensors indexed `[stream][position in indices]`.
    fn read_sequences(&self, indices: &[usize], context: ReadContext) -> Result<Vec<Vec<Tensor>>>;
}

/// Opens the decoder a configuration describes.
pub fn open(config: &DeserializerConfig) -> Result<Box<dyn DataDeserializer>> {
    config.validate()?;
    let deserializer: Box<dyn DataDeserializer> = match config {
        DeserializerConfig::TextFormat(config) => Box::new(
            TextFormatDeserializer::open(config)
                .with_context(|| format!("Failed to open text file: {}", config.file.display()))?,
        ),
        DeserializerConfig::Image(config) => Box::new(
            ImageDeserializer::open(config)
                .with_context(|| format!("Failed to open map file: {}", config.file.display()))?,
        ),
    };
    log::debug!(
        "opened {} '{}' with {} sequences",
        config.type_name(),
        config.file().display(),
        deserializer.sequence_count()
    );
    Ok(deserializer)
}
