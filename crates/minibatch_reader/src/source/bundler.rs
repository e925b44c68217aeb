use crate::deserializers::{DataDeserializer, ReadContext};
use crate::error::ReaderError;
use crate::stream::StreamInfo;
use anyhow::{ensure, Context, Result};
use tch::Tensor;

/// Joins several deserializers into one row-aligned source.
///
/// Sequence `i` of the bundle is sequence `i` of every deserializer. Stream
/// ids are renumbered so they are unique across the bundle, in declaration
/// order.
pub(crate) struct Bundler {
    deserializers: Vec<Box<dyn DataDeserializer>>,
    streams: Vec<StreamInfo>,
    sequence_count: usize,
}

impl Bundler {
    pub(crate) fn new(deserializers: Vec<Box<dyn DataDeserializer>>) -> Result<Self> {
        let mut streams = Vec::new();
        for deserializer in &deserializers {
            for info in deserializer.streams() {
                streams.push(StreamInfo {
                    id: streams.len(),
                    ..info.clone()
                });
            }
        }
        ensure!(!streams.is_empty(), ReaderError::config("no input streams"));

        let sequence_count = deserializers[0].sequence_count();
        for (index, deserializer) in deserializers.iter().enumerate().skip(1) {
            ensure!(
                deserializer.sequence_count() == sequence_count,
                ReaderError::config(format!(
                    "deserializer #{} has {} sequences but deserializer #0 has {}",
                    index,
                    deserializer.sequence_count(),
                    sequence_count
                ))
            );
        }

        Ok(Self {
            deserializers,
            streams,
            sequence_count,
        })
    }

    pub(crate) fn streams(&self) -> &[StreamInfo] {
        &self.streams
    }

    pub(crate) fn sequence_count(&self) -> usize {
        self.sequence_count
    }

    /// Samples in sequence `index`, the maximum over all streams.
    pub(crate) fn sequence_length(&self, index: usize) -> usize {
        self.deserializers
            .iter()
            .map(|d| d.sequence_length(index))
            .max()
            .unwrap_or(0)
    }

    /// Tensors indexed `[bundle stream id][position in indices]`.
    pub(crate) fn read(&self, indices: &[usize], context: ReadContext) -> Result<Vec<Vec<Tensor>>> {
        let mut per_stream = Vec::with_capacity(self.streams.len());
        for (index, deserializer) in self.deserializers.iter().enumerate() {
            let read = deserializer
                .read_sequences(indices, context)
                .with_context(|| format!("Failed to read from deserializer #{}", index))?;
            per_stream.extend(read);
        }
        Ok(per_stream)
    }
}
