use crate::error::ReaderError;
use crate::sanitize::Value;
use crate::stream::StreamInfo;
use anyhow::{bail, Result};
use tch::Device;

/// One stream's share of a minibatch.
///
/// `value.data` has shape `[num_sequences, max_len, ...sample_shape]`; when a
/// mask is present it marks the padded steps of shorter sequences.
#[derive(Debug, Clone)]
pub struct MinibatchData {
    pub value: Value,
    pub num_sequences: usize,
    pub num_samples: usize,
    /// The minibatch holds the last sequences of a sweep.
    pub sweep_end: bool,
}

/// Stream → data pairs returned by [`crate::MinibatchSource::next_minibatch`],
/// in stream id order. Empty once the source is exhausted.
#[derive(Debug, Clone, Default)]
pub struct Minibatch {
    streams: Vec<(StreamInfo, MinibatchData)>,
}

impl Minibatch {
    pub(crate) fn new(streams: Vec<(StreamInfo, MinibatchData)>) -> Self {
        Self { streams }
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    /// Data of the stream called `name`.
    pub fn get(&self, name: &str) -> Result<&MinibatchData> {
        let mut matches = self.streams.iter().filter(|(info, _)| info.name == name);
        match (matches.next(), matches.next()) {
            (Some((_, data)), None) => Ok(data),
            (None, _) => bail!(ReaderError::lookup(format!(
                "stream '{}' not found in minibatch",
                name
            ))),
            (Some(_), Some(_)) => bail!(ReaderError::lookup(format!(
                "stream name '{}' is ambiguous in minibatch",
                name
            ))),
        }
    }

    pub fn by_info(&self, info: &StreamInfo) -> Option<&MinibatchData> {
        self.streams
            .iter()
            .find(|(candidate, _)| candidate.id == info.id)
            .map(|(_, data)| data)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&StreamInfo, &MinibatchData)> {
        self.streams.iter().map(|(info, data)| (info, data))
    }

    pub fn into_streams(self) -> Vec<(StreamInfo, MinibatchData)> {
        self.streams
    }

    /// True when any stream reached the end of a sweep.
    pub fn sweep_end(&self) -> bool {
        self.streams.iter().any(|(_, data)| data.sweep_end)
    }
}

/// Size limits for one [`crate::MinibatchSource::next_minibatch`] call.
///
/// A limit of 0 counts as unset. At least one limit must be set.
///
/// # Example
/// ```ignore
/// let request = MinibatchRequest::samples(64).with_sequences(8).on(Device::Cpu);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MinibatchRequest {
    pub size_in_samples: usize,
    pub size_in_sequences: Option<usize>,
    pub device: Option<Device>,
}

impl MinibatchRequest {
    pub fn samples(size_in_samples: usize) -> Self {
        Self {
            size_in_samples,
            ..Self::default()
        }
    }

    pub fn sequences(size_in_sequences: usize) -> Self {
        Self {
            size_in_sequences: Some(size_in_sequences),
            ..Self::default()
        }
    }

    pub fn with_samples(mut self, size_in_samples: usize) -> Self {
        self.size_in_samples = size_in_samples;
        self
    }

    pub fn with_sequences(mut self, size_in_sequences: usize) -> Self {
        self.size_in_sequences = Some(size_in_sequences);
        self
    }

    pub fn on(mut self, device: Device) -> Self {
        self.device = Some(device);
        self
    }

    /// `(samples, sequences)` limits with 0 mapped to `None`.
    pub(crate) fn limits(&self) -> Result<(Option<usize>, Option<usize>)> {
        let samples = Some(self.size_in_samples).filter(|&n| n > 0);
        let sequences = self.size_in_sequences.filter(|&n| n > 0);
        if samples.is_none() && sequences.is_none() {
            bail!(ReaderError::config(
                "minibatch size must be set in samples or in sequences"
            ));
        }
        Ok((samples, sequences))
    }
}

#[cfg(test)]
mod minibatch_test {
    use super::*;
    use crate::stream::{ElementType, StorageFormat};
    use tch::{Kind, Tensor};

    fn info(id: usize, name: &str) -> StreamInfo {
        StreamInfo {
            id,
            name: name.to_string(),
            storage: StorageFormat::Dense,
            element_type: ElementType::Float32,
            dimension: Some(2),
            sample_shape: vec![2],
        }
    }

    fn data(sweep_end: bool) -> MinibatchData {
        MinibatchData {
            value: Value::new(Tensor::zeros(&[1, 1, 2], (Kind::Float, Device::Cpu))),
            num_sequences: 1,
            num_samples: 1,
            sweep_end,
        }
    }

    #[test]
    fn test_get_by_name() -> Result<()> {
        let batch = Minibatch::new(vec![(info(0, "x"), data(false)), (info(1, "y"), data(true))]);
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.get("y")?.num_samples, 1);
        assert!(batch.sweep_end());
        assert!(batch.by_info(&info(0, "x")).is_some());

        let err = batch.get("z").unwrap_err();
        assert!(matches!(ReaderError::of(&err), Some(ReaderError::Lookup(_))));
        Ok(())
    }

    #[test]
    fn test_ambiguous_name() {
        let batch = Minibatch::new(vec![(info(0, "x"), data(false)), (info(1, "x"), data(false))]);
        let err = batch.get("x").unwrap_err();
        assert!(err.to_string().contains("ambiguous"));
    }

    #[test]
    fn test_request_limits() -> Result<()> {
        assert_eq!(MinibatchRequest::samples(8).limits()?, (Some(8), None));
        assert_eq!(
            MinibatchRequest::sequences(2).with_samples(0).limits()?,
            (None, Some(2))
        );
        for unset in [MinibatchRequest::default(), MinibatchRequest::sequences(0)] {
            let err = unset.limits().unwrap_err();
            assert!(matches!(ReaderError::of(&err), Some(ReaderError::Config(_))));
        }
        Ok(())
    }
}
