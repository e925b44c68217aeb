use crate::sanitize::{pad_to_dense, Mask, Value};
use anyhow::Result;
use tch::{Device, Tensor};

/// A `Collator` defines how the sequences one stream contributes to a
/// minibatch are combined into a single [`Value`].
pub trait Collator: Send + Sync {
    fn collate(&self, sequences: &[Tensor], device: Device) -> Result<Value>;
}

/// Zero-pads `[len, ...sample_shape]` sequences to the longest one.
///
/// The result is `[num_sequences, max_len, ...sample_shape]`. A mask is
/// attached whenever `max_len > 1`; every row starts a new sequence.
///
/// # Example
/// ```ignore
/// // lengths [3, 1] -> data [2, 3, dim], mask rows [2, 1, 1] and [2, 0, 0]
/// let value = PaddingCollator.collate(&sequences, Device::Cpu)?;
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct PaddingCollator;

impl Collator for PaddingCollator {
    fn collate(&self, sequences: &[Tensor], device: Device) -> Result<Value> {
        let data = pad_to_dense(sequences)?.to_device(device);
        let lengths: Vec<usize> = sequences.iter().map(|s| s.size()[0] as usize).collect();
        let max_len = lengths.iter().copied().max().unwrap_or(0);
        if max_len > 1 {
            Ok(Value::with_mask(data, Mask::for_sequences(&lengths, None)?))
        } else {
            Ok(Value::new(data))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReaderError;
    use crate::sanitize::MaskKind;
    use tch::Kind;

    #[test]
    fn test_pads_and_masks_ragged_sequences() -> Result<()> {
        let sequences = vec![
            Tensor::ones(&[3, 2], (Kind::Float, Device::Cpu)),
            Tensor::ones(&[1, 2], (Kind::Float, Device::Cpu)),
        ];
        let value = PaddingCollator.collate(&sequences, Device::Cpu)?;
        assert_eq!(value.data.size(), vec![2, 3, 2]);
        assert_eq!(value.data.sum(Kind::Double).double_value(&[]), 8.0);

        let mask = value.mask.as_ref().expect("ragged batch has a mask");
        assert_eq!(mask.row(0), &[MaskKind::SequenceBegin, MaskKind::Valid, MaskKind::Valid]);
        assert_eq!(mask.row(1), &[MaskKind::SequenceBegin, MaskKind::Invalid, MaskKind::Invalid]);
        Ok(())
    }

    #[test]
    fn test_single_step_sequences_have_no_mask() -> Result<()> {
        let sequences: Vec<Tensor> = (0..3)
            .map(|_| Tensor::zeros(&[1, 4], (Kind::Float, Device::Cpu)))
            .collect();
        let value = PaddingCollator.collate(&sequences, Device::Cpu)?;
        assert_eq!(value.data.size(), vec![3, 1, 4]);
        assert!(value.mask.is_none());
        Ok(())
    }

    #[test]
    fn test_step_shape_mismatch() {
        let sequences = vec![
            Tensor::zeros(&[1, 4], (Kind::Float, Device::Cpu)),
            Tensor::zeros(&[1, 5], (Kind::Float, Device::Cpu)),
        ];
        let err = PaddingCollator.collate(&sequences, Device::Cpu).unwrap_err();
        assert!(matches!(ReaderError::of(&err), Some(ReaderError::Shape(_))));
    }
}
