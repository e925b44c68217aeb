use crate::error::ReaderError;
use anyhow::{ensure, Result};
use tch::{Device, Tensor};

/// Validity of one cell of a padded batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MaskKind {
    Invalid = 0,
    Valid = 1,
    SequenceBegin = 2,
}

/// Per-cell validity of a `(num_sequences, max_len)` padded batch.
///
/// Every row starts valid. A new sequence has a single `SequenceBegin` at
/// column 0; a continuation of an earlier sequence has none. Cells past the
/// sequence's length are `Invalid`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask {
    num_sequences: usize,
    max_len: usize,
    cells: Vec<MaskKind>,
}

impl Mask {
    pub fn new(num_sequences: usize, max_len: usize) -> Self {
        Self {
            num_sequences,
            max_len,
            cells: vec![MaskKind::Valid; num_sequences * max_len],
        }
    }

    /// Builds the mask of a batch with the given sequence lengths.
    ///
    /// `seq_starts[i] == false` marks sequence `i` as the continuation of one
    /// from an earlier batch. Without flags every sequence is new.
    pub fn for_sequences(lengths: &[usize], seq_starts: Option<&[bool]>) -> Result<Self> {
        if let Some(starts) = seq_starts {
            ensure!(
                starts.len() == lengths.len(),
                ReaderError::config(format!(
                    "you have {} sequences, but seq_starts has {} elements",
                    lengths.len(),
                    starts.len()
                ))
            );
        }
        let max_len = lengths.iter().copied().max().unwrap_or(0);
        let mut mask = Self::new(lengths.len(), max_len);
        for (row, &len) in lengths.iter().enumerate() {
            ensure!(
                len > 0,
                ReaderError::config(format!("batch is empty: sequence {} has no samples", row))
            );
            if seq_starts.map_or(true, |starts| starts[row]) {
                mask.mark_sequence_begin(row);
            }
            mask.invalidate_section(row, len);
        }
        Ok(mask)
    }

    pub fn mark_sequence_begin(&mut self, row: usize) {
        if self.max_len > 0 {
            self.cells[row * self.max_len] = MaskKind::SequenceBegin;
        }
    }

    /// Marks columns `from..max_len` of `row` invalid.
    pub fn invalidate_section(&mut self, row: usize, from: usize) {
        let start = row * self.max_len;
        for cell in &mut self.cells[start + from.min(self.max_len)..start + self.max_len] {
            *cell = MaskKind::Invalid;
        }
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.num_sequences, self.max_len)
    }

    pub fn row(&self, row: usize) -> &[MaskKind] {
        &self.cells[row * self.max_len..(row + 1) * self.max_len]
    }

    pub fn get(&self, row: usize, column: usize) -> MaskKind {
        self.row(row)[column]
    }

    /// Number of valid (non-padding) cells in `row`.
    pub fn valid_len(&self, row: usize) -> usize {
        self.row(row)
            .iter()
            .filter(|&&cell| cell != MaskKind::Invalid)
            .count()
    }

    /// The mask as a `Uint8` tensor of shape `[num_sequences, max_len]`.
    pub fn to_tensor(&self, device: Device) -> Tensor {
        let raw: Vec<u8> = self.cells.iter().map(|&cell| cell as u8).collect();
        Tensor::from_slice(&raw)
            .reshape(&[self.num_sequences as i64, self.max_len as i64])
            .to_device(device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::MaskKind::{Invalid as I, SequenceBegin as B, Valid as V};

    #[test]
    fn test_mask_for_ragged_lengths() -> Result<()> {
        let mask = Mask::for_sequences(&[3, 1, 5], None)?;
        assert_eq!(mask.shape(), (3, 5));
        assert_eq!(mask.row(0), &[B, V, V, I, I]);
        assert_eq!(mask.row(1), &[B, I, I, I, I]);
        assert_eq!(mask.row(2), &[B, V, V, V, V]);
        assert_eq!(mask.valid_len(0), 3);
        Ok(())
    }

    #[test]
    fn test_continuation_has_no_begin() -> Result<()> {
        let mask = Mask::for_sequences(&[2, 2], Some(&[true, false]))?;
        assert_eq!(mask.row(0), &[B, V]);
        assert_eq!(mask.row(1), &[V, V]);
        Ok(())
    }

    #[test]
    fn test_seq_starts_length_mismatch() {
        let err = Mask::for_sequences(&[2, 2], Some(&[true])).unwrap_err();
        assert!(matches!(ReaderError::of(&err), Some(ReaderError::Config(_))));
    }

    #[test]
    fn test_empty_sequence_rejected() {
        let err = Mask::for_sequences(&[2, 0], None).unwrap_err();
        assert!(err.to_string().contains("batch is empty"));
    }

    #[test]
    fn test_to_tensor() -> Result<()> {
        let mask = Mask::for_sequences(&[1, 2], None)?;
        let tensor = mask.to_tensor(Device::Cpu);
        assert_eq!(tensor.size(), vec![2, 2]);
        assert_eq!(tensor.kind(), tch::Kind::Uint8);
        let expected = Tensor::from_slice(&[2u8, 0, 2, 1]).reshape(&[2, 2]);
        assert!(tensor.equal(&expected));
        Ok(())
    }
}
