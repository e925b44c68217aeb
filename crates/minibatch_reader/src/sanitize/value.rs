use super::mask::{Mask, MaskKind};
use anyhow::{Context, Result};
use tch::{Device, Kind, Tensor};

/// A device-resident batch ready for the training engine.
///
/// `data` has shape `[batch, ...]`, or `[num_sequences, max_len, ...]` when a
/// mask is attached.
#[derive(Debug)]
pub struct Value {
    pub data: Tensor,
    pub mask: Option<Mask>,
}

impl Value {
    pub fn new(data: Tensor) -> Self {
        Self { data, mask: None }
    }

    pub fn with_mask(data: Tensor, mask: Mask) -> Self {
        Self {
            data,
            mask: Some(mask),
        }
    }

    pub fn device(&self) -> Device {
        self.data.device()
    }

    pub fn kind(&self) -> Kind {
        self.data.kind()
    }

    /// Number of rows along the batch axis.
    pub fn batch_len(&self) -> usize {
        self.data.size().first().copied().unwrap_or(0) as usize
    }

    pub fn to_device(self, device: Device) -> Self {
        Self {
            data: self.data.to_device(device),
            mask: self.mask,
        }
    }

    /// Splits the value into one tensor per batch row, dropping padded cells.
    pub fn to_sequences(&self) -> Result<Vec<Tensor>> {
        let rows = self.batch_len();
        let mut sequences = Vec::with_capacity(rows);
        for row in 0..rows {
            let data = self.data.get(row as i64);
            let Some(mask) = &self.mask else {
                sequences.push(data);
                continue;
            };
            let valid: Vec<i64> = mask
                .row(row)
                .iter()
                .enumerate()
                .filter(|&(_, &cell)| cell != MaskKind::Invalid)
                .map(|(column, _)| column as i64)
                .collect();
            let index = Tensor::from_slice(&valid).to_device(data.device());
            sequences.push(
                data.f_index_select(0, &index)
                    .with_context(|| format!("Failed to strip padding from row {}", row))?,
            );
        }
        Ok(sequences)
    }
}

impl Clone for Value {
    /// Shares the underlying storage.
    fn clone(&self) -> Self {
        Self {
            data: self.data.shallow_clone(),
            mask: self.mask.clone(),
        }
    }
}
