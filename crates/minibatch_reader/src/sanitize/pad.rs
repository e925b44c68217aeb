use crate::error::ReaderError;
use anyhow::{bail, ensure, Result};
use tch::{Kind, Tensor};

/// Appends the minimal number of zero steps to each sequence so the batch
/// becomes rectangular.
///
/// Every sequence is `[len, ...step_shape]`; only `len` may differ. The result
/// is `[num_sequences, max_len, ...step_shape]` on the first sequence's
/// device, in the widest element type among the inputs.
///
/// # Example
/// ```ignore
/// let padded = pad_to_dense(&[Tensor::from_slice(&[1, 2, 3]), Tensor::from_slice(&[4])])?;
/// // [[1, 2, 3],
/// //  [4, 0, 0]]
/// ```
pub fn pad_to_dense(sequences: &[Tensor]) -> Result<Tensor> {
    let Some(first) = sequences.first() else {
        bail!(ReaderError::config("batch is empty"));
    };
    let expected = step_shape(first, 0)?;

    let mut max_len = 0;
    for (index, sequence) in sequences.iter().enumerate() {
        let shape = step_shape(sequence, index)?;
        ensure!(
            shape == expected,
            ReaderError::shape(format!(
                "shape mismatch: expected {:?} but got {:?}",
                expected, shape
            ))
        );
        let len = sequence.size()[0];
        ensure!(
            len > 0,
            ReaderError::config(format!("batch is empty: sequence {} has no samples", index))
        );
        max_len = max_len.max(len);
    }

    let kind = widest_kind(sequences.iter().map(Tensor::kind));
    let mut padded_shape = vec![sequences.len() as i64, max_len];
    padded_shape.extend(expected.iter().copied());
    let padded = Tensor::zeros(&padded_shape, (kind, first.device()));

    for (index, sequence) in sequences.iter().enumerate() {
        let len = sequence.size()[0];
        let mut destination = padded.get(index as i64).narrow(0, 0, len);
        destination.copy_(&sequence.to_device(first.device()));
    }
    Ok(padded)
}

/// Stacks equally shaped samples along a new batch axis.
pub fn stack_uniform(samples: &[Tensor]) -> Result<Tensor> {
    let Some(first) = samples.first() else {
        bail!(ReaderError::config("batch is empty"));
    };
    let expected = first.size();
    for sample in samples {
        ensure!(
            sample.size() == expected,
            ReaderError::shape(format!(
                "shape mismatch: expected {:?} but got {:?}",
                expected,
                sample.size()
            ))
        );
    }
    let kind = widest_kind(samples.iter().map(Tensor::kind));
    let aligned: Vec<Tensor> = samples
        .iter()
        .map(|sample| sample.to_device(first.device()).to_kind(kind))
        .collect();
    Ok(Tensor::stack(&aligned, 0))
}

fn step_shape(sequence: &Tensor, index: usize) -> Result<Vec<i64>> {
    let size = sequence.size();
    ensure!(
        !size.is_empty(),
        ReaderError::shape(format!(
            "sequence {} is a scalar, expected at least one (sequence) axis",
            index
        ))
    );
    Ok(size[1..].to_vec())
}

/// Double over Float over any integer kind; mixed integer kinds widen to Int64.
fn widest_kind(kinds: impl Iterator<Item = Kind>) -> Kind {
    kinds
        .reduce(|widest, kind| match (widest, kind) {
            (a, b) if a == b => a,
            (Kind::Double, _) | (_, Kind::Double) => Kind::Double,
            (Kind::Float, _) | (_, Kind::Float) => Kind::Float,
            _ => Kind::Int64,
        })
        .unwrap_or(Kind::Float)
}
