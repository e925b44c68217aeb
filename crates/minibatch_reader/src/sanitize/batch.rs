use super::value::Value;
use crate::error::ReaderError;
use crate::source::MinibatchData;
use anyhow::{bail, ensure, Result};
use std::collections::BTreeMap;
use tch::{Kind, Tensor};

/// One sparse sample: column index → value.
pub type SparseSample = BTreeMap<usize, f64>;

/// Raw data as a caller hands it to the sanitizer.
#[derive(Debug)]
pub enum Batch {
    /// Already sanitized; passed through.
    Value(Value),
    /// A uniform `[batch, ...sample_shape]` tensor.
    Dense(Tensor),
    /// One `[len, ...sample_shape]` tensor per sequence.
    Sequences(Vec<Tensor>),
    /// One list of sparse samples per sequence.
    Sparse(Vec<Vec<SparseSample>>),
    /// Untyped nested numbers, one element per batch entry.
    Nested(NestedList),
}

impl Batch {
    /// Entries along the batch axis.
    pub fn len(&self) -> usize {
        match self {
            Self::Value(value) => value.batch_len(),
            Self::Dense(tensor) => tensor.size().first().copied().unwrap_or(0) as usize,
            Self::Sequences(sequences) => sequences.len(),
            Self::Sparse(sequences) => sequences.len(),
            Self::Nested(NestedList::List(items)) => items.len(),
            Self::Nested(NestedList::Scalar(_)) => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Value(_) => "Value",
            Self::Dense(_) => "Dense",
            Self::Sequences(_) => "Sequences",
            Self::Sparse(_) => "Sparse",
            Self::Nested(_) => "Nested",
        }
    }
}

impl From<Value> for Batch {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<MinibatchData> for Batch {
    fn from(data: MinibatchData) -> Self {
        Self::Value(data.value)
    }
}

impl From<Tensor> for Batch {
    fn from(tensor: Tensor) -> Self {
        Self::Dense(tensor)
    }
}

impl From<Vec<Tensor>> for Batch {
    fn from(sequences: Vec<Tensor>) -> Self {
        Self::Sequences(sequences)
    }
}

impl From<Vec<Vec<SparseSample>>> for Batch {
    fn from(sequences: Vec<Vec<SparseSample>>) -> Self {
        Self::Sparse(sequences)
    }
}

impl From<NestedList> for Batch {
    fn from(list: NestedList) -> Self {
        Self::Nested(list)
    }
}

/// Arbitrarily nested numbers.
#[derive(Debug, Clone, PartialEq)]
pub enum NestedList {
    Scalar(f64),
    List(Vec<NestedList>),
}

impl NestedList {
    /// Converts a rectangular nesting into a tensor of `kind`.
    pub fn to_tensor(&self, kind: Kind) -> Result<Tensor> {
        let mut shape = Vec::new();
        let mut level = self;
        while let Self::List(items) = level {
            shape.push(items.len() as i64);
            match items.first() {
                Some(first) => level = first,
                None => break,
            }
        }

        let mut values = Vec::new();
        self.flatten_into(&shape, 0, &mut values)?;
        Ok(Tensor::from_slice(&values).reshape(&shape).to_kind(kind))
    }

    fn flatten_into(&self, shape: &[i64], depth: usize, values: &mut Vec<f64>) -> Result<()> {
        match self {
            Self::Scalar(value) => {
                ensure!(
                    depth == shape.len(),
                    ReaderError::type_error(format!(
                        "ragged nested list: found a number at depth {}, expected a list",
                        depth
                    ))
                );
                values.push(*value);
            }
            Self::List(items) => {
                let Some(&expected) = shape.get(depth) else {
                    bail!(ReaderError::type_error(format!(
                        "ragged nested list: found a list at depth {}, expected a number",
                        depth
                    )));
                };
                ensure!(
                    items.len() as i64 == expected,
                    ReaderError::type_error(format!(
                        "ragged nested list: expected {} entries at depth {} but got {}",
                        expected,
                        depth,
                        items.len()
                    ))
                );
                for item in items {
                    item.flatten_into(shape, depth + 1, values)?;
                }
            }
        }
        Ok(())
    }
}

impl From<f64> for NestedList {
    fn from(value: f64) -> Self {
        Self::Scalar(value)
    }
}

impl<T: Into<NestedList>> From<Vec<T>> for NestedList {
    fn from(items: Vec<T>) -> Self {
        Self::List(items.into_iter().map(Into::into).collect())
    }
}

/// Densifies sparse samples into a `[len, dim]` Float64 tensor.
pub fn densify(samples: &[SparseSample], dim: usize) -> Result<Tensor> {
    let mut dense = vec![0.0f64; samples.len() * dim];
    for (row, sample) in samples.iter().enumerate() {
        for (&column, &value) in sample {
            ensure!(
                column < dim,
                ReaderError::shape(format!(
                    "sparse index {} is out of range for dimension {}",
                    column, dim
                ))
            );
            dense[row * dim + column] = value;
        }
    }
    Ok(Tensor::from_slice(&dense).reshape(&[samples.len() as i64, dim as i64]))
}
