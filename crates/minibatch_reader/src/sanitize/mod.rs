//! src/sanitize/mod.rs
//!
//! Turns caller-side batches into device-resident [`Value`]s.
//!
//! A batch of variable-length sequences for an input with a sequence axis is
//! zero-padded to the longest sequence and gets a [`Mask`]:
//! ```ignore
//! let x = InputVariable::new("x", vec![1]);
//! let value = sanitize_batch(
//!     &x,
//!     Batch::Sequences(vec![Tensor::from_slice(&[1.0f32, 2.0, 3.0]), Tensor::from_slice(&[4.0f32])]),
//!     None,
//!     None,
//!     Some(Device::Cpu),
//! )?;
//! // value.data == [[1, 2, 3], [4, 0, 0]]
//! // value.mask rows == [2, 1, 1], [2, 0, 0]
//! ```

pub mod batch;
pub mod mask;
pub mod pad;
pub mod value;
pub mod variable;

pub use batch::{densify, Batch, NestedList, SparseSample};
pub use mask::{Mask, MaskKind};
pub use pad::{pad_to_dense, stack_uniform};
pub use value::Value;
pub use variable::{get_data_type, InferredType, InputVariable, Operand};

use crate::device::default_device;
use crate::error::ReaderError;
use crate::stream::ElementType;
use anyhow::{bail, ensure, Context, Result};
use std::collections::{HashMap, HashSet};
use tch::{Device, Kind, Tensor};

/// Converts `batch` into a [`Value`] for `variable` on `device`.
///
/// * Tensor input keeps Float32/Float64 and upcasts integer kinds to Float32.
///   Any other element type is a type error.
/// * [`Batch::Nested`] and [`Batch::Sparse`] input is cast to `data_type`,
///   else the variable's type, else Float32. Precision may be lost.
/// * A list of sequences for a variable with a sequence axis is padded and
///   masked. `seq_starts` marks which sequences are new (all when `None`).
pub fn sanitize_batch(
    variable: &InputVariable,
    batch: Batch,
    seq_starts: Option<&[bool]>,
    data_type: Option<ElementType>,
    device: Option<Device>,
) -> Result<Value> {
    let device = device.unwrap_or_else(default_device);
    sanitize_on_device(variable, batch, seq_starts, data_type, device)
        .with_context(|| format!("Failed to sanitize batch for input '{}'", variable.name))
}

fn sanitize_on_device(
    variable: &InputVariable,
    batch: Batch,
    seq_starts: Option<&[bool]>,
    data_type: Option<ElementType>,
    device: Device,
) -> Result<Value> {
    let fallback = data_type
        .or(variable.element_type)
        .unwrap_or_default()
        .kind();

    let sequences = match batch {
        Batch::Value(value) => return Ok(value.to_device(device)),
        Batch::Dense(tensor) => {
            ensure!(
                seq_starts.is_none(),
                ReaderError::config(
                    "marking individual sequence begins does not make sense \
                     when not using the sequence axis"
                )
            );
            ensure!(
                tensor.size().first().is_some_and(|&len| len > 0),
                ReaderError::config("batch is empty")
            );
            let kind = coerce_kind(tensor.kind())?;
            return Ok(Value::new(tensor.to_kind(kind).to_device(device)));
        }
        Batch::Sequences(sequences) => sequences,
        Batch::Sparse(sequences) => {
            let dim = sparse_dimension(variable)?;
            sequences
                .iter()
                .map(|samples| Ok(densify(samples, dim)?.to_kind(fallback)))
                .collect::<Result<Vec<_>>>()?
        }
        Batch::Nested(NestedList::Scalar(_)) => bail!(ReaderError::type_error(
            "expected a list of samples or sequences, got a single number"
        )),
        Batch::Nested(list) if !variable.has_sequence_axis() => {
            ensure!(
                seq_starts.is_none(),
                ReaderError::config(
                    "marking individual sequence begins does not make sense \
                     when not using the sequence axis"
                )
            );
            let tensor = list.to_tensor(fallback)?;
            ensure!(
                tensor.size().first().is_some_and(|&len| len > 0),
                ReaderError::config("batch is empty")
            );
            return Ok(Value::new(tensor.to_device(device)));
        }
        Batch::Nested(NestedList::List(items)) => items
            .iter()
            .map(|item| match item {
                NestedList::Scalar(value) => Ok(Tensor::from_slice(&[*value]).to_kind(fallback)),
                list => list.to_tensor(fallback),
            })
            .collect::<Result<Vec<_>>>()?,
    };

    ensure!(!sequences.is_empty(), ReaderError::config("batch is empty"));
    let kind = sequences
        .iter()
        .map(|sequence| coerce_kind(sequence.kind()))
        .collect::<Result<Vec<_>>>()?
        .into_iter()
        .reduce(|a, b| if a == Kind::Double || b == Kind::Double { Kind::Double } else { a })
        .unwrap_or(Kind::Float);
    let sequences: Vec<Tensor> = sequences.into_iter().map(|s| s.to_kind(kind)).collect();

    if !variable.has_sequence_axis() {
        ensure!(
            seq_starts.is_none(),
            ReaderError::config(
                "marking individual sequence begins does not make sense \
                 when not using the sequence axis"
            )
        );
        return Ok(Value::new(stack_uniform(&sequences)?.to_device(device)));
    }

    let lengths: Vec<usize> = sequences
        .iter()
        .map(|sequence| sequence.size().first().copied().unwrap_or(0) as usize)
        .collect();
    let mask = Mask::for_sequences(&lengths, seq_starts)?;
    let data = pad_to_dense(&sequences)?;
    Ok(Value::with_mask(data.to_device(device), mask))
}

/// Float kinds are kept, integer kinds become Float32.
fn coerce_kind(kind: Kind) -> Result<Kind> {
    match kind {
        Kind::Float | Kind::Double => Ok(kind),
        Kind::Uint8 | Kind::Int8 | Kind::Int16 | Kind::Int | Kind::Int64 => Ok(Kind::Float),
        other => bail!(ReaderError::type_error(format!(
            "element type {:?} is not supported, only float32 and float64",
            other
        ))),
    }
}

fn sparse_dimension(variable: &InputVariable) -> Result<usize> {
    match variable.sample_shape.last() {
        Some(&dim) if dim > 0 => Ok(dim as usize),
        _ => bail!(ReaderError::config(format!(
            "sparse input for '{}' needs a static last dimension, shape is {:?}",
            variable.name, variable.sample_shape
        ))),
    }
}

/// Parses a precision name: `float`/`float32` or `double`/`float64`.
pub fn sanitize_precision(precision: &str) -> Result<ElementType> {
    match precision {
        "float" | "float32" => Ok(ElementType::Float32),
        "double" | "float64" => Ok(ElementType::Float64),
        other => bail!(ReaderError::config(format!(
            "precision value: \"{}\" is not supported",
            other
        ))),
    }
}

/// Data handed to [`sanitize_var_map`].
#[derive(Debug)]
pub enum Arguments {
    /// Batches keyed by variable name.
    Named(Vec<(String, Batch)>),
    /// The batch of the only variable.
    Single(Batch),
}

/// Resolves and sanitizes one batch per input variable.
///
/// Names must match exactly one variable, every variable needs a batch, and
/// all batches must hold the same number of entries. The result follows the
/// order of `arguments`.
pub fn sanitize_var_map(
    variables: &[InputVariable],
    arguments: Arguments,
    seq_starts: Option<&[bool]>,
    precision: Option<&str>,
    device: Option<Device>,
) -> Result<Vec<(InputVariable, Value)>> {
    let device = device.unwrap_or_else(default_device);
    let precision = precision.map(sanitize_precision).transpose()?;

    let arguments = match arguments {
        Arguments::Named(arguments) => arguments,
        Arguments::Single(batch) => {
            ensure!(
                variables.len() == 1,
                ReaderError::config(format!(
                    "a single unnamed batch is only supported for one input, got {} inputs",
                    variables.len()
                ))
            );
            vec![(variables[0].name.clone(), batch)]
        }
    };

    if arguments.is_empty() {
        ensure!(
            variables.is_empty(),
            ReaderError::config(format!("function expects {} arguments", variables.len()))
        );
        return Ok(Vec::new());
    }
    ensure!(
        arguments.len() >= variables.len(),
        ReaderError::config(format!(
            "your graph has {} inputs, but you specified {}",
            variables.len(),
            arguments.len()
        ))
    );

    let sample_counts: Vec<usize> = arguments.iter().map(|(_, batch)| batch.len()).collect();
    ensure!(
        sample_counts.windows(2).all(|pair| pair[0] == pair[1]),
        ReaderError::config(format!(
            "not all inputs have the same number of samples: {}",
            sample_counts
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        ))
    );
    if let Some(starts) = seq_starts {
        ensure!(
            starts.len() == sample_counts[0],
            ReaderError::config(format!(
                "you have {} samples, but seq_starts has {} elements",
                sample_counts[0],
                starts.len()
            ))
        );
    }

    let mut name_counts: HashMap<&str, usize> = HashMap::new();
    for variable in variables {
        *name_counts.entry(variable.name.as_str()).or_default() += 1;
    }

    let mut resolved = Vec::with_capacity(arguments.len());
    let mut bound: HashSet<String> = HashSet::with_capacity(arguments.len());
    for (name, batch) in arguments {
        match name_counts.get(name.as_str()).copied().unwrap_or(0) {
            0 => bail!(ReaderError::lookup(format!(
                "variable with name '{}' does not exist in the network. Available variable names: {}",
                name,
                variables
                    .iter()
                    .map(|variable| variable.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ))),
            1 => {}
            _ => bail!(ReaderError::lookup(format!("node name '{}' is not unique", name))),
        }
        let variable = variables
            .iter()
            .find(|variable| variable.name == name)
            .ok_or_else(|| ReaderError::lookup(format!("no input with the name '{}'", name)))?;
        ensure!(
            bound.insert(name.clone()),
            ReaderError::config(format!("input '{}' was given more than one batch", name))
        );
        resolved.push((variable, batch));
    }

    let missing: Vec<&str> = variables
        .iter()
        .map(|variable| variable.name.as_str())
        .filter(|name| !bound.contains(*name))
        .collect();
    ensure!(
        missing.is_empty(),
        ReaderError::config(format!("no batch given for inputs: {}", missing.join(", ")))
    );

    let mut sanitized = Vec::with_capacity(resolved.len());
    for (variable, batch) in resolved {
        let value = match batch {
            Batch::Value(value) => value.to_device(device),
            batch => sanitize_batch(variable, batch, seq_starts, precision, Some(device))?,
        };
        sanitized.push((variable.clone(), value));
    }
    Ok(sanitized)
}

#[cfg(test)]
mod sanitize_test {
    use super::*;

    fn cpu() -> Option<Device> {
        Some(Device::Cpu)
    }

    #[test]
    fn test_integer_batch_becomes_float32() -> Result<()> {
        let x = InputVariable::new("x", vec![2]).with_dynamic_axes(1);
        let batch = Tensor::from_slice(&[1i64, 2, 3, 4]).reshape(&[2, 2]);
        let value = sanitize_batch(&x, Batch::Dense(batch), None, None, cpu())?;
        assert_eq!(value.kind(), Kind::Float);
        assert!(value.mask.is_none());
        let expected = Tensor::from_slice(&[1.0f32, 2.0, 3.0, 4.0]).reshape(&[2, 2]);
        assert!(value.data.equal(&expected));
        Ok(())
    }

    #[test]
    fn test_unsupported_kind_is_type_error() {
        let x = InputVariable::new("x", vec![2]).with_dynamic_axes(1);
        let batch = Tensor::from_slice(&[true, false]).reshape(&[1, 2]);
        let err = sanitize_batch(&x, Batch::Dense(batch), None, None, cpu()).unwrap_err();
        assert!(matches!(ReaderError::of(&err), Some(ReaderError::Type(_))));
        assert!(format!("{:#}", err).contains("Bool"));
    }

    #[test]
    fn test_sequences_are_padded_and_masked() -> Result<()> {
        let x = InputVariable::new("x", vec![1]);
        let batch = Batch::Sequences(vec![
            Tensor::from_slice(&[1.0f32, 2.0, 3.0]),
            Tensor::from_slice(&[4.0f32]),
        ]);
        let value = sanitize_batch(&x, batch, None, None, cpu())?;
        let expected = Tensor::from_slice(&[1.0f32, 2.0, 3.0, 4.0, 0.0, 0.0]).reshape(&[2, 3]);
        assert!(value.data.equal(&expected));

        let mask = value.mask.as_ref().expect("sequence input is masked");
        assert_eq!(
            mask.row(1),
            &[MaskKind::SequenceBegin, MaskKind::Invalid, MaskKind::Invalid]
        );
        Ok(())
    }

    #[test]
    fn test_seq_starts_without_sequence_axis() {
        let x = InputVariable::new("x", vec![1]).with_dynamic_axes(1);
        let batch = Batch::Sequences(vec![Tensor::from_slice(&[1.0f32])]);
        let err = sanitize_batch(&x, batch, Some(&[true]), None, cpu()).unwrap_err();
        assert!(matches!(ReaderError::of(&err), Some(ReaderError::Config(_))));
    }

    #[test]
    fn test_empty_batch() {
        let x = InputVariable::new("x", vec![1]);
        let err = sanitize_batch(&x, Batch::Sequences(vec![]), None, None, cpu()).unwrap_err();
        assert!(format!("{:#}", err).contains("batch is empty"));
    }

    #[test]
    fn test_nested_uses_explicit_type() -> Result<()> {
        let x = InputVariable::new("x", vec![2]).with_dynamic_axes(1);
        let batch = Batch::Nested(NestedList::from(vec![vec![1.5, 2.5]]));
        let value = sanitize_batch(&x, batch, None, Some(ElementType::Float64), cpu())?;
        assert_eq!(value.kind(), Kind::Double);
        assert_eq!(value.data.size(), vec![1, 2]);
        Ok(())
    }

    #[test]
    fn test_sparse_batch_is_densified() -> Result<()> {
        let x = InputVariable::new("x", vec![4]);
        let batch = Batch::Sparse(vec![
            vec![SparseSample::from([(0, 1.0)]), SparseSample::from([(3, 2.0)])],
            vec![SparseSample::from([(1, 1.0)])],
        ]);
        let value = sanitize_batch(&x, batch, None, None, cpu())?;
        assert_eq!(value.data.size(), vec![2, 2, 4]);
        assert_eq!(value.kind(), Kind::Float);
        assert_eq!(value.data.double_value(&[0, 1, 3]), 2.0);
        assert_eq!(value.mask.as_ref().map(|mask| mask.valid_len(1)), Some(1));
        Ok(())
    }

    #[test]
    fn test_sanitize_precision() -> Result<()> {
        assert_eq!(sanitize_precision("float")?, ElementType::Float32);
        assert_eq!(sanitize_precision("float64")?, ElementType::Float64);
        let err = sanitize_precision("half").unwrap_err();
        assert!(matches!(ReaderError::of(&err), Some(ReaderError::Config(_))));
        Ok(())
    }

    #[test]
    fn test_var_map_resolution() -> Result<()> {
        let variables = vec![
            InputVariable::new("x", vec![1]).with_dynamic_axes(1),
            InputVariable::new("y", vec![1]).with_dynamic_axes(1),
        ];
        let arguments = Arguments::Named(vec![
            ("y".into(), Batch::Dense(Tensor::from_slice(&[1.0f32, 2.0]).reshape(&[2, 1]))),
            ("x".into(), Batch::Dense(Tensor::from_slice(&[3i64, 4]).reshape(&[2, 1]))),
        ]);
        let sanitized = sanitize_var_map(&variables, arguments, None, Some("double"), cpu())?;
        let names: Vec<_> = sanitized.iter().map(|(var, _)| var.name.as_str()).collect();
        assert_eq!(names, vec!["y", "x"]);
        Ok(())
    }

    #[test]
    fn test_var_map_errors() {
        let variables = vec![
            InputVariable::new("x", vec![1]).with_dynamic_axes(1),
            InputVariable::new("x", vec![1]).with_dynamic_axes(1),
            InputVariable::new("z", vec![1]).with_dynamic_axes(1),
        ];
        let dense = || Batch::Dense(Tensor::from_slice(&[1.0f32, 2.0]).reshape(&[2, 1]));

        let unknown = Arguments::Named(vec![
            ("nope".into(), dense()),
            ("z".into(), dense()),
            ("x".into(), dense()),
        ]);
        let err = sanitize_var_map(&variables, unknown, None, None, cpu()).unwrap_err();
        assert!(matches!(ReaderError::of(&err), Some(ReaderError::Lookup(_))));

        let ambiguous = Arguments::Named(vec![
            ("x".into(), dense()),
            ("z".into(), dense()),
            ("z".into(), dense()),
        ]);
        let err = sanitize_var_map(&variables, ambiguous, None, None, cpu()).unwrap_err();
        assert!(matches!(ReaderError::of(&err), Some(ReaderError::Lookup(_))));

        let too_few = Arguments::Named(vec![("z".into(), dense())]);
        let err = sanitize_var_map(&variables, too_few, None, None, cpu()).unwrap_err();
        assert!(matches!(ReaderError::of(&err), Some(ReaderError::Config(_))));

        let uneven = Arguments::Named(vec![
            ("z".into(), dense()),
            ("x".into(), Batch::Dense(Tensor::from_slice(&[1.0f32]).reshape(&[1, 1]))),
            ("x".into(), dense()),
        ]);
        let err = sanitize_var_map(&variables, uneven, None, None, cpu()).unwrap_err();
        assert!(err.to_string().contains("same number of samples"));
    }

    #[test]
    fn test_var_map_rejects_repeated_argument() {
        let variables = vec![
            InputVariable::new("x", vec![1]).with_dynamic_axes(1),
            InputVariable::new("y", vec![1]).with_dynamic_axes(1),
        ];
        let dense = || Batch::Dense(Tensor::from_slice(&[1.0f32, 2.0]).reshape(&[2, 1]));

        let repeated = Arguments::Named(vec![("x".into(), dense()), ("x".into(), dense())]);
        let err = sanitize_var_map(&variables, repeated, None, None, cpu()).unwrap_err();
        assert!(matches!(ReaderError::of(&err), Some(ReaderError::Config(_))));
        assert!(err.to_string().contains("more than one batch"));
    }
}
