use crate::error::ReaderError;
use crate::stream::ElementType;
use anyhow::{bail, Result};
use tch::Tensor;

/// The model input a batch is meant for.
#[derive(Debug, Clone, PartialEq)]
pub struct InputVariable {
    pub name: String,
    /// Static shape of one sample.
    pub sample_shape: Vec<i64>,
    /// 1 = batch axis only, 2 = batch and sequence axes.
    pub dynamic_axes: usize,
    /// `None` when the type is left to be inferred.
    pub element_type: Option<ElementType>,
    pub is_placeholder: bool,
}

impl InputVariable {
    /// A sequence input (batch and sequence axes) of unspecified type.
    pub fn new(name: impl Into<String>, sample_shape: impl Into<Vec<i64>>) -> Self {
        Self {
            name: name.into(),
            sample_shape: sample_shape.into(),
            dynamic_axes: 2,
            element_type: None,
            is_placeholder: false,
        }
    }

    pub fn placeholder(name: impl Into<String>) -> Self {
        Self {
            is_placeholder: true,
            ..Self::new(name, Vec::new())
        }
    }

    pub fn with_dynamic_axes(mut self, dynamic_axes: usize) -> Self {
        self.dynamic_axes = dynamic_axes;
        self
    }

    pub fn with_element_type(mut self, element_type: ElementType) -> Self {
        self.element_type = Some(element_type);
        self
    }

    pub fn has_sequence_axis(&self) -> bool {
        self.dynamic_axes > 1
    }
}

/// Outcome of element type inference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InferredType {
    Known(ElementType),
    /// Nothing typed took part, e.g. only placeholders.
    Undetermined,
}

impl InferredType {
    pub fn known(self) -> Option<ElementType> {
        match self {
            Self::Known(element_type) => Some(element_type),
            Self::Undetermined => None,
        }
    }
}

/// Something whose element type can take part in inference.
#[derive(Debug, Clone, Copy)]
pub enum Operand<'a> {
    Variable(&'a InputVariable),
    Tensor(&'a Tensor),
}

/// Highest floating precision among the operands.
///
/// Placeholders and untyped variables are skipped. Tensors must be Float32 or
/// Float64; any other element type is a type error.
pub fn get_data_type(operands: &[Operand<'_>]) -> Result<InferredType> {
    let mut widest: Option<ElementType> = None;
    for operand in operands {
        let element_type = match operand {
            Operand::Variable(variable) if variable.is_placeholder => continue,
            Operand::Variable(variable) => match variable.element_type {
                Some(element_type) => element_type,
                None => continue,
            },
            Operand::Tensor(tensor) => match ElementType::from_kind(tensor.kind()) {
                Some(element_type) => element_type,
                None => bail!(ReaderError::type_error(format!(
                    "tensor element type {:?} is not supported, only float32 and float64",
                    tensor.kind()
                ))),
            },
        };
        if widest != Some(ElementType::Float64) {
            widest = Some(element_type);
        }
    }
    Ok(widest.map_or(InferredType::Undetermined, InferredType::Known))
}
