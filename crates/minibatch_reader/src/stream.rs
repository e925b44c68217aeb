use crate::config::ImageTransform;
use crate::error::ReaderError;
use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};
use tch::Kind;

/// Storage of one stream's samples, as declared in the reader configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageFormat {
    Dense,
    Sparse,
}

impl StorageFormat {
    pub fn from_sparse_flag(is_sparse: bool) -> Self {
        if is_sparse {
            Self::Sparse
        } else {
            Self::Dense
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dense => "dense",
            Self::Sparse => "sparse",
        }
    }
}

/// Floating point element type of a stream or variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementType {
    #[serde(rename = "float")]
    Float32,
    #[serde(rename = "double")]
    Float64,
}

impl ElementType {
    pub fn kind(&self) -> Kind {
        match self {
            Self::Float32 => Kind::Float,
            Self::Float64 => Kind::Double,
        }
    }

    /// Maps a floating tensor kind back to an element type.
    pub fn from_kind(kind: Kind) -> Option<Self> {
        match kind {
            Kind::Float => Some(Self::Float32),
            Kind::Double => Some(Self::Float64),
            _ => None,
        }
    }
}

impl Default for ElementType {
    fn default() -> Self {
        Self::Float32
    }
}

/// Declarative description of one named input stream.
///
/// The stream's own name is the key it is registered under in [`StreamDefs`];
/// `raw_alias` is the name the stream has inside the source file. For image
/// deserializers the alias selects the stream's role and must be `"image"` or
/// `"label"`. An empty alias (the [`Default`] descriptor) means the stream is
/// called by its own name in the file.
///
/// # Example
/// ```ignore
/// let features = StreamDescriptor::new("image").with_transforms(vec![
///     ImageTransform::scale(224, 224, 3, Interpolation::Linear)?,
/// ]);
/// let labels = StreamDescriptor::new("label").with_dimension(1000)?;
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamDescriptor {
    pub raw_alias: String,
    pub dimension: Option<usize>,
    pub is_sparse: bool,
    pub transforms: Vec<ImageTransform>,
}

impl StreamDescriptor {
    pub fn new(raw_alias: impl Into<String>) -> Self {
        Self {
            raw_alias: raw_alias.into(),
            dimension: None,
            is_sparse: false,
            transforms: Vec::new(),
        }
    }

    /// Sets the sample dimension. Zero is rejected.
    pub fn with_dimension(mut self, dimension: usize) -> Result<Self> {
        ensure!(
            dimension > 0,
            ReaderError::config(format!(
                "stream '{}': dimension must be positive",
                self.raw_alias
            ))
        );
        self.dimension = Some(dimension);
        Ok(self)
    }

    pub fn sparse(mut self, is_sparse: bool) -> Self {
        self.is_sparse = is_sparse;
        self
    }

    pub fn with_transforms(mut self, transforms: Vec<ImageTransform>) -> Self {
        self.transforms = transforms;
        self
    }

    pub fn storage(&self) -> StorageFormat {
        StorageFormat::from_sparse_flag(self.is_sparse)
    }

    /// The alias, or `name` when none was given.
    pub fn alias_or<'a>(&'a self, name: &'a str) -> &'a str {
        if self.raw_alias.is_empty() {
            name
        } else {
            &self.raw_alias
        }
    }
}

/// Ordered collection of stream descriptors keyed by stream name.
///
/// Re-registering a name replaces the earlier descriptor in place and logs a
/// warning.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamDefs {
    entries: Vec<(String, StreamDescriptor)>,
}

impl StreamDefs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, descriptor: StreamDescriptor) -> Self {
        self.insert(name, descriptor);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, descriptor: StreamDescriptor) {
        let name = name.into();
        match self.entries.iter_mut().find(|(existing, _)| *existing == name) {
            Some(slot) => {
                log::warn!("stream '{}' is defined more than once, keeping the last definition", name);
                slot.1 = descriptor;
            }
            None => self.entries.push((name, descriptor)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&StreamDescriptor> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, descriptor)| descriptor)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &StreamDescriptor)> {
        self.entries
            .iter()
            .map(|(name, descriptor)| (name.as_str(), descriptor))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Stream configuration for [`crate::MinibatchSource::text_format`].
#[derive(Debug, Clone, PartialEq)]
pub struct StreamConfiguration {
    pub name: String,
    pub dimension: usize,
    pub is_sparse: bool,
    /// Name inside the file. Empty means "same as `name`".
    pub stream_alias: String,
}

impl StreamConfiguration {
    pub fn new(name: impl Into<String>, dimension: usize) -> Self {
        Self {
            name: name.into(),
            dimension,
            is_sparse: false,
            stream_alias: String::new(),
        }
    }

    pub fn sparse(mut self, is_sparse: bool) -> Self {
        self.is_sparse = is_sparse;
        self
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.stream_alias = alias.into();
        self
    }
}

/// Runtime description of a stream produced by a minibatch source.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StreamInfo {
    /// Position of the stream across all deserializers of the source.
    pub id: usize,
    pub name: String,
    pub storage: StorageFormat,
    pub element_type: ElementType,
    /// Flattened sample size, when known up front.
    pub dimension: Option<usize>,
    /// Shape of one sample; empty when it is only known after decoding.
    pub sample_shape: Vec<i64>,
}
