//! src/config/deserializer.rs
//!
//! Per-deserializer configuration: which file to read and how its fields map
//! onto named streams.
//!
//! Configurations are assembled with a builder and finalized into an immutable
//! [`DeserializerConfig`]:
//! ```ignore
//! let images = ImageDeserializerBuilder::new("train_map.txt")
//!     .map_features("features", vec![ImageTransform::scale(224, 224, 3, Interpolation::Linear)?])
//!     .map_labels("labels", 1000)
//!     .build()?;
//!
//! let text = TextFormatDeserializerBuilder::new("train.ctf")
//!     .map_input("words", 5000, StorageFormat::Sparse, Some("x"))
//!     .map_input("tags", 12, StorageFormat::Dense, None)
//!     .build()?;
//! ```

use super::input_map::InputMap;
use super::transform::ImageTransform;
use crate::error::ReaderError;
use crate::stream::{ElementType, StorageFormat, StreamDefs};
use anyhow::{bail, ensure, Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Aliases with a reserved meaning for image deserializers.
pub const IMAGE_ALIAS: &str = "image";
pub const LABEL_ALIAS: &str = "label";

/// Role of a stream produced by an image deserializer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamRole {
    Feature,
    Label,
}

impl StreamRole {
    /// Resolves a raw alias. Only `"image"` and `"label"` are accepted.
    pub fn from_alias(alias: &str) -> Result<Self> {
        match alias {
            IMAGE_ALIAS => Ok(Self::Feature),
            LABEL_ALIAS => Ok(Self::Label),
            other => bail!(ReaderError::config(format!(
                "invalid field name '{}', allowed are '{}' and '{}'",
                other, IMAGE_ALIAS, LABEL_ALIAS
            ))),
        }
    }
}

// ============================================================================
// Image deserializer
// ============================================================================

/// One stream of an image deserializer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "ImageStreamRepr", into = "ImageStreamRepr")]
pub enum ImageStream {
    /// Decoded pixels after applying `transforms` in order.
    Feature { transforms: Vec<ImageTransform> },
    /// One-hot class vector of `label_dim` entries.
    Label { label_dim: usize },
}

impl ImageStream {
    pub fn role(&self) -> StreamRole {
        match self {
            Self::Feature { .. } => StreamRole::Feature,
            Self::Label { .. } => StreamRole::Label,
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct ImageStreamRepr {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    transforms: Option<Vec<ImageTransform>>,
    #[serde(rename = "labelDim", default, skip_serializing_if = "Option::is_none")]
    label_dim: Option<usize>,
}

impl TryFrom<ImageStreamRepr> for ImageStream {
    type Error = Error;

    fn try_from(repr: ImageStreamRepr) -> Result<Self> {
        match (repr.transforms, repr.label_dim) {
            (Some(_), Some(_)) => bail!(ReaderError::config(
                "an image stream is either a feature ('transforms') or a label ('labelDim'), not both"
            )),
            (None, Some(label_dim)) => Ok(Self::Label { label_dim }),
            (transforms, None) => Ok(Self::Feature {
                transforms: transforms.unwrap_or_default(),
            }),
        }
    }
}

impl From<ImageStream> for ImageStreamRepr {
    fn from(stream: ImageStream) -> Self {
        match stream {
            ImageStream::Feature { transforms } => Self {
                transforms: Some(transforms),
                label_dim: None,
            },
            ImageStream::Label { label_dim } => Self {
                transforms: None,
                label_dim: Some(label_dim),
            },
        }
    }
}

/// Reads `<path>\t<class id>` map files and decodes the referenced images.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageDeserializerConfig {
    pub file: PathBuf,
    pub input: InputMap<ImageStream>,
    /// Threads used to decode the records of one minibatch. 0 decodes inline.
    #[serde(rename = "decodeWorkers", default)]
    pub decode_workers: usize,
}

impl ImageDeserializerConfig {
    /// Builds an image configuration from stream descriptors, dispatching on
    /// each descriptor's alias.
    pub fn from_streams(file: impl Into<PathBuf>, streams: &StreamDefs) -> Result<DeserializerConfig> {
        let mut builder = ImageDeserializerBuilder::new(file);
        for (name, descriptor) in streams.iter() {
            builder = match StreamRole::from_alias(descriptor.alias_or(name))? {
                StreamRole::Feature => builder.map_features(name, descriptor.transforms.clone()),
                StreamRole::Label => {
                    let label_dim = descriptor.dimension.ok_or_else(|| {
                        Error::new(ReaderError::config(format!(
                            "label stream '{}' requires a dimension",
                            name
                        )))
                    })?;
                    builder.map_labels(name, label_dim)
                }
            };
        }
        builder.build()
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            !self.input.is_empty(),
            ReaderError::config(format!(
                "image deserializer '{}' has no input streams",
                self.file.display()
            ))
        );
        for (name, stream) in self.input.iter() {
            match stream {
                ImageStream::Feature { transforms } => {
                    for transform in transforms {
                        transform.validate()?;
                    }
                }
                ImageStream::Label { label_dim } => ensure!(
                    *label_dim > 0,
                    ReaderError::config(format!(
                        "label stream '{}': labelDim must be positive",
                        name
                    ))
                ),
            }
        }
        Ok(())
    }
}

/// Accumulates image stream mappings.
#[derive(Debug, Clone)]
pub struct ImageDeserializerBuilder {
    config: ImageDeserializerConfig,
}

impl ImageDeserializerBuilder {
    pub fn new(file: impl Into<PathBuf>) -> Self {
        Self {
            config: ImageDeserializerConfig {
                file: file.into(),
                input: InputMap::new(),
                decode_workers: 0,
            },
        }
    }

    /// Maps the decoded images to stream `name`. Re-mapping a name replaces
    /// the earlier mapping.
    pub fn map_features(mut self, name: impl Into<String>, transforms: Vec<ImageTransform>) -> Self {
        self.insert(name.into(), ImageStream::Feature { transforms });
        self
    }

    /// Maps the class ids to stream `name` as one-hot vectors of `label_dim`.
    pub fn map_labels(mut self, name: impl Into<String>, label_dim: usize) -> Self {
        self.insert(name.into(), ImageStream::Label { label_dim });
        self
    }

    pub fn decode_workers(mut self, workers: usize) -> Self {
        self.config.decode_workers = workers;
        self
    }

    fn insert(&mut self, name: String, stream: ImageStream) {
        if self.config.input.insert(name.clone(), stream) {
            log::warn!(
                "image deserializer '{}': stream '{}' mapped again, replacing the earlier mapping",
                self.config.file.display(),
                name
            );
        }
    }

    pub fn build(self) -> Result<DeserializerConfig> {
        self.config.validate()?;
        Ok(DeserializerConfig::Image(self.config))
    }
}

// ============================================================================
// Text format deserializer
// ============================================================================

/// One stream of a text-format deserializer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextStream {
    pub dim: usize,
    pub format: StorageFormat,
    /// Name of the `|alias` block in the file. Empty means the stream name.
    #[serde(default)]
    pub alias: String,
}

impl TextStream {
    pub fn alias_or<'a>(&'a self, name: &'a str) -> &'a str {
        if self.alias.is_empty() {
            name
        } else {
            &self.alias
        }
    }
}

/// Reads delimited-text ("CNTK text format") files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextFormatDeserializerConfig {
    pub file: PathBuf,
    pub input: InputMap<TextStream>,
    #[serde(default)]
    pub precision: ElementType,
}

impl TextFormatDeserializerConfig {
    /// Builds a text-format configuration from stream descriptors.
    pub fn from_streams(file: impl Into<PathBuf>, streams: &StreamDefs) -> Result<DeserializerConfig> {
        let mut builder = TextFormatDeserializerBuilder::new(file);
        for (name, descriptor) in streams.iter() {
            let dim = descriptor.dimension.ok_or_else(|| {
                Error::new(ReaderError::config(format!(
                    "text stream '{}' requires a dimension",
                    name
                )))
            })?;
            builder = builder.map_input(
                name,
                dim,
                descriptor.storage(),
                Some(descriptor.alias_or(name)),
            );
        }
        builder.build()
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(
            !self.input.is_empty(),
            ReaderError::config(format!(
                "text deserializer '{}' has no input streams",
                self.file.display()
            ))
        );
        let mut aliases = HashSet::new();
        for (name, stream) in self.input.iter() {
            ensure!(
                stream.dim > 0,
                ReaderError::config(format!("text stream '{}': dim must be positive", name))
            );
            let alias = stream.alias_or(name);
            ensure!(
                aliases.insert(alias),
                ReaderError::config(format!(
                    "text deserializer '{}': alias '{}' is used by more than one stream",
                    self.file.display(),
                    alias
                ))
            );
        }
        Ok(())
    }
}

/// Accumulates text stream mappings.
#[derive(Debug, Clone)]
pub struct TextFormatDeserializerBuilder {
    config: TextFormatDeserializerConfig,
}

impl TextFormatDeserializerBuilder {
    pub fn new(file: impl Into<PathBuf>) -> Self {
        Self {
            config: TextFormatDeserializerConfig {
                file: file.into(),
                input: InputMap::new(),
                precision: ElementType::default(),
            },
        }
    }

    /// Maps the `|alias` blocks of the file to stream `name`. The alias
    /// defaults to `name`. Re-mapping a name replaces the earlier mapping.
    pub fn map_input(
        mut self,
        name: impl Into<String>,
        dim: usize,
        format: StorageFormat,
        alias: Option<&str>,
    ) -> Self {
        let name = name.into();
        let stream = TextStream {
            dim,
            format,
            alias: alias.unwrap_or(name.as_str()).to_string(),
        };
        if self.config.input.insert(name.clone(), stream) {
            log::warn!(
                "text deserializer '{}': stream '{}' mapped again, replacing the earlier mapping",
                self.config.file.display(),
                name
            );
        }
        self
    }

    pub fn precision(mut self, precision: ElementType) -> Self {
        self.config.precision = precision;
        self
    }

    pub fn build(self) -> Result<DeserializerConfig> {
        self.config.validate()?;
        Ok(DeserializerConfig::TextFormat(self.config))
    }
}

// ============================================================================
// DeserializerConfig
// ============================================================================

/// Finalized configuration of one deserializer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DeserializerConfig {
    #[serde(rename = "ImageDeserializer")]
    Image(ImageDeserializerConfig),
    #[serde(rename = "CNTKTextFormatDeserializer")]
    TextFormat(TextFormatDeserializerConfig),
}

impl DeserializerConfig {
    pub fn file(&self) -> &Path {
        match self {
            Self::Image(config) => &config.file,
            Self::TextFormat(config) => &config.file,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Image(_) => "ImageDeserializer",
            Self::TextFormat(_) => "CNTKTextFormatDeserializer",
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Image(config) => config.validate(),
            Self::TextFormat(config) => config.validate(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::transform::{CropRatio, CropType, Interpolation, JitterType};
    use crate::stream::StreamDescriptor;
    use serde_json::json;

    fn config_error(err: &anyhow::Error) -> bool {
        matches!(ReaderError::of(err), Some(ReaderError::Config(_)))
    }

    #[test]
    fn test_image_from_streams_dispatches_on_alias() -> Result<()> {
        let scale = ImageTransform::scale(8, 8, 3, Interpolation::Linear)?;
        let streams = StreamDefs::new()
            .with("features", StreamDescriptor::new("image").with_transforms(vec![scale.clone()]))
            .with("labels", StreamDescriptor::new("label").with_dimension(10)?);

        let DeserializerConfig::Image(config) =
            ImageDeserializerConfig::from_streams("map.txt", &streams)?
        else {
            panic!("expected an image configuration");
        };
        assert_eq!(
            config.input.get("features"),
            Some(&ImageStream::Feature {
                transforms: vec![scale]
            })
        );
        assert_eq!(config.input.get("labels").map(ImageStream::role), Some(StreamRole::Label));
        Ok(())
    }

    #[test]
    fn test_image_rejects_unknown_alias() -> Result<()> {
        let streams = StreamDefs::new()
            .with("features", StreamDescriptor::new("image"))
            .with("text", StreamDescriptor::new("caption"));
        let err = ImageDeserializerConfig::from_streams("map.txt", &streams).unwrap_err();
        assert!(config_error(&err));
        assert!(err.to_string().contains("'caption'"));
        assert!(err.to_string().contains("allowed are 'image' and 'label'"));
        Ok(())
    }

    #[test]
    fn test_image_label_requires_dimension() {
        let streams = StreamDefs::new().with("labels", StreamDescriptor::new("label"));
        let err = ImageDeserializerConfig::from_streams("map.txt", &streams).unwrap_err();
        assert!(config_error(&err));
    }

    #[test]
    fn test_mapping_same_name_twice_keeps_last() -> Result<()> {
        let DeserializerConfig::Image(config) = ImageDeserializerBuilder::new("map.txt")
            .map_labels("y", 5)
            .map_labels("y", 7)
            .build()?
        else {
            panic!("expected an image configuration");
        };
        assert_eq!(config.input.len(), 1);
        assert_eq!(config.input.get("y"), Some(&ImageStream::Label { label_dim: 7 }));
        Ok(())
    }

    #[test]
    fn test_text_from_streams_defaults_alias_to_name() -> Result<()> {
        let streams = StreamDefs::new()
            .with("words", StreamDescriptor::new("x").with_dimension(100)?.sparse(true))
            .with("tags", StreamDescriptor::default().with_dimension(4)?);

        let DeserializerConfig::TextFormat(config) =
            TextFormatDeserializerConfig::from_streams("data.ctf", &streams)?
        else {
            panic!("expected a text configuration");
        };
        assert_eq!(
            config.input.get("words"),
            Some(&TextStream {
                dim: 100,
                format: StorageFormat::Sparse,
                alias: "x".into()
            })
        );
        assert_eq!(config.input.get("tags").map(|s| s.alias.as_str()), Some("tags"));
        Ok(())
    }

    #[test]
    fn test_text_stream_requires_dimension_and_unique_alias() {
        let streams = StreamDefs::new().with("words", StreamDescriptor::new("x"));
        assert!(config_error(
            &TextFormatDeserializerConfig::from_streams("data.ctf", &streams).unwrap_err()
        ));

        let err = TextFormatDeserializerBuilder::new("data.ctf")
            .map_input("a", 3, StorageFormat::Dense, Some("x"))
            .map_input("b", 3, StorageFormat::Dense, Some("x"))
            .build()
            .unwrap_err();
        assert!(config_error(&err));
    }

    #[test]
    fn test_empty_deserializer_rejected() {
        assert!(ImageDeserializerBuilder::new("map.txt").build().is_err());
        assert!(TextFormatDeserializerBuilder::new("data.ctf").build().is_err());
    }

    #[test]
    fn test_dictionary_form() -> Result<()> {
        let config = ImageDeserializerBuilder::new("map.txt")
            .map_features(
                "features",
                vec![ImageTransform::crop(
                    CropType::Center,
                    CropRatio::Fixed(0.5),
                    JitterType::None,
                )?],
            )
            .map_labels("labels", 3)
            .build()?;

        let value = serde_json::to_value(&config)?;
        assert_eq!(
            value,
            json!({
                "type": "ImageDeserializer",
                "file": "map.txt",
                "input": {
                    "features": {"transforms": [
                        {"type": "Crop", "cropType": "center", "cropRatio": 0.5, "jitterType": "None"}
                    ]},
                    "labels": {"labelDim": 3}
                },
                "decodeWorkers": 0
            })
        );
        let parsed: DeserializerConfig = serde_json::from_value(value)?;
        assert_eq!(parsed, config);

        let text: DeserializerConfig = serde_json::from_value(json!({
            "type": "CNTKTextFormatDeserializer",
            "file": "data.ctf",
            "input": {"features": {"dim": 3, "format": "dense"}}
        }))?;
        let DeserializerConfig::TextFormat(text) = text else {
            panic!("expected a text configuration");
        };
        assert_eq!(text.precision, ElementType::Float32);
        assert_eq!(text.input.get("features").map(|s| s.alias_or("features")), Some("features"));
        Ok(())
    }

    #[test]
    fn test_null_transforms_default_to_empty() -> Result<()> {
        let stream: ImageStream = serde_json::from_value(json!({"transforms": null}))?;
        assert_eq!(stream, ImageStream::Feature { transforms: vec![] });
        let stream: ImageStream = serde_json::from_value(json!({}))?;
        assert_eq!(stream.role(), StreamRole::Feature);
        assert!(serde_json::from_value::<ImageStream>(json!({"labelDim": "ten"})).is_err());
        Ok(())
    }
}
