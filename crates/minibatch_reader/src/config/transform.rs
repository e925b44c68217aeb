//! Declarative image transforms attached to image feature streams.
//!
//! These are pure values: they describe what the image decoder should do and
//! are serialized into the reader dictionary. The runtime counterparts live in
//! [`crate::transforms::vision`].

use crate::error::ReaderError;
use anyhow::{bail, ensure, Error, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Where a crop window is placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CropType {
    #[serde(rename = "center", alias = "Center")]
    Center,
    #[serde(rename = "random", alias = "Random")]
    Random,
}

/// How the crop ratio varies between records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JitterType {
    #[serde(rename = "None", alias = "none")]
    None,
    /// Ratio drawn uniformly from the configured range.
    #[serde(rename = "uniRatio", alias = "UniRatio", alias = "uniratio")]
    UniRatio,
}

/// Resampling filter for [`ImageTransform::Scale`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interpolation {
    Nearest,
    Linear,
    Cubic,
    Lanczos,
}

/// Side of the crop window relative to the shorter image side.
///
/// Written either as a single ratio (`0.875`) or as a colon-delimited range
/// used for scale jitter (`"0.875:0.466"`). Ranges are stored with
/// `min <= max` whatever order they were written in.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "CropRatioRepr", into = "CropRatioRepr")]
pub enum CropRatio {
    Fixed(f64),
    Range { min: f64, max: f64 },
}

impl CropRatio {
    pub fn fixed(ratio: f64) -> Result<Self> {
        Ok(Self::Fixed(Self::check(ratio)?))
    }

    /// Parses `"r"` or `"a:b"`.
    pub fn parse(text: &str) -> Result<Self> {
        let parts: Vec<&str> = text.split(':').map(str::trim).collect();
        match parts.as_slice() {
            [single] => Self::fixed(Self::parse_one(single, text)?),
            [first, second] => {
                let a = Self::check(Self::parse_one(first, text)?)?;
                let b = Self::check(Self::parse_one(second, text)?)?;
                Ok(Self::Range {
                    min: a.min(b),
                    max: a.max(b),
                })
            }
            _ => bail!(ReaderError::config(format!(
                "crop ratio '{}' must be a single ratio or two colon-delimited ratios",
                text
            ))),
        }
    }

    fn parse_one(part: &str, whole: &str) -> Result<f64> {
        part.parse::<f64>().map_err(|_| {
            Error::new(ReaderError::config(format!(
                "crop ratio '{}' contains a non-numeric value '{}'",
                whole, part
            )))
        })
    }

    fn check(ratio: f64) -> Result<f64> {
        ensure!(
            ratio.is_finite() && ratio > 0.0 && ratio <= 1.0,
            ReaderError::config(format!("crop ratio {} must be in (0, 1]", ratio))
        );
        Ok(ratio)
    }

    pub fn bounds(&self) -> (f64, f64) {
        match *self {
            Self::Fixed(ratio) => (ratio, ratio),
            Self::Range { min, max } => (min, max),
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum CropRatioRepr {
    Number(f64),
    Text(String),
}

impl TryFrom<CropRatioRepr> for CropRatio {
    type Error = Error;

    fn try_from(repr: CropRatioRepr) -> Result<Self> {
        match repr {
            CropRatioRepr::Number(ratio) => Self::fixed(ratio),
            CropRatioRepr::Text(text) => Self::parse(&text),
        }
    }
}

impl From<CropRatio> for CropRatioRepr {
    fn from(ratio: CropRatio) -> Self {
        match ratio {
            CropRatio::Fixed(ratio) => Self::Number(ratio),
            CropRatio::Range { min, max } => Self::Text(format!("{}:{}", min, max)),
        }
    }
}

/// One step of an image feature stream's transform list, applied in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ImageTransform {
    Crop {
        #[serde(rename = "cropType")]
        crop_type: CropType,
        #[serde(rename = "cropRatio")]
        ratio: CropRatio,
        #[serde(rename = "jitterType")]
        jitter: JitterType,
    },
    Scale {
        width: u32,
        height: u32,
        channels: u32,
        #[serde(rename = "interpolations")]
        interpolation: Interpolation,
    },
    Mean {
        #[serde(rename = "meanFile")]
        file: PathBuf,
    },
}

impl ImageTransform {
    pub fn crop(crop_type: CropType, ratio: CropRatio, jitter: JitterType) -> Result<Self> {
        let transform = Self::Crop {
            crop_type,
            ratio,
            jitter,
        };
        transform.validate()?;
        Ok(transform)
    }

    pub fn scale(width: u32, height: u32, channels: u32, interpolation: Interpolation) -> Result<Self> {
        let transform = Self::Scale {
            width,
            height,
            channels,
            interpolation,
        };
        transform.validate()?;
        Ok(transform)
    }

    pub fn mean(file: impl Into<PathBuf>) -> Self {
        Self::Mean { file: file.into() }
    }

    /// Re-checks invariants; values deserialized from a dictionary bypass the
    /// constructors.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Crop { ratio, jitter, .. } => {
                let (min, max) = ratio.bounds();
                CropRatio::check(min)?;
                CropRatio::check(max)?;
                ensure!(
                    !(matches!(ratio, CropRatio::Range { .. }) && *jitter == JitterType::None),
                    ReaderError::config("a crop ratio range requires jitter type 'uniRatio'")
                );
            }
            Self::Scale {
                width,
                height,
                channels,
                ..
            } => {
                ensure!(
                    *width > 0 && *height > 0,
                    ReaderError::config(format!(
                        "scale target must be positive (got {}x{})",
                        width, height
                    ))
                );
                ensure!(
                    *channels == 1 || *channels == 3,
                    ReaderError::config(format!(
                        "scale supports 1 or 3 channels (got {})",
                        channels
                    ))
                );
            }
            Self::Mean { file } => {
                ensure!(
                    !file.as_os_str().is_empty(),
                    ReaderError::config("mean transform requires a file")
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_crop_ratio_parsing() -> Result<()> {
        assert_eq!(CropRatio::parse("0.875")?, CropRatio::Fixed(0.875));
        assert_eq!(
            CropRatio::parse("0.875:0.466")?,
            CropRatio::Range {
                min: 0.466,
                max: 0.875
            }
        );
        assert_eq!(
            CropRatio::parse("0.5:0.75")?,
            CropRatio::Range { min: 0.5, max: 0.75 }
        );
        Ok(())
    }

    #[test]
    fn test_crop_ratio_rejects_malformed() {
        for bad in ["", "abc", "0.5:", "0.1:0.2:0.3", "1.5", "0", "0.5:nan"] {
            let err = CropRatio::parse(bad).unwrap_err();
            assert!(
                matches!(ReaderError::of(&err), Some(ReaderError::Config(_))),
                "'{}' should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_transform_dictionary_form() -> Result<()> {
        let crop = ImageTransform::crop(
            CropType::Random,
            CropRatio::parse("0.875:0.466")?,
            JitterType::UniRatio,
        )?;
        let value = serde_json::to_value(&crop)?;
        assert_eq!(
            value,
            json!({"type": "Crop", "cropType": "random", "cropRatio": "0.466:0.875", "jitterType": "uniRatio"})
        );

        let scale: ImageTransform = serde_json::from_value(json!({
            "type": "Scale", "width": 32, "height": 16, "channels": 3, "interpolations": "cubic"
        }))?;
        assert_eq!(scale, ImageTransform::scale(32, 16, 3, Interpolation::Cubic)?);

        let crop: ImageTransform = serde_json::from_value(json!({
            "type": "Crop", "cropType": "center", "cropRatio": 0.5, "jitterType": "None"
        }))?;
        assert_eq!(
            crop,
            ImageTransform::crop(CropType::Center, CropRatio::Fixed(0.5), JitterType::None)?
        );
        Ok(())
    }

    #[test]
    fn test_invalid_transforms() {
        assert!(ImageTransform::scale(0, 10, 3, Interpolation::Linear).is_err());
        assert!(ImageTransform::scale(10, 10, 4, Interpolation::Linear).is_err());
        assert!(ImageTransform::crop(
            CropType::Center,
            CropRatio::Range { min: 0.4, max: 0.8 },
            JitterType::None
        )
        .is_err());

        let bad: std::result::Result<ImageTransform, _> = serde_json::from_value(json!({
            "type": "Crop", "cropType": "center", "cropRatio": "2.0", "jitterType": "None"
        }));
        assert!(bad.is_err());
    }
}
