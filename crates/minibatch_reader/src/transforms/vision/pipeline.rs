use super::{Crop, LoadImage, MeanSubtract, Scale, ToTensor};
use crate::config::ImageTransform;
use crate::error::ReaderError;
use crate::transforms::{Compose, Transform};
use anyhow::{ensure, Result};
use image::DynamicImage;
use std::path::{Path, PathBuf};
use tch::Tensor;

/// Decoder for one image feature stream: file path in, `[C, H, W]` Float out.
pub type ImagePipeline = Box<dyn Transform<PathBuf, Tensor>>;

/// Builds the decoding pipeline for a configured transform list.
///
/// Geometric steps (crop, scale) run on the decoded image, then the image is
/// converted to a tensor and mean subtraction is applied. Relative mean file
/// paths resolve against `base_dir`.
pub fn build_pipeline(transforms: &[ImageTransform], base_dir: &Path) -> Result<ImagePipeline> {
    let mut image_steps: Vec<Box<dyn Transform<DynamicImage, DynamicImage>>> = Vec::new();
    let mut tensor_steps: Vec<Box<dyn Transform<Tensor, Tensor>>> = Vec::new();

    for (index, transform) in transforms.iter().enumerate() {
        transform.validate()?;
        match transform {
            ImageTransform::Crop {
                crop_type,
                ratio,
                jitter,
            } => {
                ensure!(
                    tensor_steps.is_empty(),
                    ReaderError::config(format!(
                        "transform #{} (Crop) must come before Mean",
                        index
                    ))
                );
                image_steps.push(Box::new(Crop::new(*crop_type, *ratio, *jitter)));
            }
            ImageTransform::Scale {
                width,
                height,
                channels,
                interpolation,
            } => {
                ensure!(
                    tensor_steps.is_empty(),
                    ReaderError::config(format!(
                        "transform #{} (Scale) must come before Mean",
                        index
                    ))
                );
                image_steps.push(Box::new(Scale::new(*width, *height, *channels, *interpolation)?));
            }
            ImageTransform::Mean { file } => {
                let path = if file.is_absolute() {
                    file.clone()
                } else {
                    base_dir.join(file)
                };
                tensor_steps.push(Box::new(MeanSubtract::from_file(path)?));
            }
        }
    }

    Ok(Box::new(
        LoadImage::new()
            .then(Compose::new(image_steps))
            .then(ToTensor)
            .then(Compose::new(tensor_steps)),
    ))
}

/// Per-sample shape `[C, H, W]` when the transform list fixes it, that is when
/// the last geometric step is a Scale.
pub fn output_shape(transforms: &[ImageTransform]) -> Option<Vec<i64>> {
    transforms.iter().rev().find_map(|transform| match transform {
        ImageTransform::Scale {
            width,
            height,
            channels,
            ..
        } => Some(Some(vec![*channels as i64, *height as i64, *width as i64])),
        ImageTransform::Crop { .. } => Some(None),
        ImageTransform::Mean { .. } => None,
    })?
}
