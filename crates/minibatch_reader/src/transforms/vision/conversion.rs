use crate::transforms::Transform;
use anyhow::{ensure, Result};
use image::{DynamicImage, GenericImageView};
use tch::{Kind, Tensor};

// ============================================================================
// ToTensor
// ============================================================================

/// Converts an image to a channel-first Float tensor of raw pixel values
/// (0.0 to 255.0).
///
/// Channel Handling
/// | Input Format  | Output Shape |
/// |---------------|--------------|
/// | Grayscale (L) | `[1, H, W]`  |
/// | RGB           | `[3, H, W]`  |
/// | Other         | `[3, H, W]`  |
/// Alpha is dropped; other layouts are converted to RGB.
#[derive(Debug)]
pub struct ToTensor;

impl Transform<DynamicImage, Tensor> for ToTensor {
    fn apply(&self, img: DynamicImage) -> Result<Tensor> {
        let (width, height) = img.dimensions();
        ensure!(
            width > 0 && height > 0,
            "Image dimensions must be positive (got {}x{})",
            width,
            height
        );

        let (channels, raw) = match img {
            DynamicImage::ImageLuma8(img) => (1, img.into_raw()),
            DynamicImage::ImageRgb8(img) => (3, img.into_raw()),
            img => (3, img.to_rgb8().into_raw()),
        };

        // HWC bytes -> CHW floats
        Ok(Tensor::from_slice(&raw)
            .reshape(&[height as i64, width as i64, channels])
            .permute(&[2, 0, 1])
            .to_kind(Kind::Float)
            .contiguous())
    }
}
