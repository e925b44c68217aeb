use crate::error::ReaderError;
use crate::transforms::Transform;
use anyhow::{ensure, Context, Error, Result};
use std::path::Path;
use tch::Tensor;

// ============================================================================
// MeanSubtract
// ============================================================================

/// Subtracts a per-pixel mean image loaded from a file.
///
/// The file is either an OpenCV XML matrix or plain whitespace-separated
/// numbers. Values are in HWC order, as OpenCV stores them, and must cover
/// exactly one `[C, H, W]` input. An XML matrix with `<rows>` and `<cols>`
/// must also have `rows == H` and `cols == W * C`.
///
/// # Mathematical Operation:
/// ```text
/// output[c,h,w] = input[c,h,w] - mean[h,w,c]
/// ```
#[derive(Debug)]
pub struct MeanSubtract {
    mean: Vec<f32>,
    /// `(rows, cols)` declared by an XML matrix.
    layout: Option<(usize, usize)>,
}

impl MeanSubtract {
    pub fn new(mean: Vec<f32>) -> Result<Self> {
        ensure!(!mean.is_empty(), "Mean image cannot be empty");
        Ok(Self { mean, layout: None })
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read mean file: {}", path.display()))?;
        let image = parse_mean(&text)
            .with_context(|| format!("Failed to parse mean file: {}", path.display()))?;
        Ok(Self {
            layout: image.layout,
            ..Self::new(image.values)?
        })
    }
}

#[derive(Debug, PartialEq)]
struct MeanImage {
    values: Vec<f32>,
    layout: Option<(usize, usize)>,
}

/// Text between `<tag>` and `</tag>`, if the element is present.
fn element<'a>(text: &'a str, tag: &str) -> Result<Option<&'a str>> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);
    match (text.find(&open), text.find(&close)) {
        (Some(start), Some(end)) if start < end => Ok(Some(&text[start + open.len()..end])),
        (Some(_), _) => Err(Error::new(ReaderError::format(format!(
            "unterminated <{}> element in mean file",
            tag
        )))),
        _ => Ok(None),
    }
}

fn parse_dimension(text: &str, tag: &str) -> Result<usize> {
    text.trim().parse::<usize>().map_err(|_| {
        Error::new(ReaderError::format(format!(
            "invalid <{}> value '{}' in mean file",
            tag,
            text.trim()
        )))
    })
}

fn parse_mean(text: &str) -> Result<MeanImage> {
    let (values, layout) = match element(text, "data")? {
        Some(data) => {
            let layout = match (element(text, "rows")?, element(text, "cols")?) {
                (Some(rows), Some(cols)) => {
                    Some((parse_dimension(rows, "rows")?, parse_dimension(cols, "cols")?))
                }
                _ => None,
            };
            (data, layout)
        }
        None => (text, None),
    };
    let values = values
        .split_whitespace()
        .map(|token| {
            token.parse::<f32>().map_err(|_| {
                Error::new(ReaderError::format(format!(
                    "invalid number '{}' in mean file",
                    token
                )))
            })
        })
        .collect::<Result<Vec<_>>>()?;
    if let Some((rows, cols)) = layout {
        ensure!(
            rows * cols == values.len(),
            ReaderError::format(format!(
                "mean matrix is declared {}x{} but has {} values",
                rows,
                cols,
                values.len()
            ))
        );
    }
    Ok(MeanImage { values, layout })
}

impl Transform<Tensor, Tensor> for MeanSubtract {
    fn apply(&self, tensor: Tensor) -> Result<Tensor> {
        let (channels, height, width) = tensor
            .size3()
            .context("Input must be 3D tensor [C, H, W]")?;
        if let Some((rows, cols)) = self.layout {
            ensure!(
                rows as i64 == height && cols as i64 == width * channels,
                ReaderError::shape(format!(
                    "mean matrix is {}x{} but the image needs {}x{} (height x width*channels)",
                    rows,
                    cols,
                    height,
                    width * channels
                ))
            );
        }
        ensure!(
            (channels * height * width) as usize == self.mean.len(),
            ReaderError::shape(format!(
                "mean image has {} values but the image is {}x{}x{}",
                self.mean.len(),
                channels,
                height,
                width
            ))
        );

        let mean_t = Tensor::from_slice(&self.mean)
            .reshape(&[height, width, channels])
            .permute(&[2, 0, 1])
            .to_kind(tensor.kind())
            .to_device(tensor.device());
        Ok(tensor - mean_t)
    }
}
