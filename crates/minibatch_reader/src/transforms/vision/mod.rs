//! src/transforms/vision/mod.rs
//!
//! Image decoding steps for image feature streams.
//!
//! ```text
//! transforms/vision/
//! ├── io.rs           → file → DynamicImage
//! ├── geometric.rs    → Crop, Scale
//! ├── conversion.rs   → DynamicImage → [C, H, W] Float tensor
//! ├── photometric.rs  → mean image subtraction
//! └── pipeline.rs     → ImageTransform list → boxed decoder
//! ```
//!
//! ```ignore
//! use crate::transforms::Transform;
//! use crate::transforms::vision::{Crop, LoadImage, ToTensor};
//!
//! let decode = LoadImage::new()
//!     .then(Crop::new(CropType::Center, CropRatio::Fixed(0.875), JitterType::None))
//!     .then(ToTensor);
//! ```

pub mod conversion;
pub mod geometric;
pub mod io;
pub mod photometric;
pub mod pipeline;

pub use conversion::ToTensor;
pub use geometric::{Crop, Scale};
pub use io::LoadImage;
pub use photometric::MeanSubtract;
pub use pipeline::{build_pipeline, output_shape, ImagePipeline};
