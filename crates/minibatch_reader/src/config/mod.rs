//! src/config/mod.rs
//!
//! Declarative reader configuration.
//!
//! ```text
//! config/
//! ├── transform.rs     → Crop / Scale / Mean descriptors for image streams
//! ├── deserializer.rs  → image and text-format deserializer configs + builders
//! ├── reader.rs        → ReaderConfig, EpochSize, dictionary form
//! └── input_map.rs     → ordered stream name → mapping table
//! ```

pub mod deserializer;
pub mod input_map;
pub mod reader;
pub mod transform;

pub use deserializer::{
    DeserializerConfig, ImageDeserializerBuilder, ImageDeserializerConfig, ImageStream,
    StreamRole, TextFormatDeserializerBuilder, TextFormatDeserializerConfig, TextStream,
};
pub use input_map::InputMap;
pub use reader::{EpochSize, ReaderConfig, ReaderConfigBuilder};
pub use transform::{CropRatio, CropType, ImageTransform, Interpolation, JitterType};
