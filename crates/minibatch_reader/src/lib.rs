//! Minibatch sourcing and batch sanitization on top of `tch`.
//!
//! ```text
//! src/
//! ├── config/         → declarative reader configuration and its dictionary form
//! ├── deserializers/  → text-format and image decoders
//! ├── source/         → MinibatchSource: sweeps, collation, checkpoints
//! ├── sanitize/       → caller-side batches → padded, masked Values
//! ├── transforms/     → image decoding steps
//! ├── stream.rs       → stream descriptors and runtime stream info
//! ├── sampler.rs      → sweep orders
//! ├── rng.rs          → per-record randomness
//! ├── device.rs       → default device
//! └── error.rs        → ReaderError
//! ```

pub mod config;
pub mod deserializers;
pub mod device;
pub mod error;
pub mod rng;
pub mod sampler;
pub mod sanitize;
pub mod source;
pub mod stream;
pub mod transforms;

pub use config::{
    CropRatio, CropType, DeserializerConfig, EpochSize, ImageDeserializerBuilder, ImageTransform,
    Interpolation, JitterType, ReaderConfig, TextFormatDeserializerBuilder,
};
pub use deserializers::{dense_to_str, sparse_to_str, tensors_to_text_format, TextSequence};
pub use device::default_device;
pub use error::ReaderError;
pub use sanitize::{
    get_data_type, sanitize_batch, sanitize_precision, sanitize_var_map, Arguments, Batch,
    InferredType, InputVariable, Mask, MaskKind, NestedList, Operand, SparseSample, Value,
};
pub use source::{
    CheckpointState, Minibatch, MinibatchData, MinibatchRequest, MinibatchSource, SourceState,
    WorkerPartition,
};
pub use stream::{
    ElementType, StorageFormat, StreamConfiguration, StreamDefs, StreamDescriptor, StreamInfo,
};
