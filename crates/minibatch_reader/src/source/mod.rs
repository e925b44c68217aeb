//! src/source/mod.rs
//!
//! Minibatch sourcing over configured deserializers.
//!
//! ```text
//! source/
//! ├── bundler.rs           → row-aligned join of deserializers, global stream ids
//! ├── collator.rs          → per-stream padding + masks
//! ├── minibatch.rs         → Minibatch, MinibatchData, MinibatchRequest
//! ├── checkpoint.rs        → serializable read position
//! ├── partition.rs         → distributed worker shares
//! └── minibatch_source.rs  → the pull-based source
//! ```

mod bundler;
pub mod checkpoint;
pub mod collator;
pub mod minibatch;
pub mod minibatch_source;
pub mod partition;

pub use checkpoint::CheckpointState;
pub use collator::{Collator, PaddingCollator};
pub use minibatch::{Minibatch, MinibatchData, MinibatchRequest};
pub use minibatch_source::{MinibatchSource, SourceState};
pub use partition::WorkerPartition;
