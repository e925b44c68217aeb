//! Error taxonomy for the reader and sanitizer.
//!
//! Public functions return [`anyhow::Result`]. Failures that callers may want
//! to tell apart are raised as a [`ReaderError`] value, so they can be
//! classified after propagation:
//!
//! ```ignore
//! match err.downcast_ref::<ReaderError>() {
//!     Some(ReaderError::Lookup(_)) => { /* unknown stream */ }
//!     _ => return Err(err),
//! }
//! ```

/// Classified failure raised synchronously by the call that detects it.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ReaderError {
    /// Malformed or contradictory configuration or call arguments.
    #[error("configuration error: {0}")]
    Config(String),

    /// A name resolved to zero or more than one candidate.
    #[error("lookup error: {0}")]
    Lookup(String),

    /// Incompatible tensor shapes within one batch.
    #[error("shape error: {0}")]
    Shape(String),

    /// Unsupported or unconvertible element type.
    #[error("type error: {0}")]
    Type(String),

    /// Malformed record in an input file.
    #[error("format error: {0}")]
    Format(String),
}

impl ReaderError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn lookup(msg: impl Into<String>) -> Self {
        Self::Lookup(msg.into())
    }

    pub fn shape(msg: impl Into<String>) -> Self {
        Self::Shape(msg.into())
    }

    pub fn type_error(msg: impl Into<String>) -> Self {
        Self::Type(msg.into())
    }

    pub fn format(msg: impl Into<String>) -> Self {
        Self::Format(msg.into())
    }

    /// Finds the classified error inside an `anyhow` chain, if there is one.
    pub fn of(err: &anyhow::Error) -> Option<&ReaderError> {
        err.chain().find_map(|cause| cause.downcast_ref::<ReaderError>())
    }
}
