use crate::error::ReaderError;
use anyhow::{Context, Error, Result};
use serde::{Deserialize, Serialize};

/// Read position of a [`crate::MinibatchSource`].
///
/// `position` counts sequences already delivered from the worker's share of
/// sweep `sweep`. The remaining fields identify the source the state was
/// taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CheckpointState {
    pub sweep: u64,
    pub position: usize,
    #[serde(rename = "samplesSeen")]
    pub samples_seen: u64,
    pub seed: u64,
    pub randomize: bool,
    #[serde(rename = "numSequences")]
    pub num_sequences: usize,
}

impl CheckpointState {
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).context("Failed to serialize checkpoint")
    }

    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|err| {
            Error::new(ReaderError::format(format!("malformed checkpoint: {}", err)))
        })
    }
}
