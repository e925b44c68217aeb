//! src/deserializers/text_format.rs
//!
//! CNTK text format (CTF): one sample per line, grouped into sequences by an
//! optional leading sequence id.
//!
//! ```text
//! 0   |features 1 2 3 |labels 0:1
//! 0   |features 4 5 6
//! 1   |features 7 8 9 |labels 2:1 |# trailing comment
//!     |features 0 0 0 |labels 1:1
//! ```
//!
//! Consecutive lines sharing an id form one sequence; a line without an id is
//! a sequence on its own. Dense blocks carry exactly `dim` values, sparse
//! blocks carry `index:value` pairs with `index < dim`.

use super::{DataDeserializer, ReadContext};
use crate::config::TextFormatDeserializerConfig;
use crate::error::ReaderError;
use crate::sanitize::{densify, SparseSample};
use crate::stream::{ElementType, StorageFormat, StreamInfo};
use anyhow::{bail, ensure, Context, Error, Result};
use std::collections::{BTreeMap, HashSet};
use tch::{Kind, Tensor};

// ============================================================================
// Reader
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
enum StreamSamples {
    /// Row-major `[len, dim]` values.
    Dense { values: Vec<f64>, len: usize },
    Sparse(Vec<SparseSample>),
}

impl StreamSamples {
    fn empty(storage: StorageFormat) -> Self {
        match storage {
            StorageFormat::Dense => Self::Dense {
                values: Vec::new(),
                len: 0,
            },
            StorageFormat::Sparse => Self::Sparse(Vec::new()),
        }
    }

    fn len(&self) -> usize {
        match self {
            Self::Dense { len, .. } => *len,
            Self::Sparse(samples) => samples.len(),
        }
    }
}

struct PendingSequence {
    id: Option<String>,
    first_line: usize,
    streams: Vec<StreamSamples>,
}

/// In-memory CTF file.
#[derive(Debug)]
pub struct TextFormatDeserializer {
    streams: Vec<StreamInfo>,
    aliases: Vec<String>,
    kind: Kind,
    sequences: Vec<Vec<StreamSamples>>,
}

impl TextFormatDeserializer {
    pub fn open(config: &TextFormatDeserializerConfig) -> Result<Self> {
        let text = std::fs::read_to_string(&config.file)
            .with_context(|| format!("Failed to read {}", config.file.display()))?;
        Self::from_text(&text, config)
    }

    /// Parses CTF content using the streams of `config`; `config.file` is
    /// only used in messages.
    pub fn from_text(text: &str, config: &TextFormatDeserializerConfig) -> Result<Self> {
        config.validate()?;
        let streams: Vec<StreamInfo> = config
            .input
            .iter()
            .enumerate()
            .map(|(id, (name, stream))| StreamInfo {
                id,
                name: name.to_string(),
                storage: stream.format,
                element_type: config.precision,
                dimension: Some(stream.dim),
                sample_shape: vec![stream.dim as i64],
            })
            .collect();
        let aliases = config
            .input
            .iter()
            .map(|(name, stream)| stream.alias_or(name).to_string())
            .collect();

        let mut deserializer = Self {
            streams,
            aliases,
            kind: config.precision.kind(),
            sequences: Vec::new(),
        };
        deserializer.parse(text)?;
        Ok(deserializer)
    }

    fn parse(&mut self, text: &str) -> Result<()> {
        let mut current: Option<PendingSequence> = None;
        let mut unknown_aliases = HashSet::new();

        for (line_index, line) in text.lines().enumerate() {
            let line_number = line_index + 1;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let Some(bar) = line.find('|') else {
                bail!(ReaderError::format(format!(
                    "line {}: expected at least one '|alias' block",
                    line_number
                )));
            };
            let id = line[..bar].trim();
            let id = (!id.is_empty()).then(|| id.to_string());

            let continues = matches!(
                (&current, &id),
                (Some(pending), Some(id)) if pending.id.as_ref() == Some(id)
            );
            if !continues {
                if let Some(pending) = current.take() {
                    self.finish(pending)?;
                }
                current = Some(PendingSequence {
                    id,
                    first_line: line_number,
                    streams: self.streams.iter().map(|s| StreamSamples::empty(s.storage)).collect(),
                });
            }
            if let Some(pending) = current.as_mut() {
                self.parse_line(&line[bar..], line_number, pending, &mut unknown_aliases)?;
            }
        }
        if let Some(pending) = current.take() {
            self.finish(pending)?;
        }
        Ok(())
    }

    fn parse_line(
        &self,
        blocks: &str,
        line_number: usize,
        pending: &mut PendingSequence,
        unknown_aliases: &mut HashSet<String>,
    ) -> Result<()> {
        let mut seen = vec![false; self.streams.len()];
        for block in blocks.split('|').skip(1) {
            if block.starts_with('#') {
                continue;
            }
            let mut tokens = block.split_whitespace();
            let Some(alias) = tokens.next() else {
                bail!(ReaderError::format(format!("line {}: empty '|' block", line_number)));
            };
            let Some(index) = self.aliases.iter().position(|a| a == alias) else {
                if unknown_aliases.insert(alias.to_string()) {
                    log::warn!("line {}: skipping unknown input alias '{}'", line_number, alias);
                }
                continue;
            };
            ensure!(
                !seen[index],
                ReaderError::format(format!(
                    "line {}: alias '{}' appears more than once",
                    line_number, alias
                ))
            );
            seen[index] = true;

            let dim = self.streams[index].dimension.unwrap_or(0);
            match &mut pending.streams[index] {
                StreamSamples::Dense { values, len } => {
                    let before = values.len();
                    for token in tokens {
                        values.push(parse_number(token, line_number)?);
                    }
                    ensure!(
                        values.len() - before == dim,
                        ReaderError::format(format!(
                            "line {}: dense input '{}' expects {} values but got {}",
                            line_number,
                            alias,
                            dim,
                            values.len() - before
                        ))
                    );
                    *len += 1;
                }
                StreamSamples::Sparse(samples) => {
                    let mut sample = SparseSample::new();
                    for token in tokens {
                        let (column, value) = parse_sparse_entry(token, line_number)?;
                        ensure!(
                            column < dim,
                            ReaderError::format(format!(
                                "line {}: sparse index {} of '{}' is out of range for dimension {}",
                                line_number, column, alias, dim
                            ))
                        );
                        sample.insert(column, value);
                    }
                    samples.push(sample);
                }
            }
        }
        Ok(())
    }

    fn finish(&mut self, pending: PendingSequence) -> Result<()> {
        for (info, samples) in self.streams.iter().zip(&pending.streams) {
            ensure!(
                samples.len() > 0,
                ReaderError::format(format!(
                    "sequence starting at line {}: input '{}' has no samples",
                    pending.first_line, info.name
                ))
            );
        }
        self.sequences.push(pending.streams);
        Ok(())
    }

    fn to_tensor(&self, samples: &StreamSamples, dim: usize) -> Result<Tensor> {
        let tensor = match samples {
            StreamSamples::Dense { values, len } => {
                Tensor::from_slice(values).reshape(&[*len as i64, dim as i64])
            }
            StreamSamples::Sparse(samples) => densify(samples, dim)?,
        };
        Ok(tensor.to_kind(self.kind))
    }

    pub fn element_type(&self) -> ElementType {
        self.streams
            .first()
            .map(|s| s.element_type)
            .unwrap_or_default()
    }
}

fn parse_number(token: &str, line_number: usize) -> Result<f64> {
    token.parse::<f64>().map_err(|_| {
        Error::new(ReaderError::format(format!(
            "line {}: invalid number '{}'",
            line_number, token
        )))
    })
}

fn parse_sparse_entry(token: &str, line_number: usize) -> Result<(usize, f64)> {
    let malformed = || {
        Error::new(ReaderError::format(format!(
            "line {}: sparse entry '{}' must be index:value",
            line_number, token
        )))
    };
    let (column, value) = token.split_once(':').ok_or_else(malformed)?;
    let column = column.parse::<usize>().map_err(|_| malformed())?;
    Ok((column, parse_number(value, line_number)?))
}

impl DataDeserializer for TextFormatDeserializer {
    fn streams(&self) -> &[StreamInfo] {
        &self.streams
    }

    fn sequence_count(&self) -> usize {
        self.sequences.len()
    }

    fn sequence_length(&self, index: usize) -> usize {
        self.sequences
            .get(index)
            .and_then(|streams| streams.iter().map(StreamSamples::len).max())
            .unwrap_or(0)
    }

    fn read_sequences(&self, indices: &[usize], _context: ReadContext) -> Result<Vec<Vec<Tensor>>> {
        self.streams
            .iter()
            .enumerate()
            .map(|(stream, info)| {
                let dim = info.dimension.unwrap_or(0);
                indices
                    .iter()
                    .map(|&index| {
                        let sequence = self.sequences.get(index).ok_or_else(|| {
                            Error::new(ReaderError::lookup(format!(
                                "sequence {} out of range ({} sequences)",
                                index,
                                self.sequences.len()
                            )))
                        })?;
                        self.to_tensor(&sequence[stream], dim)
                    })
                    .collect()
            })
            .collect()
    }
}

// ============================================================================
// Writer
// ============================================================================

/// One stream's sequence handed to [`tensors_to_text_format`].
#[derive(Debug)]
pub enum TextSequence {
    /// `[len, ...]`; every step is written flattened in row-major order.
    Dense(Tensor),
    Sparse(Vec<SparseSample>),
}

impl TextSequence {
    pub fn len(&self) -> usize {
        match self {
            Self::Dense(tensor) => tensor.size().first().copied().unwrap_or(0) as usize,
            Self::Sparse(samples) => samples.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Space-separated values of one dense sample.
pub fn dense_to_str(sample: &Tensor) -> Result<String> {
    let values = Vec::<f64>::try_from(&sample.reshape(&[-1]).to_kind(Kind::Double))?;
    Ok(values
        .iter()
        .map(|v| format!("{:?}", v))
        .collect::<Vec<_>>()
        .join(" "))
}

/// `index:value` pairs in ascending index order.
pub fn sparse_to_str(sample: &SparseSample) -> String {
    sample
        .iter()
        .map(|(column, value)| format!("{}:{:?}", column, value))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Writes one sequence as CTF lines, one line per step, aliases sorted.
///
/// Streams shorter than the longest one stop contributing once they run out.
///
/// # Example
/// ```ignore
/// // {"a": [[1, 2], [3, 4]], "b": [{0: 1.0, 5: 2.0}]}
/// assert_eq!(text, "0\t|a 1.0 2.0 |b 0:1.0 5:2.0\n0\t|a 3.0 4.0");
/// ```
pub fn tensors_to_text_format(
    sample_idx: usize,
    alias_map: &BTreeMap<String, TextSequence>,
) -> Result<String> {
    let max_len = alias_map.values().map(TextSequence::len).max().unwrap_or(0);
    let mut lines = Vec::with_capacity(max_len);
    for step in 0..max_len {
        let mut blocks = Vec::with_capacity(alias_map.len());
        for (alias, sequence) in alias_map {
            if step >= sequence.len() {
                continue;
            }
            let values = match sequence {
                TextSequence::Dense(tensor) => dense_to_str(&tensor.get(step as i64))?,
                TextSequence::Sparse(samples) => sparse_to_str(&samples[step]),
            };
            blocks.push(format!("{} {}", alias, values));
        }
        lines.push(format!("{}\t|{}", sample_idx, blocks.join(" |")));
    }
    Ok(lines.join("\n"))
}
