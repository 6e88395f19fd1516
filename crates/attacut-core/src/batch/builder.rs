//! # Batch Builder
//!
//! Splits the input stream into fixed-size chunks of lines and assembles each
//! chunk into a zero-padded [`Batch`].

use std::io;

use rayon::prelude::*;
use tracing::debug;

use crate::error::{AttacutError, Result};
use crate::features::{FeatureError, FeatureExtractor, FeatureSet};

/// Raw lines of one batch, before feature extraction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineChunk {
    /// 0-based batch index in the run
    pub index: usize,
    /// Original index of the first line in the chunk
    pub first_line: usize,
    /// The lines, in input order
    pub lines: Vec<String>,
}

/// Lazily groups an input stream into [`LineChunk`]s of at most `batch_size` lines.
///
/// Stops after the first read error. Invalid UTF-8 is reported as an
/// extraction error on the line it occurs on.
pub struct LineChunks<I> {
    lines: I,
    batch_size: usize,
    next_index: usize,
    next_line: usize,
    done: bool,
}

impl<I> LineChunks<I>
where
    I: Iterator<Item = io::Result<String>>,
{
    pub fn new(lines: I, batch_size: usize) -> Self {
        Self {
            lines,
            batch_size: batch_size.max(1),
            next_index: 0,
            next_line: 0,
            done: false,
        }
    }
}

impl<I> Iterator for LineChunks<I>
where
    I: Iterator<Item = io::Result<String>>,
{
    type Item = Result<LineChunk>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let first_line = self.next_line;
        let mut lines = Vec::with_capacity(self.batch_size);

        while lines.len() < self.batch_size {
            match self.lines.next() {
                Some(Ok(line)) => {
                    lines.push(line);
                    self.next_line += 1;
                }
                Some(Err(e)) => {
                    self.done = true;
                    let err = if e.kind() == io::ErrorKind::InvalidData {
                        AttacutError::Extraction {
                            line: self.next_line,
                            reason: e.to_string(),
                        }
                    } else {
                        AttacutError::Io(e)
                    };
                    return Some(Err(err));
                }
                None => {
                    self.done = true;
                    break;
                }
            }
        }

        if lines.is_empty() {
            return None;
        }

        let chunk = LineChunk {
            index: self.next_index,
            first_line,
            lines,
        };
        self.next_index += 1;
        Some(Ok(chunk))
    }
}

/// A line inside a batch: where it came from and what to decode it with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchEntry {
    /// Original 0-based line index
    pub line: usize,
    /// Reference character groups
    pub tokens: Vec<String>,
    /// Number of real positions
    pub length: usize,
}

/// A group of lines padded to a common width.
///
/// Features live in one contiguous `[len, max_length, feature_dim]` buffer in
/// original intra-batch order. Padding is the all-zero feature vector.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    index: usize,
    entries: Vec<BatchEntry>,
    features: Vec<f32>,
    max_length: usize,
    feature_dim: usize,
}

impl Batch {
    /// Extract features for every line of `chunk` and pad them.
    ///
    /// Lines are extracted in parallel; if several fail, the error names the
    /// lowest line index.
    pub fn assemble<E>(chunk: LineChunk, extractor: &E) -> Result<Self>
    where
        E: FeatureExtractor + ?Sized,
    {
        let results: Vec<std::result::Result<FeatureSet, FeatureError>> = chunk
            .lines
            .par_iter()
            .map(|line| extractor.extract(line.trim_end()))
            .collect();

        let mut sets = Vec::with_capacity(results.len());
        for (offset, result) in results.into_iter().enumerate() {
            let set = result.map_err(|e| AttacutError::Extraction {
                line: chunk.first_line + offset,
                reason: e.to_string(),
            })?;
            sets.push(set);
        }

        Self::from_feature_sets(chunk.index, chunk.first_line, sets, extractor.feature_dim())
    }

    /// Pad already-extracted feature sets into a batch.
    pub fn from_feature_sets(
        index: usize,
        first_line: usize,
        sets: Vec<FeatureSet>,
        feature_dim: usize,
    ) -> Result<Self> {
        for (offset, set) in sets.iter().enumerate() {
            set.check(feature_dim)
                .map_err(|e| AttacutError::Extraction {
                    line: first_line + offset,
                    reason: e.to_string(),
                })?;
        }

        let max_length = sets.iter().map(FeatureSet::len).max().unwrap_or(0);
        let row_width = max_length * feature_dim;

        let mut features = vec![0.0f32; sets.len() * row_width];
        let mut entries = Vec::with_capacity(sets.len());

        for (offset, set) in sets.into_iter().enumerate() {
            let start = offset * row_width;
            features[start..start + set.features.len()].copy_from_slice(&set.features);
            entries.push(BatchEntry {
                line: first_line + offset,
                length: set.len(),
                tokens: set.tokens,
            });
        }

        debug!(
            batch = index,
            lines = entries.len(),
            max_length,
            "assembled batch"
        );

        Ok(Self {
            index,
            entries,
            features,
            max_length,
            feature_dim,
        })
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Width every row is padded to.
    pub fn max_length(&self) -> usize {
        self.max_length
    }

    pub fn feature_dim(&self) -> usize {
        self.feature_dim
    }

    pub fn entries(&self) -> &[BatchEntry] {
        &self.entries
    }

    pub fn entry(&self, position: usize) -> &BatchEntry {
        &self.entries[position]
    }

    /// True lengths in original intra-batch order.
    pub fn lengths(&self) -> Vec<usize> {
        self.entries.iter().map(|e| e.length).collect()
    }

    /// Padded `[max_length, feature_dim]` features of the entry at `position`.
    pub fn row(&self, position: usize) -> &[f32] {
        let row_width = self.max_length * self.feature_dim;
        &self.features[position * row_width..(position + 1) * row_width]
    }

    /// The whole padded buffer, original order.
    pub fn features(&self) -> &[f32] {
        &self.features
    }
}

/// Lazy sequence of assembled batches over an input stream.
pub struct BatchBuilder<'e, I, E: ?Sized> {
    chunks: LineChunks<I>,
    extractor: &'e E,
}

impl<'e, I, E> BatchBuilder<'e, I, E>
where
    I: Iterator<Item = io::Result<String>>,
    E: FeatureExtractor + ?Sized,
{
    pub fn new(lines: I, batch_size: usize, extractor: &'e E) -> Self {
        Self {
            chunks: LineChunks::new(lines, batch_size),
            extractor,
        }
    }
}

impl<I, E> Iterator for BatchBuilder<'_, I, E>
where
    I: Iterator<Item = io::Result<String>>,
    E: FeatureExtractor + ?Sized,
{
    type Item = Result<Batch>;

    fn next(&mut self) -> Option<Self::Item> {
        let chunk = match self.chunks.next()? {
            Ok(chunk) => chunk,
            Err(e) => return Some(Err(e)),
        };
        Some(Batch::assemble(chunk, self.extractor))
    }
}

/// Build batches of at most `batch_size` lines from `lines`.
pub fn build<'e, I, E>(lines: I, batch_size: usize, extractor: &'e E) -> BatchBuilder<'e, I::IntoIter, E>
where
    I: IntoIterator<Item = io::Result<String>>,
    E: FeatureExtractor + ?Sized,
{
    BatchBuilder::new(lines.into_iter(), batch_size, extractor)
}
