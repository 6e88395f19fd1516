//! # Segmenter Configuration
//!
//! Immutable run settings handed to [`crate::Segmenter::new`].

use crate::error::{AttacutError, Result};

/// Default number of lines per batch.
pub const DEFAULT_BATCH_SIZE: usize = 20;

/// Default probability above which a position is a word boundary.
pub const DEFAULT_THRESHOLD: f32 = 0.5;

/// Default word separator in output lines.
pub const DEFAULT_SEPARATOR: &str = "|";

/// Configuration for the segmentation pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmenterConfig {
    /// Maximum number of lines per batch
    pub batch_size: usize,
    /// Boundary threshold; a position is a boundary when its probability is strictly greater
    pub threshold: f32,
    /// String placed between words of one output line
    pub separator: String,
    /// Number of batches processed concurrently (1 = sequential)
    pub num_workers: usize,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            threshold: DEFAULT_THRESHOLD,
            separator: DEFAULT_SEPARATOR.to_string(),
            num_workers: 1,
        }
    }
}

impl SegmenterConfig {
    /// Create a new configuration with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the batch size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Set the boundary threshold.
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    /// Set the output word separator.
    pub fn with_separator(mut self, separator: impl Into<String>) -> Self {
        self.separator = separator.into();
        self
    }

    /// Set the number of concurrent batch workers.
    pub fn with_num_workers(mut self, num_workers: usize) -> Self {
        self.num_workers = num_workers;
        self
    }

    /// Reject settings the pipeline cannot honor. Values are never clamped.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(AttacutError::Configuration(
                "batch size must be positive".into(),
            ));
        }
        if !self.threshold.is_finite() || !(0.0..=1.0).contains(&self.threshold) {
            return Err(AttacutError::Configuration(format!(
                "threshold must be within [0, 1], got {}",
                self.threshold
            )));
        }
        if self.separator.contains(['\n', '\r']) {
            return Err(AttacutError::Configuration(
                "separator must not contain a line break".into(),
            ));
        }
        if self.num_workers == 0 {
            return Err(AttacutError::Configuration(
                "number of workers must be positive".into(),
            ));
        }
        Ok(())
    }
}
