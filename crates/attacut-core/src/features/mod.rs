//! # Feature Extraction
//!
//! Converts a raw line into per-character feature vectors plus the reference
//! tokens used to rebuild words after inference.

pub mod charset;

use thiserror::Error;

pub use charset::{CharClass, CharFeatureExtractor, CharVocab};

/// Why a line could not be turned into features.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FeatureError {
    /// The line contains a control character the vocabulary cannot represent.
    #[error("control character U+{code:04X} at column {column}")]
    ControlCharacter { code: u32, column: usize },

    /// Token characters do not line up one-to-one with feature positions.
    #[error("tokens cover {chars} characters but features cover {positions} positions")]
    LengthMismatch { chars: usize, positions: usize },

    /// The feature vectors do not have the width the extractor advertises.
    #[error("expected feature width {expected}, got {actual} values")]
    Width { expected: usize, actual: usize },

    /// Extractor-specific failure.
    #[error("{0}")]
    Other(String),
}

/// Features and reference tokens for a single line.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureSet {
    /// Character groups of the line, in order. Their concatenation is the line.
    pub tokens: Vec<String>,
    /// Row-major `[length, feature_dim]` feature values.
    pub features: Vec<f32>,
    /// Width of one feature vector.
    pub feature_dim: usize,
}

impl FeatureSet {
    pub fn new(tokens: Vec<String>, features: Vec<f32>, feature_dim: usize) -> Self {
        Self {
            tokens,
            features,
            feature_dim,
        }
    }

    /// Number of real (non-padding) positions.
    pub fn len(&self) -> usize {
        if self.feature_dim == 0 {
            0
        } else {
            self.features.len() / self.feature_dim
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total number of characters across all tokens.
    pub fn char_count(&self) -> usize {
        self.tokens.iter().map(|t| t.chars().count()).sum()
    }

    /// Check the padding contract: fixed width, and one feature vector per token character.
    pub fn check(&self, expected_dim: usize) -> Result<(), FeatureError> {
        if self.feature_dim != expected_dim
            || (expected_dim > 0 && self.features.len() % expected_dim != 0)
        {
            return Err(FeatureError::Width {
                expected: expected_dim,
                actual: self.features.len(),
            });
        }
        let chars = self.char_count();
        let positions = self.len();
        if chars != positions {
            return Err(FeatureError::LengthMismatch { chars, positions });
        }
        Ok(())
    }
}

/// Converts a line into a [`FeatureSet`].
///
/// Implementations must be pure with respect to the line: the pipeline may call
/// `extract` for several lines of a batch from different threads.
pub trait FeatureExtractor: Send + Sync {
    /// Width of every feature vector this extractor produces.
    fn feature_dim(&self) -> usize;

    /// Extract features for a line that has already had trailing whitespace removed.
    fn extract(&self, line: &str) -> Result<FeatureSet, FeatureError>;
}
