use thiserror::Error;

/// Errors that can occur while segmenting a batch of lines.
#[derive(Debug, Error)]
pub enum AttacutError {
    /// A line could not be converted to features.
    #[error("feature extraction failed on line {line}: {reason}")]
    Extraction {
        /// Original 0-based index of the failing line.
        line: usize,
        /// What the extractor rejected.
        reason: String,
    },

    /// The classifier failed or returned output of the wrong shape.
    #[error("inference failed on batch {batch}: {reason}")]
    Inference {
        /// 0-based index of the failing batch.
        batch: usize,
        /// Underlying failure.
        reason: String,
    },

    /// Invalid segmenter settings, rejected before any input is read.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// The model artifacts could not be loaded.
    #[error("failed to load model: {0}")]
    ModelLoad(String),

    /// Candle ML framework error.
    #[error("ML inference error: {0}")]
    Candle(String),

    /// Reading input or writing output failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<candle_core::Error> for AttacutError {
    fn from(err: candle_core::Error) -> Self {
        AttacutError::Candle(err.to_string())
    }
}

/// Result type alias for segmentation operations.
pub type Result<T> = std::result::Result<T, AttacutError>;
