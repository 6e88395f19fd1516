//! # Boundary Classifier
//!
//! The inference boundary of the pipeline, plus the bundled candle model and
//! its on-disk artifacts.

pub mod conv;

use std::path::Path;

use tracing::{debug, warn};

use crate::batch::SortedBatch;
use crate::error::{AttacutError, Result};
use crate::features::{CharFeatureExtractor, CharVocab};

pub use conv::{CharConvModel, ModelConfig};

/// Hyper-parameter file inside a model directory.
pub const CONFIG_FILE: &str = "config.json";

/// Weights file inside a model directory.
pub const WEIGHTS_FILE: &str = "model.safetensors";

/// Optional character vocabulary inside a model directory.
pub const VOCAB_FILE: &str = "characters.json";

/// Scores every position of a length-sorted, padded batch.
pub trait BoundaryClassifier: Send + Sync {
    /// Return one boundary probability per `(sorted row, padded position)`,
    /// laid out row-major: `batch.len() * batch.max_length()` values.
    fn predict(&self, batch: &SortedBatch<'_>) -> Result<Vec<f32>>;
}

/// A loaded model directory: the extractor whose ids the model was trained on,
/// and the model itself.
pub struct ModelArtifacts {
    pub extractor: CharFeatureExtractor,
    pub model: CharConvModel,
}

impl ModelArtifacts {
    /// Load `config.json`, `model.safetensors` and, if present, `characters.json`.
    pub fn load<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(AttacutError::ModelLoad(format!(
                "model directory not found at {}",
                dir.display()
            )));
        }

        let vocab_path = dir.join(VOCAB_FILE);
        let vocab = if vocab_path.exists() {
            debug!(path = %vocab_path.display(), "loading character vocabulary");
            CharVocab::from_path(&vocab_path)?
        } else {
            warn!(
                dir = %dir.display(),
                "no {} in model directory, using the built-in vocabulary",
                VOCAB_FILE
            );
            CharVocab::new()
        };

        let model = CharConvModel::from_dir(dir)?;
        if vocab.vocab_size() > model.config().vocab_size {
            return Err(AttacutError::ModelLoad(format!(
                "vocabulary needs {} embeddings but the model has {}",
                vocab.vocab_size(),
                model.config().vocab_size
            )));
        }

        Ok(Self {
            extractor: CharFeatureExtractor::with_vocab(vocab),
            model,
        })
    }
}
