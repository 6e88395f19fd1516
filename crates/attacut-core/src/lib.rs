//! # Attacut Core
//!
//! Batched word segmentation driven by a character-level boundary classifier.
//! Lines are grouped into batches, padded, sorted by length, scored with one
//! classifier call per batch and decoded back into words in input order.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use attacut_core::{ModelArtifacts, Segmenter, SegmenterConfig};
//!
//! let artifacts = ModelArtifacts::load("models/attacut-c").unwrap();
//! let segmenter = Segmenter::new(
//!     SegmenterConfig::default(),
//!     artifacts.extractor,
//!     artifacts.model,
//! )
//! .unwrap();
//!
//! let words = segmenter.tokenize("ตัดคำภาษาไทย").unwrap();
//! println!("{}", words.join("|"));
//! ```
pub mod batch;
pub mod config;
pub mod decode;
pub mod error;
pub mod features;
pub mod model;
pub mod pipeline;

// Re-export primary API
pub use batch::{Batch, BatchBuilder, LengthOrder, SortedBatch};
pub use config::SegmenterConfig;
pub use decode::{decode, words_from_boundaries, PredictionGrid};
pub use error::{AttacutError, Result};
pub use features::{CharFeatureExtractor, FeatureError, FeatureExtractor, FeatureSet};
pub use model::{BoundaryClassifier, CharConvModel, ModelArtifacts, ModelConfig};
pub use pipeline::{RunSummary, Segmenter};
