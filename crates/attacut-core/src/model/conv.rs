//! # Dilated Convolution Boundary Model
//!
//! Character + character-class embeddings, a set of dilated 1-D convolutions,
//! and a two-layer head producing one boundary probability per character.
//! Uses candle for inference without external dependencies.

use std::path::Path;

use candle_core::{DType, Device, Module, Tensor};
use candle_nn::{Conv1d, Conv1dConfig, Embedding, Linear, VarBuilder};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::batch::SortedBatch;
use crate::error::{AttacutError, Result};
use crate::features::charset::{CharClass, FEATURE_DIM};
use crate::model::BoundaryClassifier;

/// Hyper-parameters stored next to the weights as `config.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    pub vocab_size: usize,
    #[serde(default = "default_num_classes")]
    pub num_classes: usize,
    pub char_embedding_dim: usize,
    pub class_embedding_dim: usize,
    pub conv_filters: usize,
    pub kernel_size: usize,
    pub dilations: Vec<usize>,
    pub hidden_dim: usize,
}

fn default_num_classes() -> usize {
    CharClass::NUM_CLASSES
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            vocab_size: 184,
            num_classes: CharClass::NUM_CLASSES,
            char_embedding_dim: 32,
            class_embedding_dim: 8,
            conv_filters: 64,
            kernel_size: 3,
            dilations: vec![1, 3, 9],
            hidden_dim: 32,
        }
    }
}

impl ModelConfig {
    /// Read and validate a `config.json`.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let config_str = std::fs::read_to_string(path).map_err(|e| {
            AttacutError::ModelLoad(format!("Failed to read config {}: {}", path.display(), e))
        })?;
        let config: ModelConfig = serde_json::from_str(&config_str)
            .map_err(|e| AttacutError::ModelLoad(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let dims = [
            ("vocab_size", self.vocab_size),
            ("num_classes", self.num_classes),
            ("char_embedding_dim", self.char_embedding_dim),
            ("class_embedding_dim", self.class_embedding_dim),
            ("conv_filters", self.conv_filters),
            ("hidden_dim", self.hidden_dim),
        ];
        if let Some((name, _)) = dims.iter().find(|(_, v)| *v == 0) {
            return Err(AttacutError::ModelLoad(format!("{} must be positive", name)));
        }
        // Same-length convolutions need a centred kernel.
        if self.kernel_size % 2 == 0 {
            return Err(AttacutError::ModelLoad(format!(
                "kernel_size must be odd, got {}",
                self.kernel_size
            )));
        }
        if self.dilations.is_empty() || self.dilations.contains(&0) {
            return Err(AttacutError::ModelLoad(
                "dilations must be a non-empty list of positive values".into(),
            ));
        }
        Ok(())
    }
}

/// Character-level boundary classifier.
pub struct CharConvModel {
    char_embeddings: Embedding,
    class_embeddings: Embedding,
    convs: Vec<Conv1d>,
    hidden: Linear,
    output: Linear,
    config: ModelConfig,
    device: Device,
}

impl CharConvModel {
    /// Build the model from a var builder.
    pub fn load(vb: VarBuilder, config: ModelConfig) -> candle_core::Result<Self> {
        let char_embeddings = candle_nn::embedding(
            config.vocab_size,
            config.char_embedding_dim,
            vb.pp("char_embeddings"),
        )?;
        let class_embeddings = candle_nn::embedding(
            config.num_classes,
            config.class_embedding_dim,
            vb.pp("class_embeddings"),
        )?;

        let in_channels = config.char_embedding_dim + config.class_embedding_dim;
        let convs = config
            .dilations
            .iter()
            .enumerate()
            .map(|(i, &dilation)| {
                let cfg = Conv1dConfig {
                    padding: dilation * (config.kernel_size - 1) / 2,
                    dilation,
                    ..Default::default()
                };
                candle_nn::conv1d(
                    in_channels,
                    config.conv_filters,
                    config.kernel_size,
                    cfg,
                    vb.pp(format!("conv{}", i)),
                )
            })
            .collect::<candle_core::Result<Vec<_>>>()?;

        let hidden = candle_nn::linear(
            config.conv_filters * config.dilations.len(),
            config.hidden_dim,
            vb.pp("hidden"),
        )?;
        let output = candle_nn::linear(config.hidden_dim, 1, vb.pp("output"))?;

        Ok(Self {
            char_embeddings,
            class_embeddings,
            convs,
            hidden,
            output,
            device: vb.device().clone(),
            config,
        })
    }

    /// Load `config.json` and `model.safetensors` from a model directory.
    pub fn from_dir<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        let config = ModelConfig::from_path(dir.join(super::CONFIG_FILE))?;

        let weights_path = dir.join(super::WEIGHTS_FILE);
        if !weights_path.exists() {
            return Err(AttacutError::ModelLoad(format!(
                "Model not found at {}",
                weights_path.display()
            )));
        }

        let device = Device::Cpu;
        // SAFETY: the weights file is memory-mapped read-only and must not be
        // modified while the model is alive.
        let vb = unsafe {
            VarBuilder::from_mmaped_safetensors(&[&weights_path], DType::F32, &device)
        }
        .map_err(|e| AttacutError::ModelLoad(e.to_string()))?;

        let model = Self::load(vb, config).map_err(|e| AttacutError::ModelLoad(e.to_string()))?;
        info!(path = %dir.display(), "loaded boundary model");
        Ok(model)
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Forward pass producing boundary probabilities.
    /// `features`: [batch_size, seq_len, 2] (char id, class id)
    /// `lengths`: [batch_size]
    /// Returns [batch_size, seq_len]; positions at or past a row's length are 0.
    pub fn forward(&self, features: &Tensor, lengths: &Tensor) -> candle_core::Result<Tensor> {
        let (_, seq_len, _) = features.dims3()?;

        let char_ids = features.narrow(2, 0, 1)?.squeeze(2)?.to_dtype(DType::U32)?;
        let class_ids = features.narrow(2, 1, 1)?.squeeze(2)?.to_dtype(DType::U32)?;

        let positions = Tensor::arange(0u32, seq_len as u32, features.device())?;
        let mask = positions
            .unsqueeze(0)?
            .broadcast_lt(&lengths.unsqueeze(1)?)?
            .to_dtype(DType::F32)?;

        // Zero padded positions so they look exactly like the convolution's own
        // zero padding at the sequence edge.
        let embedded = Tensor::cat(
            &[
                &self.char_embeddings.forward(&char_ids)?,
                &self.class_embeddings.forward(&class_ids)?,
            ],
            2,
        )?
        .broadcast_mul(&mask.unsqueeze(2)?)?;

        let x = embedded.transpose(1, 2)?.contiguous()?;
        let branches = self
            .convs
            .iter()
            .map(|conv| conv.forward(&x)?.relu())
            .collect::<candle_core::Result<Vec<_>>>()?;

        let x = Tensor::cat(&branches, 1)?.transpose(1, 2)?.contiguous()?;
        let x = self.hidden.forward(&x)?.relu()?;
        let logits = self.output.forward(&x)?.squeeze(2)?;

        candle_nn::ops::sigmoid(&logits)?.mul(&mask)
    }
}

impl BoundaryClassifier for CharConvModel {
    fn predict(&self, batch: &SortedBatch<'_>) -> Result<Vec<f32>> {
        let rows = batch.len();
        let width = batch.max_length();
        if rows == 0 || width == 0 {
            return Ok(Vec::new());
        }
        if batch.feature_dim() != FEATURE_DIM {
            return Err(AttacutError::Candle(format!(
                "expected feature width {}, got {}",
                FEATURE_DIM,
                batch.feature_dim()
            )));
        }

        // Rows are gathered into sorted order on the device; the host buffer
        // stays in original order.
        let features = Tensor::from_slice(
            batch.batch().features(),
            (rows, width, FEATURE_DIM),
            &self.device,
        )?;
        let order: Vec<u32> = batch.order().permutation().iter().map(|&i| i as u32).collect();
        let order = Tensor::from_vec(order, rows, &self.device)?;
        let features = features.index_select(&order, 0)?;

        let lengths: Vec<u32> = batch.lengths().into_iter().map(|l| l as u32).collect();
        let lengths = Tensor::from_vec(lengths, rows, &self.device)?;

        let probs = self.forward(&features, &lengths)?;
        Ok(probs.flatten_all()?.to_vec1::<f32>()?)
    }
}
