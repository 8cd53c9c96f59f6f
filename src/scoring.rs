// src/scoring.rs

use crate::features::ShapeMismatch;
use crate::types::ModelConfig;
use anyhow::{Context, Result};
use ort::{
    execution_providers::CUDAExecutionProvider,
    session::{builder::GraphOptimizationLevel, Session},
};
use thiserror::Error;
use tracing::{debug, info};

/// Faults a single scoring call can raise. Both are recoverable at the
/// tick level; failure to build the session at startup is fatal and goes
/// through `anyhow` instead.
#[derive(Debug, Error)]
pub enum ScoreError {
    #[error(transparent)]
    Shape(#[from] ShapeMismatch),
    #[error("reconstruction inference failed: {0}")]
    Inference(#[from] ort::Error),
}

/// Black-box anomaly model: a fixed-width vector in, a non-negative
/// reconstruction error out. Deterministic for fixed weights.
pub trait AnomalyScorer {
    fn score(&mut self, features: &[f32]) -> Result<f32, ScoreError>;
}

/// Scores against the exported VAE: runs the ONNX graph and returns the
/// mean squared error between the input and its reconstruction.
pub struct ReconstructionScorer {
    session: Session,
    input_dim: usize,
}

impl ReconstructionScorer {
    pub fn new(config: &ModelConfig) -> Result<Self> {
        info!("Initializing reconstruction scorer");
        info!("Model path: {}", config.path);

        let mut session_builder = Session::builder()?;

        if config.use_cuda {
            info!("Enabling CUDA execution provider");
            session_builder =
                session_builder.with_execution_providers([CUDAExecutionProvider::default()
                    .with_device_id(0)
                    .build()])?;
        }

        info!("Building ONNX Runtime session...");
        let session = session_builder
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(config.num_threads)?
            .with_inter_threads(1)?
            .commit_from_file(&config.path)
            .context("Failed to load reconstruction model")?;

        info!("✓ Reconstruction scorer initialized successfully");

        Ok(Self {
            session,
            input_dim: config.input_dim,
        })
    }
}

impl AnomalyScorer for ReconstructionScorer {
    fn score(&mut self, features: &[f32]) -> Result<f32, ScoreError> {
        if features.len() != self.input_dim {
            return Err(ShapeMismatch {
                expected: self.input_dim,
                actual: features.len(),
            }
            .into());
        }

        let shape = [1, self.input_dim];
        let input_value = ort::value::Value::from_array((
            shape.as_slice(),
            features.to_vec().into_boxed_slice(),
        ))?;

        let outputs = self.session.run(ort::inputs!["input" => input_value])?;

        // The exported graph emits (reconstruction, mu, logvar); only the
        // reconstruction participates in the score.
        let (_, reconstruction) = outputs[0].try_extract_tensor::<f32>()?;

        let n = reconstruction.len().min(features.len());
        if n == 0 {
            return Ok(0.0);
        }
        let mse = features[..n]
            .iter()
            .zip(reconstruction)
            .map(|(x, r)| (x - r) * (x - r))
            .sum::<f32>()
            / n as f32;

        debug!("reconstruction mse: {:.4}", mse);
        Ok(mse)
    }
}
