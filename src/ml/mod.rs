//! Inference models that score per-channel features.
//!
//! Models are trained elsewhere and loaded from reproducible JSON exports;
//! this crate only runs the forward pass.

mod mlp;

pub use mlp::MlpPredictor;

use ndarray::Array2;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid model: {0}")]
    Invalid(String),
    #[error("feature rows are {actual} values wide, model expects {expected}")]
    FeatureWidth { expected: usize, actual: usize },
}

/// A per-channel classifier mapping feature rows to class probabilities.
pub trait Predictor {
    /// Width of every output row.
    fn num_classes(&self) -> usize;

    /// Score a `(frames, features)` matrix into `(frames, classes)`
    /// probabilities, one row per frame.
    fn predict(&self, features: &Array2<f32>) -> Result<Array2<f32>, ModelError>;
}
