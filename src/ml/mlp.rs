use std::path::Path;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use super::{ModelError, Predictor};

const MODEL_FORMAT_VERSION: i64 = 1;

/// Single-hidden-layer perceptron with per-feature input normalization.
///
/// Weight matrices are row major: `weights1` is `hidden x input`,
/// `weights2` is `classes x hidden`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MlpPredictor {
    pub model_version: i64,
    pub feature_len_f32: usize,
    pub num_classes: usize,
    pub hidden_size: usize,
    pub weights1: Vec<f32>,
    pub bias1: Vec<f32>,
    pub weights2: Vec<f32>,
    pub bias2: Vec<f32>,
    pub feature_mean: Vec<f32>,
    pub feature_std: Vec<f32>,
}

impl MlpPredictor {
    /// Load and validate a model from a JSON export.
    pub fn from_json_file(path: &Path) -> Result<Self, ModelError> {
        let bytes = std::fs::read(path)?;
        let model: Self = serde_json::from_slice(&bytes)?;
        model.validate()?;
        Ok(model)
    }

    /// Write the model as pretty JSON, the same layout `from_json_file` reads.
    pub fn write_json_file(&self, path: &Path) -> Result<(), ModelError> {
        let bytes = serde_json::to_vec_pretty(self)?;
        std::fs::write(path, bytes)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        if self.model_version != MODEL_FORMAT_VERSION {
            return Err(ModelError::Invalid(format!(
                "unsupported model_version {} (expected {})",
                self.model_version, MODEL_FORMAT_VERSION
            )));
        }
        if self.feature_len_f32 == 0 || self.hidden_size == 0 || self.num_classes == 0 {
            return Err(ModelError::Invalid(
                "model dimensions must be positive".to_string(),
            ));
        }
        let input = self.feature_len_f32;
        let hidden = self.hidden_size;
        let classes = self.num_classes;
        if self.weights1.len() != input * hidden {
            return Err(ModelError::Invalid("weights1 length mismatch".to_string()));
        }
        if self.bias1.len() != hidden {
            return Err(ModelError::Invalid("bias1 length mismatch".to_string()));
        }
        if self.weights2.len() != classes * hidden {
            return Err(ModelError::Invalid("weights2 length mismatch".to_string()));
        }
        if self.bias2.len() != classes {
            return Err(ModelError::Invalid("bias2 length mismatch".to_string()));
        }
        if self.feature_mean.len() != input {
            return Err(ModelError::Invalid(
                "feature_mean length mismatch".to_string(),
            ));
        }
        if self.feature_std.len() != input {
            return Err(ModelError::Invalid(
                "feature_std length mismatch".to_string(),
            ));
        }
        Ok(())
    }

    fn predict_row(&self, features: &[f32], out: &mut [f32]) {
        let input = self.feature_len_f32;
        let hidden = self.hidden_size;
        let classes = self.num_classes;

        let mut normalized = vec![0.0_f32; input];
        for i in 0..input {
            let std = self.feature_std[i].max(1e-6);
            normalized[i] = (features[i] - self.feature_mean[i]) / std;
        }

        let mut hidden_act = vec![0.0_f32; hidden];
        for h in 0..hidden {
            let mut sum = self.bias1[h];
            let base = h * input;
            for i in 0..input {
                sum += self.weights1[base + i] * normalized[i];
            }
            hidden_act[h] = sum.max(0.0);
        }

        let mut logits = vec![0.0_f32; classes];
        for c in 0..classes {
            let mut sum = self.bias2[c];
            let base = c * hidden;
            for h in 0..hidden {
                sum += self.weights2[base + h] * hidden_act[h];
            }
            logits[c] = sum;
        }

        softmax_into(&logits, out);
    }
}

impl Predictor for MlpPredictor {
    fn num_classes(&self) -> usize {
        self.num_classes
    }

    fn predict(&self, features: &Array2<f32>) -> Result<Array2<f32>, ModelError> {
        if features.ncols() != self.feature_len_f32 {
            return Err(ModelError::FeatureWidth {
                expected: self.feature_len_f32,
                actual: features.ncols(),
            });
        }
        let mut out = Array2::zeros((features.nrows(), self.num_classes));
        let mut row_buf = vec![0.0_f32; self.feature_len_f32];
        let mut out_buf = vec![0.0_f32; self.num_classes];
        for (row_idx, row) in features.outer_iter().enumerate() {
            for (slot, &v) in row_buf.iter_mut().zip(row.iter()) {
                *slot = v;
            }
            self.predict_row(&row_buf, &mut out_buf);
            for (class, &p) in out_buf.iter().enumerate() {
                out[[row_idx, class]] = p;
            }
        }
        Ok(out)
    }
}

fn softmax_into(logits: &[f32], out: &mut [f32]) {
    debug_assert_eq!(logits.len(), out.len());
    if logits.is_empty() {
        return;
    }
    let max = logits.iter().fold(f32::NEG_INFINITY, |m, &v| m.max(v));
    let mut sum = 0.0_f32;
    for (slot, &logit) in out.iter_mut().zip(logits.iter()) {
        let e = (logit - max).exp();
        *slot = e;
        sum += e;
    }
    if !sum.is_finite() || sum <= 0.0 {
        let uniform = 1.0 / logits.len() as f32;
        out.fill(uniform);
        return;
    }
    for slot in out.iter_mut() {
        *slot /= sum;
    }
}
