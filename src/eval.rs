//! Separation quality measured by recovered source directions.

use std::path::Path;

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::angles::AngleGrid;
use crate::mask::{self, SourceMask};
use crate::ml::{ModelError, Predictor};

#[derive(Debug, Error)]
pub enum EvalError {
    #[error("{provided} models provided but the mixture has {expected} frequency channels")]
    ChannelCount { expected: usize, provided: usize },
    #[error("model {channel} produced {actual:?}, expected {expected:?}")]
    PredictionShape {
        channel: usize,
        expected: (usize, usize),
        actual: (usize, usize),
    },
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Set-difference rates between planted and recovered directions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalizationReport {
    /// Fraction of planted directions no recovered mask accounts for.
    pub miss_rate: f64,
    /// Fraction of recovered directions that were never planted.
    pub false_alarm_rate: f64,
    pub ground_truth_deg: Vec<i32>,
    pub recovered_deg: Vec<i32>,
}

/// Everything one evaluation pass produces.
#[derive(Debug, Clone)]
pub struct EvalOutcome {
    pub report: LocalizationReport,
    pub mixed_ibm: Array2<usize>,
    pub masks: Vec<SourceMask>,
}

/// Run every channel's model over its feature block and collapse the
/// scores into a predicted class map.
pub fn predict_mixed_ibm<P: Predictor>(
    models: &[P],
    features: &[Array2<f32>],
) -> Result<Array2<usize>, EvalError> {
    if models.len() != features.len() {
        return Err(EvalError::ChannelCount {
            expected: features.len(),
            provided: models.len(),
        });
    }
    let mut outputs = Vec::with_capacity(models.len());
    for (channel, (model, block)) in models.iter().zip(features.iter()).enumerate() {
        let proba = model.predict(block)?;
        let expected = (block.nrows(), model.num_classes());
        if proba.dim() != expected {
            return Err(EvalError::PredictionShape {
                channel,
                expected,
                actual: proba.dim(),
            });
        }
        outputs.push(proba);
    }
    Ok(mask::targets_to_mixed_ibm(&outputs))
}

/// Miss and false-alarm rates over direction sets.
///
/// An empty side leaves its rate at zero rather than dividing by zero:
/// nothing planted means nothing to miss, nothing recovered means no
/// false alarms.
pub fn localization_rates(ground_truth: &[i32], recovered: &[i32]) -> (f64, f64) {
    let miss_rate = if ground_truth.is_empty() {
        0.0
    } else {
        let missed = ground_truth
            .iter()
            .filter(|angle| !recovered.contains(angle))
            .count();
        missed as f64 / ground_truth.len() as f64
    };
    let false_alarm_rate = if recovered.is_empty() {
        0.0
    } else {
        let spurious = recovered
            .iter()
            .filter(|angle| !ground_truth.contains(angle))
            .count();
        spurious as f64 / recovered.len() as f64
    };
    (miss_rate, false_alarm_rate)
}

/// Predict a class map, decode masks from it and score the recovered
/// directions against the planted ones.
pub fn evaluate<P: Predictor>(
    models: &[P],
    features: &[Array2<f32>],
    ground_truth_deg: &[i32],
    grid: &AngleGrid,
    min_support: usize,
) -> Result<EvalOutcome, EvalError> {
    let mixed_ibm = predict_mixed_ibm(models, features)?;
    let masks = mask::mixed_ibm_to_masks(&mixed_ibm, grid, min_support);
    let recovered_deg: Vec<i32> = masks.iter().map(|m| m.angle_deg).collect();
    let (miss_rate, false_alarm_rate) = localization_rates(ground_truth_deg, &recovered_deg);
    Ok(EvalOutcome {
        report: LocalizationReport {
            miss_rate,
            false_alarm_rate,
            ground_truth_deg: ground_truth_deg.to_vec(),
            recovered_deg,
        },
        mixed_ibm,
        masks,
    })
}

/// Persist a report as pretty JSON.
pub fn write_report(report: &LocalizationReport, path: &Path) -> Result<(), EvalError> {
    let bytes = serde_json::to_vec_pretty(report)?;
    std::fs::write(path, bytes)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Returns a fixed score matrix regardless of input features.
    struct Fixed {
        out: Array2<f32>,
    }

    impl Predictor for Fixed {
        fn num_classes(&self) -> usize {
            self.out.ncols()
        }

        fn predict(&self, _features: &Array2<f32>) -> Result<Array2<f32>, ModelError> {
            Ok(self.out.clone())
        }
    }

    fn one_hot_rows(frames: usize, classes: usize, hot: usize) -> Array2<f32> {
        let mut out = Array2::zeros((frames, classes));
        for frame in 0..frames {
            out[[frame, hot]] = 1.0;
        }
        out
    }

    #[test]
    fn rates_count_set_differences() {
        let (miss, fa) = localization_rates(&[-10, 20], &[-10, 30]);
        assert_eq!(miss, 0.5);
        assert_eq!(fa, 0.5);

        let (miss, fa) = localization_rates(&[0, 30], &[0]);
        assert_eq!(miss, 0.5);
        assert_eq!(fa, 0.0);

        let (miss, fa) = localization_rates(&[0, 30], &[0, 30, 60, 85]);
        assert_eq!(miss, 0.0);
        assert_eq!(fa, 0.5);
    }

    #[test]
    fn empty_sides_give_zero_rates() {
        let (miss, fa) = localization_rates(&[0, 30], &[]);
        assert_eq!(miss, 1.0);
        assert_eq!(fa, 0.0);

        let (miss, fa) = localization_rates(&[], &[15]);
        assert_eq!(miss, 0.0);
        assert_eq!(fa, 1.0);
    }

    #[test]
    fn perfect_models_recover_every_direction() {
        let grid = AngleGrid::new(0, 5, 5);
        let frames = 4;
        // Channel 0 always votes class 0, channel 1 always votes class 1.
        let models = vec![
            Fixed {
                out: one_hot_rows(frames, 3, 0),
            },
            Fixed {
                out: one_hot_rows(frames, 3, 1),
            },
        ];
        let features = vec![Array2::zeros((frames, 2)), Array2::zeros((frames, 2))];
        let outcome = evaluate(&models, &features, &[0, 5], &grid, 1).unwrap();
        assert_eq!(outcome.report.miss_rate, 0.0);
        assert_eq!(outcome.report.false_alarm_rate, 0.0);
        assert_eq!(outcome.report.recovered_deg, vec![0, 5]);
        assert_eq!(outcome.masks.len(), 2);
        assert_eq!(outcome.mixed_ibm.dim(), (frames, 2));
    }

    #[test]
    fn noise_only_predictions_recover_nothing() {
        let grid = AngleGrid::new(0, 5, 5);
        let models = vec![Fixed {
            out: one_hot_rows(3, 3, 2),
        }];
        let features = vec![Array2::zeros((3, 2))];
        let outcome = evaluate(&models, &features, &[0], &grid, 1).unwrap();
        assert!(outcome.masks.is_empty());
        assert_eq!(outcome.report.miss_rate, 1.0);
        assert_eq!(outcome.report.false_alarm_rate, 0.0);
    }

    #[test]
    fn model_count_must_match_channels() {
        let grid = AngleGrid::new(0, 5, 5);
        let models = vec![Fixed {
            out: one_hot_rows(3, 3, 0),
        }];
        let features = vec![Array2::zeros((3, 2)), Array2::zeros((3, 2))];
        let err = evaluate(&models, &features, &[0], &grid, 1).unwrap_err();
        assert!(matches!(
            err,
            EvalError::ChannelCount {
                expected: 2,
                provided: 1
            }
        ));
    }

    #[test]
    fn prediction_shape_is_checked() {
        let models = vec![Fixed {
            out: one_hot_rows(2, 3, 0),
        }];
        // Feature block advertises 4 frames but the stub returns 2.
        let features = vec![Array2::zeros((4, 2))];
        let err = predict_mixed_ibm(&models, &features).unwrap_err();
        assert!(matches!(err, EvalError::PredictionShape { channel: 0, .. }));
    }
}
