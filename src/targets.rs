//! Per-channel training targets derived from source spectrograms.

use ndarray::Array2;
use thiserror::Error;

use crate::angles::{AngleError, AngleGrid};

#[derive(Debug, Error)]
pub enum TargetError {
    #[error("no source spectrograms were provided")]
    NoSources,
    #[error("{sources} source spectrograms but {angles} angles")]
    AngleCount { sources: usize, angles: usize },
    #[error("spectrogram {index} is {actual:?}, expected {expected:?}")]
    ShapeMismatch {
        index: usize,
        expected: (usize, usize),
        actual: (usize, usize),
    },
    #[error(transparent)]
    Angle(#[from] AngleError),
}

/// Build one-hot direction targets for every frequency channel.
///
/// For each time-frequency bin the loudest source wins and its direction
/// class is marked, unless that winning magnitude stays below the noise
/// spectrogram raised by `noise_floor_db`; such bins are handed to the
/// noise class instead. The comparison is strict, so a bin where every
/// source is exactly at the threshold still belongs to the winning source.
///
/// Output: one `(frames, classes)` matrix per frequency channel, where the
/// class count is the grid size plus the trailing noise class.
pub fn build_targets(
    source_sgrams: &[Array2<f32>],
    noise_sgram: &Array2<f32>,
    angles: &[i32],
    grid: &AngleGrid,
    noise_floor_db: f32,
) -> Result<Vec<Array2<f32>>, TargetError> {
    if source_sgrams.is_empty() {
        return Err(TargetError::NoSources);
    }
    if source_sgrams.len() != angles.len() {
        return Err(TargetError::AngleCount {
            sources: source_sgrams.len(),
            angles: angles.len(),
        });
    }
    let expected = source_sgrams[0].dim();
    for (index, sgram) in source_sgrams.iter().enumerate().skip(1) {
        if sgram.dim() != expected {
            return Err(TargetError::ShapeMismatch {
                index,
                expected,
                actual: sgram.dim(),
            });
        }
    }
    if noise_sgram.dim() != expected {
        return Err(TargetError::ShapeMismatch {
            index: source_sgrams.len(),
            expected,
            actual: noise_sgram.dim(),
        });
    }

    let classes: Vec<usize> = angles
        .iter()
        .map(|&angle| grid.class_of(angle))
        .collect::<Result<_, _>>()?;
    let (frames, channels) = expected;
    let num_classes = grid.len() + 1;
    let noise_class = grid.len();
    let th_factor = 10.0_f32.powf(noise_floor_db / 10.0);

    let mut targets = Vec::with_capacity(channels);
    for channel in 0..channels {
        let mut target = Array2::zeros((frames, num_classes));
        for frame in 0..frames {
            let mut best_source = 0;
            let mut best_val = source_sgrams[0][[frame, channel]];
            for (source, sgram) in source_sgrams.iter().enumerate().skip(1) {
                let val = sgram[[frame, channel]];
                if val > best_val {
                    best_val = val;
                    best_source = source;
                }
            }
            let noise_th = noise_sgram[[frame, channel]] * th_factor;
            if best_val < noise_th {
                target[[frame, noise_class]] = 1.0;
            } else {
                target[[frame, classes[best_source]]] = 1.0;
            }
        }
        targets.push(target);
    }
    Ok(targets)
}
