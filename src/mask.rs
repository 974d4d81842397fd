//! Mixed class maps and the binary masks recovered from them.

use std::collections::BTreeMap;

use ndarray::Array2;

use crate::angles::AngleGrid;

/// A binary time-frequency mask recovered for one direction class.
#[derive(Debug, Clone)]
pub struct SourceMask {
    pub angle_deg: i32,
    pub class: usize,
    pub mask: Array2<f32>,
}

/// Collapse per-channel class scores into a single class map.
///
/// `per_channel` holds one `(frames, classes)` matrix per frequency
/// channel; the result is `(frames, channels)` where each cell carries the
/// winning class index. Ties keep the lowest class. One-hot training
/// targets and model probability outputs both collapse this way.
pub fn targets_to_mixed_ibm(per_channel: &[Array2<f32>]) -> Array2<usize> {
    let Some(first) = per_channel.first() else {
        return Array2::zeros((0, 0));
    };
    let frames = first.nrows();
    let mut mixed = Array2::zeros((frames, per_channel.len()));
    for (channel, scores) in per_channel.iter().enumerate() {
        debug_assert_eq!(scores.nrows(), frames);
        for (frame, row) in scores.outer_iter().enumerate() {
            let mut best_class = 0;
            let mut best_val = f32::NEG_INFINITY;
            for (class, &val) in row.iter().enumerate() {
                if val > best_val {
                    best_val = val;
                    best_class = class;
                }
            }
            mixed[[frame, channel]] = best_class;
        }
    }
    mixed
}

/// Split a class map into one binary mask per sufficiently present class.
///
/// Classes covering fewer than `min_support` bins are dropped, as is the
/// noise class (and any index past the grid). Masks come back in ascending
/// class order.
pub fn mixed_ibm_to_masks(
    mixed_ibm: &Array2<usize>,
    grid: &AngleGrid,
    min_support: usize,
) -> Vec<SourceMask> {
    let mut counts: BTreeMap<usize, usize> = BTreeMap::new();
    for &class in mixed_ibm.iter() {
        *counts.entry(class).or_insert(0) += 1;
    }

    let mut masks = Vec::new();
    for (&class, &count) in &counts {
        if count < min_support {
            continue;
        }
        let Some(angle_deg) = grid.angle_of(class) else {
            // The noise class never yields a source mask.
            continue;
        };
        let mask = mixed_ibm.mapv(|c| if c == class { 1.0 } else { 0.0 });
        masks.push(SourceMask {
            angle_deg,
            class,
            mask,
        });
    }
    masks
}
