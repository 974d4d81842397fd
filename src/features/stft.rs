use std::f32::consts::PI;
use std::sync::Arc;

use ndarray::Array2;
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

/// Windowed short-time transform shared by analysis and resynthesis.
///
/// Frames start every `hop` samples and the tail frame is zero padded, so a
/// clip of `len` samples yields `ceil(len / hop)` frames. Rows are frames,
/// columns are the `frame / 2 + 1` non-redundant frequency bins.
pub struct StftPlan {
    frame: usize,
    hop: usize,
    window: Vec<f32>,
    forward: Arc<dyn Fft<f32>>,
    inverse: Arc<dyn Fft<f32>>,
}

impl StftPlan {
    pub fn new(frame: usize, hop: usize) -> Self {
        debug_assert!(frame.is_power_of_two());
        debug_assert!(hop >= 1 && hop <= frame);
        let mut planner = FftPlanner::new();
        Self {
            frame,
            hop,
            window: hann_window(frame),
            forward: planner.plan_fft_forward(frame),
            inverse: planner.plan_fft_inverse(frame),
        }
    }

    pub fn frame(&self) -> usize {
        self.frame
    }

    pub fn hop(&self) -> usize {
        self.hop
    }

    /// Frequency channels per frame, DC through Nyquist.
    pub fn bins(&self) -> usize {
        self.frame / 2 + 1
    }

    /// Frames produced for a clip of `len` samples.
    pub fn num_frames(&self, len: usize) -> usize {
        len.div_ceil(self.hop)
    }

    /// Complex STFT of a mono clip.
    pub fn forward(&self, samples: &[f32]) -> Array2<Complex<f32>> {
        let mut out = Array2::zeros((self.num_frames(samples.len()), self.bins()));
        let mut buf = vec![Complex::new(0.0, 0.0); self.frame];
        let mut start = 0;
        let mut row = 0;
        while start < samples.len() {
            for (i, cell) in buf.iter_mut().enumerate() {
                let sample = samples.get(start + i).copied().unwrap_or(0.0);
                *cell = Complex::new(sample * self.window[i], 0.0);
            }
            self.forward.process(&mut buf);
            for bin in 0..self.bins() {
                out[[row, bin]] = buf[bin];
            }
            row += 1;
            start += self.hop;
        }
        out
    }

    /// Magnitude spectrogram of a mono clip.
    pub fn spectrogram(&self, samples: &[f32]) -> Array2<f32> {
        self.forward(samples).mapv(|c| c.norm())
    }

    /// Weighted overlap-add inverse of [`StftPlan::forward`], trimmed to
    /// `output_len` samples.
    ///
    /// Accumulated squared-window weight divides the result, so interior
    /// samples reconstruct exactly. Samples never reached by a usable
    /// window weight stay zero.
    pub fn inverse(&self, stft: &Array2<Complex<f32>>, output_len: usize) -> Vec<f32> {
        debug_assert_eq!(stft.ncols(), self.bins());
        let mut acc = vec![0.0_f64; output_len];
        let mut weight = vec![0.0_f64; output_len];
        let mut buf = vec![Complex::new(0.0, 0.0); self.frame];
        let scale = 1.0 / self.frame as f32;
        for (row_idx, row) in stft.outer_iter().enumerate() {
            for (bin, cell) in row.iter().enumerate() {
                buf[bin] = *cell;
            }
            // Real signals: upper bins mirror the lower half conjugated.
            for bin in self.bins()..self.frame {
                buf[bin] = buf[self.frame - bin].conj();
            }
            self.inverse.process(&mut buf);
            let start = row_idx * self.hop;
            for (i, cell) in buf.iter().enumerate() {
                let idx = start + i;
                if idx >= output_len {
                    break;
                }
                let w = self.window[i];
                acc[idx] += (cell.re * scale * w) as f64;
                weight[idx] += (w * w) as f64;
            }
        }
        acc.iter()
            .zip(weight.iter())
            .map(|(&v, &w)| if w > 1e-8 { (v / w) as f32 } else { 0.0 })
            .collect()
    }
}

pub(super) fn hann_window(length: usize) -> Vec<f32> {
    if length <= 1 {
        return vec![1.0_f32; length.max(1)];
    }
    let denom = (length - 1) as f32;
    (0..length)
        .map(|n| 0.5_f32 * (1.0 - (2.0 * PI * n as f32 / denom).cos()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_signal(len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| {
                let t = i as f32;
                0.6 * (2.0 * PI * t * 8.0 / 64.0).sin() + 0.3 * (2.0 * PI * t * 3.0 / 64.0).cos()
            })
            .collect()
    }

    #[test]
    fn frame_count_covers_padded_tail() {
        let plan = StftPlan::new(64, 32);
        assert_eq!(plan.bins(), 33);
        assert_eq!(plan.num_frames(256), 8);
        assert_eq!(plan.num_frames(250), 8);
        assert_eq!(plan.num_frames(0), 0);
        let stft = plan.forward(&test_signal(250));
        assert_eq!(stft.dim(), (8, 33));
    }

    #[test]
    fn sine_energy_lands_in_expected_bin() {
        let plan = StftPlan::new(64, 32);
        let samples: Vec<f32> = (0..256)
            .map(|i| (2.0 * PI * i as f32 * 8.0 / 64.0).sin())
            .collect();
        let sgram = plan.spectrogram(&samples);
        let row = sgram.row(2);
        let peak_bin = row
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).expect("finite magnitudes"))
            .map(|(bin, _)| bin)
            .unwrap();
        assert_eq!(peak_bin, 8);
    }

    #[test]
    fn hann_window_is_symmetric_and_zero_at_edges() {
        let w = hann_window(8);
        assert!((w[0]).abs() < 1e-6);
        assert!((w[7]).abs() < 1e-6);
        assert!((w[1] - w[6]).abs() < 1e-6);
    }

    #[test]
    fn inverse_reconstructs_interior_samples() {
        let plan = StftPlan::new(64, 32);
        let samples = test_signal(512);
        let stft = plan.forward(&samples);
        let rebuilt = plan.inverse(&stft, samples.len());
        assert_eq!(rebuilt.len(), samples.len());
        for i in 64..448 {
            assert!(
                (rebuilt[i] - samples[i]).abs() < 1e-3,
                "sample {i}: got {}, want {}",
                rebuilt[i],
                samples[i]
            );
        }
    }

    #[test]
    fn empty_signal_yields_empty_stft() {
        let plan = StftPlan::new(64, 32);
        let stft = plan.forward(&[]);
        assert_eq!(stft.nrows(), 0);
        let rebuilt = plan.inverse(&stft, 0);
        assert!(rebuilt.is_empty());
    }
}
