//! Time-frequency analysis of binaural mixtures.
//!
//! All matrices here are time major: rows are analysis frames, columns are
//! frequency channels (or feature dimensions).

mod mel;
mod stft;

pub use stft::StftPlan;

use mel::MelBank;
use ndarray::{Array2, Axis, concatenate};
use rustfft::num_complex::Complex;
use thiserror::Error;

use crate::config::SynthConfig;
use crate::render::StereoBuffer;

/// Floor added to magnitudes before the level-difference ratio.
const AMPLITUDE_EPS: f32 = 1e-9;

#[derive(Debug, Error)]
pub enum FeatureError {
    #[error("mask shape {actual:?} does not match spectrogram shape {expected:?}")]
    MaskShape {
        expected: (usize, usize),
        actual: (usize, usize),
    },
}

/// Extracts spectrograms, interaural cues and cepstral features.
pub struct FeatureExtractor {
    stft: StftPlan,
    mel: MelBank,
}

impl FeatureExtractor {
    pub fn new(config: &SynthConfig) -> Self {
        let stft = StftPlan::new(config.stft_frame, config.stft_hop);
        let mel = MelBank::new(
            config.sample_rate_hz,
            config.stft_frame,
            config.mel_bands,
            config.mfcc_coeffs,
        );
        Self { stft, mel }
    }

    pub fn stft(&self) -> &StftPlan {
        &self.stft
    }

    /// Columns in one per-channel feature row: ILD, IPD, then the cepstrum.
    pub fn feature_width(&self) -> usize {
        2 + self.mel.dct_size()
    }

    /// Magnitude spectrogram of a mono clip.
    pub fn spectrogram(&self, samples: &[f32]) -> Array2<f32> {
        self.stft.spectrogram(samples)
    }

    /// Interaural level difference in dB per time-frequency bin.
    pub fn ild(&self, mixture: &StereoBuffer) -> Array2<f32> {
        let left = self.stft.forward(&mixture.left);
        let right = self.stft.forward(&mixture.right);
        ild_from_stft(&left, &right)
    }

    /// Interaural phase difference in radians per time-frequency bin.
    pub fn ipd(&self, mixture: &StereoBuffer) -> Array2<f32> {
        let left = self.stft.forward(&mixture.left);
        let right = self.stft.forward(&mixture.right);
        ipd_from_stft(&left, &right)
    }

    /// Cepstral coefficients of the left channel, one row per frame.
    pub fn mfcc(&self, mixture: &StereoBuffer) -> Array2<f32> {
        self.mfcc_from_stft(&self.stft.forward(&mixture.left))
    }

    /// Model input features for every frequency channel.
    ///
    /// Channel `c` receives one row per frame holding that channel's ILD
    /// and IPD followed by the frame's cepstrum, which is shared across
    /// channels.
    pub fn channel_features(&self, mixture: &StereoBuffer) -> Vec<Array2<f32>> {
        let left = self.stft.forward(&mixture.left);
        let right = self.stft.forward(&mixture.right);
        let ild = ild_from_stft(&left, &right);
        let ipd = ipd_from_stft(&left, &right);
        let mfcc = self.mfcc_from_stft(&left);
        (0..self.stft.bins())
            .map(|channel| {
                let ild_col = ild.column(channel).insert_axis(Axis(1));
                let ipd_col = ipd.column(channel).insert_axis(Axis(1));
                concatenate(Axis(1), &[ild_col, ipd_col, mfcc.view()])
                    .expect("per-channel feature blocks share frame count")
            })
            .collect()
    }

    /// Mask the mixture's left channel in the time-frequency domain and
    /// resynthesize a time signal of the same length.
    pub fn apply_mask_to_signal(
        &self,
        mixture_left: &[f32],
        mask: &Array2<f32>,
    ) -> Result<Vec<f32>, FeatureError> {
        let mut stft = self.stft.forward(mixture_left);
        if stft.dim() != mask.dim() {
            return Err(FeatureError::MaskShape {
                expected: stft.dim(),
                actual: mask.dim(),
            });
        }
        for (cell, &weight) in stft.iter_mut().zip(mask.iter()) {
            cell.re *= weight;
            cell.im *= weight;
        }
        Ok(self.stft.inverse(&stft, mixture_left.len()))
    }

    fn mfcc_from_stft(&self, stft: &Array2<Complex<f32>>) -> Array2<f32> {
        let mut out = Array2::zeros((stft.nrows(), self.mel.dct_size()));
        let mut power = vec![0.0_f32; stft.ncols()];
        for (row_idx, row) in stft.outer_iter().enumerate() {
            for (slot, c) in power.iter_mut().zip(row.iter()) {
                *slot = (c.re * c.re + c.im * c.im).max(0.0);
            }
            for (col, value) in self.mel.mfcc_from_power(&power).into_iter().enumerate() {
                out[[row_idx, col]] = value;
            }
        }
        out
    }
}

fn ild_from_stft(left: &Array2<Complex<f32>>, right: &Array2<Complex<f32>>) -> Array2<f32> {
    debug_assert_eq!(left.dim(), right.dim());
    let mut out = Array2::zeros(left.dim());
    for ((idx, &l), &r) in left.indexed_iter().zip(right.iter()) {
        let ratio = (l.norm() + AMPLITUDE_EPS) / (r.norm() + AMPLITUDE_EPS);
        out[idx] = 20.0 * ratio.log10();
    }
    out
}

fn ipd_from_stft(left: &Array2<Complex<f32>>, right: &Array2<Complex<f32>>) -> Array2<f32> {
    debug_assert_eq!(left.dim(), right.dim());
    let mut out = Array2::zeros(left.dim());
    for ((idx, &l), &r) in left.indexed_iter().zip(right.iter()) {
        out[idx] = (l * r.conj()).arg();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn small_config() -> SynthConfig {
        SynthConfig {
            stft_frame: 64,
            stft_hop: 32,
            mel_bands: 20,
            mfcc_coeffs: 8,
            ..SynthConfig::default()
        }
    }

    fn sine(len: usize, cycles_per_frame: f32, amplitude: f32) -> Vec<f32> {
        (0..len)
            .map(|i| amplitude * (2.0 * PI * i as f32 * cycles_per_frame / 64.0).sin())
            .collect()
    }

    fn strongest_bin(extractor: &FeatureExtractor, samples: &[f32]) -> usize {
        let sgram = extractor.spectrogram(samples);
        let row = sgram.row(2);
        row.iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).expect("finite magnitudes"))
            .map(|(bin, _)| bin)
            .unwrap()
    }

    #[test]
    fn ild_reports_left_dominance_in_db() {
        let extractor = FeatureExtractor::new(&small_config());
        let mixture = StereoBuffer {
            left: sine(256, 8.0, 0.8),
            right: sine(256, 8.0, 0.4),
        };
        let bin = strongest_bin(&extractor, &mixture.left);
        let ild = extractor.ild(&mixture);
        let value = ild[[2, bin]];
        assert!((value - 6.02).abs() < 0.1, "ild at peak bin was {value}");
    }

    #[test]
    fn ipd_flags_opposite_polarity() {
        let extractor = FeatureExtractor::new(&small_config());
        let left = sine(256, 8.0, 0.8);
        let right: Vec<f32> = left.iter().map(|s| -s).collect();
        let mixture = StereoBuffer { left, right };
        let bin = strongest_bin(&extractor, &mixture.left);
        let ipd = extractor.ipd(&mixture);
        assert!((ipd[[2, bin]].abs() - PI).abs() < 1e-3);
    }

    #[test]
    fn channel_features_have_expected_shape() {
        let config = small_config();
        let extractor = FeatureExtractor::new(&config);
        let mixture = StereoBuffer {
            left: sine(300, 8.0, 0.5),
            right: sine(300, 8.0, 0.5),
        };
        let features = extractor.channel_features(&mixture);
        assert_eq!(features.len(), config.stft_frame / 2 + 1);
        let frames = extractor.stft().num_frames(300);
        for block in &features {
            assert_eq!(block.dim(), (frames, extractor.feature_width()));
        }
    }

    #[test]
    fn unit_mask_keeps_interior_samples() {
        let extractor = FeatureExtractor::new(&small_config());
        let samples = sine(512, 8.0, 0.5);
        let frames = extractor.stft().num_frames(samples.len());
        let mask = Array2::ones((frames, extractor.stft().bins()));
        let rebuilt = extractor.apply_mask_to_signal(&samples, &mask).unwrap();
        for i in 64..448 {
            assert!((rebuilt[i] - samples[i]).abs() < 1e-3);
        }
    }

    #[test]
    fn zero_mask_silences_output() {
        let extractor = FeatureExtractor::new(&small_config());
        let samples = sine(256, 8.0, 0.5);
        let frames = extractor.stft().num_frames(samples.len());
        let mask = Array2::zeros((frames, extractor.stft().bins()));
        let rebuilt = extractor.apply_mask_to_signal(&samples, &mask).unwrap();
        assert!(rebuilt.iter().all(|&s| s.abs() < 1e-6));
    }

    #[test]
    fn mask_shape_mismatch_is_rejected() {
        let extractor = FeatureExtractor::new(&small_config());
        let samples = sine(256, 8.0, 0.5);
        let mask = Array2::zeros((1, 2));
        assert!(matches!(
            extractor.apply_mask_to_signal(&samples, &mask),
            Err(FeatureError::MaskShape { .. })
        ));
    }
}
