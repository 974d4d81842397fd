use rustfft::FftPlanner;
use rustfft::num_complex::Complex;

/// A pair of equal-length sample buffers, one per ear.
#[derive(Debug, Clone, PartialEq)]
pub struct StereoBuffer {
    pub left: Vec<f32>,
    pub right: Vec<f32>,
}

impl StereoBuffer {
    pub fn zeros(len: usize) -> Self {
        Self {
            left: vec![0.0; len],
            right: vec![0.0; len],
        }
    }

    pub fn len(&self) -> usize {
        self.left.len()
    }

    pub fn is_empty(&self) -> bool {
        self.left.is_empty()
    }

    /// Add another buffer of the same length sample by sample.
    pub fn accumulate(&mut self, other: &StereoBuffer) {
        debug_assert_eq!(self.len(), other.len());
        for (dst, src) in self.left.iter_mut().zip(other.left.iter()) {
            *dst += src;
        }
        for (dst, src) in self.right.iter_mut().zip(other.right.iter()) {
            *dst += src;
        }
    }
}

/// Convolves dry clips with binaural impulse responses.
///
/// Holds an FFT planner so repeated renders at the same lengths reuse
/// cached plans.
pub struct BinauralRenderer {
    planner: FftPlanner<f32>,
}

impl BinauralRenderer {
    pub fn new() -> Self {
        Self {
            planner: FftPlanner::new(),
        }
    }

    /// Render a mono clip through a left/right impulse response pair.
    ///
    /// Output length equals the clip length for both ears.
    pub fn render(&mut self, signal: &[f32], left_ir: &[f32], right_ir: &[f32]) -> StereoBuffer {
        StereoBuffer {
            left: self.convolve_same(signal, left_ir),
            right: self.convolve_same(signal, right_ir),
        }
    }

    /// Linear convolution truncated to the central `signal.len()` samples
    /// of the full result.
    pub fn convolve_same(&mut self, signal: &[f32], kernel: &[f32]) -> Vec<f32> {
        let n = signal.len();
        let m = kernel.len();
        if n == 0 || m == 0 {
            return vec![0.0; n];
        }
        let full_len = n + m - 1;
        let fft_len = full_len.next_power_of_two();
        let fft = self.planner.plan_fft_forward(fft_len);
        let ifft = self.planner.plan_fft_inverse(fft_len);

        let mut a = to_complex(signal, fft_len);
        let mut b = to_complex(kernel, fft_len);
        fft.process(&mut a);
        fft.process(&mut b);
        for (x, y) in a.iter_mut().zip(b.iter()) {
            *x *= *y;
        }
        ifft.process(&mut a);

        // rustfft leaves the inverse unnormalized.
        let scale = 1.0 / fft_len as f32;
        let offset = (m - 1) / 2;
        a[offset..offset + n].iter().map(|v| v.re * scale).collect()
    }
}

impl Default for BinauralRenderer {
    fn default() -> Self {
        Self::new()
    }
}

fn to_complex(samples: &[f32], fft_len: usize) -> Vec<Complex<f32>> {
    let mut buf = vec![Complex::new(0.0, 0.0); fft_len];
    for (slot, &sample) in buf.iter_mut().zip(samples.iter()) {
        slot.re = sample;
    }
    buf
}

/// Root-mean-square level of a buffer, accumulated in f64.
pub fn rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum = samples.iter().fold(0.0_f64, |acc, &s| {
        let s = s as f64;
        acc + s * s
    });
    let mean = sum / samples.len() as f64;
    mean.max(0.0).sqrt() as f32
}

/// Scale a buffer so its RMS matches `target_rms`.
///
/// Silent or non-finite buffers are left untouched.
pub fn normalize_rms_in_place(samples: &mut [f32], target_rms: f32) {
    if samples.is_empty() {
        return;
    }
    let rms_value = rms(samples);
    if !rms_value.is_finite() || rms_value <= 0.0 {
        return;
    }
    if !target_rms.is_finite() || target_rms <= 0.0 {
        return;
    }
    let gain = target_rms / rms_value;
    for sample in samples.iter_mut() {
        *sample *= gain;
    }
}
