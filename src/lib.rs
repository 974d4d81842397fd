//! Library exports for reuse in binaries, benchmarks and tests.
/// Runtime configuration.
pub mod config;
/// Azimuth grid and direction classes.
pub mod angles;
/// WAV reading and writing.
pub mod wav;
/// BRIR database loading and nearest-direction lookup.
pub mod brir;
/// Binaural rendering by impulse response convolution.
pub mod render;
/// STFT, spectrograms and per-channel feature blocks.
pub mod features;
/// Ideal binary mask labeling.
pub mod targets;
/// Class-map encoding and mask decoding.
pub mod mask;
/// Per-channel mask classifiers.
pub mod ml;
/// Localization scoring against planted directions.
pub mod eval;
/// Scene synthesis and record persistence.
pub mod entry;
/// PNG renderings of spectrograms, class maps and masks.
pub mod viz;
/// Logging setup.
pub mod logging;
/// Application directory helpers.
pub mod app_dirs;
