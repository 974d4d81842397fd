use std::path::{Path, PathBuf};

use serde::de::Error as SerdeDeError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default filename used to store a synthesis configuration.
pub const CONFIG_FILE_NAME: &str = "earshot.toml";

/// Tunable parameters shared by synthesis, labeling and evaluation.
///
/// All fields have defaults so a partial TOML file only needs to name the
/// values it overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthConfig {
    /// Sample rate expected from input clips and impulse responses.
    #[serde(default = "default_sample_rate_hz")]
    pub sample_rate_hz: u32,
    /// Duration of every source clip in seconds.
    #[serde(default = "default_signal_length_sec")]
    pub signal_length_sec: f32,
    /// RMS level every source clip is normalized to before rendering.
    #[serde(default = "default_input_rms")]
    pub input_rms: f32,
    /// Lowest azimuth on the direction grid, in degrees.
    #[serde(default = "default_min_angle_deg")]
    pub min_angle_deg: i32,
    /// Highest azimuth on the direction grid, in degrees.
    #[serde(default = "default_max_angle_deg")]
    pub max_angle_deg: i32,
    /// Spacing between adjacent grid azimuths, in degrees.
    #[serde(default = "default_angle_step_deg")]
    pub angle_step_deg: i32,
    /// Margin above the noise spectrogram (in dB) a source bin must clear
    /// to be labeled with its direction instead of the noise class.
    #[serde(default = "default_noise_floor_db")]
    pub noise_floor_db: f32,
    /// Minimum number of time-frequency bins a class needs in a decoded
    /// class map before a binary mask is emitted for it.
    #[serde(default = "default_min_mask_support")]
    pub min_mask_support: usize,
    /// Analysis frame length in samples.
    #[serde(default = "default_stft_frame")]
    pub stft_frame: usize,
    /// Hop between adjacent analysis frames in samples.
    #[serde(default = "default_stft_hop")]
    pub stft_hop: usize,
    /// Number of mel bands in the filterbank stage.
    #[serde(default = "default_mel_bands")]
    pub mel_bands: usize,
    /// Number of cepstral coefficients kept after the DCT.
    #[serde(default = "default_mfcc_coeffs")]
    pub mfcc_coeffs: usize,
    /// Seed string mixed into the hash that assigns entries to splits.
    #[serde(default = "default_split_seed")]
    pub split_seed: String,
    /// Fraction of entries assigned to the test split.
    #[serde(default = "default_split_fraction")]
    pub test_fraction: f64,
    /// Fraction of entries assigned to the validation split.
    #[serde(default = "default_split_fraction")]
    pub validation_fraction: f64,
}

impl SynthConfig {
    /// Clip length in samples at the configured rate.
    pub fn signal_length_samples(&self) -> usize {
        (self.signal_length_sec * self.sample_rate_hz as f32).round() as usize
    }

    /// Number of azimuths on the direction grid.
    pub fn num_directions(&self) -> usize {
        ((self.max_angle_deg - self.min_angle_deg) / self.angle_step_deg) as usize + 1
    }

    /// Class index reserved for bins dominated by the noise floor.
    pub fn noise_class(&self) -> usize {
        self.num_directions()
    }

    /// Total label classes: one per grid azimuth plus the noise class.
    pub fn num_classes(&self) -> usize {
        self.num_directions() + 1
    }

    /// Frequency channels kept from each analysis frame (DC through Nyquist).
    pub fn freq_channels(&self) -> usize {
        self.stft_frame / 2 + 1
    }

    /// Check value ranges and cross-field consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_rate_hz == 0 {
            return Err(invalid("sample_rate_hz", "must be positive"));
        }
        if !(self.signal_length_sec > 0.0) {
            return Err(invalid("signal_length_sec", "must be positive"));
        }
        if !(self.input_rms > 0.0) {
            return Err(invalid("input_rms", "must be positive"));
        }
        if self.angle_step_deg <= 0 {
            return Err(invalid("angle_step_deg", "must be positive"));
        }
        if self.max_angle_deg < self.min_angle_deg {
            return Err(invalid(
                "max_angle_deg",
                "must not be below min_angle_deg",
            ));
        }
        if (self.max_angle_deg - self.min_angle_deg) % self.angle_step_deg != 0 {
            return Err(invalid(
                "angle_step_deg",
                "must evenly divide the angle range",
            ));
        }
        if self.stft_frame == 0 || !self.stft_frame.is_power_of_two() {
            return Err(invalid("stft_frame", "must be a power of two"));
        }
        if self.stft_hop == 0 || self.stft_hop > self.stft_frame {
            return Err(invalid(
                "stft_hop",
                "must be between 1 and stft_frame",
            ));
        }
        if self.mel_bands == 0 {
            return Err(invalid("mel_bands", "must be positive"));
        }
        if self.mfcc_coeffs == 0 || self.mfcc_coeffs > self.mel_bands {
            return Err(invalid(
                "mfcc_coeffs",
                "must be between 1 and mel_bands",
            ));
        }
        for (field, value) in [
            ("test_fraction", self.test_fraction),
            ("validation_fraction", self.validation_fraction),
        ] {
            if !(0.0..1.0).contains(&value) {
                return Err(invalid(field, "must be in [0, 1)"));
            }
        }
        if self.test_fraction + self.validation_fraction >= 1.0 {
            return Err(invalid(
                "test_fraction",
                "test and validation fractions must leave room for training",
            ));
        }
        Ok(())
    }
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: default_sample_rate_hz(),
            signal_length_sec: default_signal_length_sec(),
            input_rms: default_input_rms(),
            min_angle_deg: default_min_angle_deg(),
            max_angle_deg: default_max_angle_deg(),
            angle_step_deg: default_angle_step_deg(),
            noise_floor_db: default_noise_floor_db(),
            min_mask_support: default_min_mask_support(),
            stft_frame: default_stft_frame(),
            stft_hop: default_stft_hop(),
            mel_bands: default_mel_bands(),
            mfcc_coeffs: default_mfcc_coeffs(),
            split_seed: default_split_seed(),
            test_fraction: default_split_fraction(),
            validation_fraction: default_split_fraction(),
        }
    }
}

/// Errors that may occur while loading or saving a synthesis configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Unable to create config directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid config at {path}: {source}")]
    ParseToml {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to serialize config to TOML at {path}: {source}")]
    SerializeToml {
        path: PathBuf,
        source: toml::ser::Error,
    },
    #[error("Invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.to_string(),
    }
}

/// Load and validate a configuration from a TOML file.
pub fn load_from_path(path: &Path) -> Result<SynthConfig, ConfigError> {
    let bytes = std::fs::read(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let text = String::from_utf8(bytes).map_err(|source| ConfigError::ParseToml {
        path: path.to_path_buf(),
        source: SerdeDeError::custom(source),
    })?;
    let config: SynthConfig = toml::from_str(&text).map_err(|source| ConfigError::ParseToml {
        path: path.to_path_buf(),
        source,
    })?;
    config.validate()?;
    Ok(config)
}

/// Persist a configuration to a TOML file, creating parent directories as needed.
pub fn save_to_path(config: &SynthConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|source| ConfigError::CreateDir {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    let data = toml::to_string_pretty(config).map_err(|source| ConfigError::SerializeToml {
        path: path.to_path_buf(),
        source,
    })?;
    std::fs::write(path, data).map_err(|source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    })
}

fn default_sample_rate_hz() -> u32 {
    16_000
}

fn default_signal_length_sec() -> f32 {
    1.0
}

fn default_input_rms() -> f32 {
    0.1
}

fn default_min_angle_deg() -> i32 {
    -90
}

fn default_max_angle_deg() -> i32 {
    90
}

fn default_angle_step_deg() -> i32 {
    5
}

fn default_noise_floor_db() -> f32 {
    20.0
}

fn default_min_mask_support() -> usize {
    100
}

fn default_stft_frame() -> usize {
    256
}

fn default_stft_hop() -> usize {
    128
}

fn default_mel_bands() -> usize {
    40
}

fn default_mfcc_coeffs() -> usize {
    13
}

fn default_split_seed() -> String {
    "earshot-v1".to_string()
}

fn default_split_fraction() -> f64 {
    0.1
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn defaults_pass_validation() {
        let config = SynthConfig::default();
        config.validate().unwrap();
        assert_eq!(config.signal_length_samples(), 16_000);
        assert_eq!(config.num_directions(), 37);
        assert_eq!(config.noise_class(), 37);
        assert_eq!(config.num_classes(), 38);
        assert_eq!(config.freq_channels(), 129);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let config: SynthConfig = toml::from_str("sample_rate_hz = 8000").unwrap();
        assert_eq!(config.sample_rate_hz, 8_000);
        assert_eq!(config.stft_frame, 256);
        assert_eq!(config.min_angle_deg, -90);
    }

    #[test]
    fn round_trips_through_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("earshot.toml");
        let config = SynthConfig {
            noise_floor_db: 14.0,
            min_mask_support: 42,
            ..SynthConfig::default()
        };
        save_to_path(&config, &path).unwrap();
        let loaded = load_from_path(&path).unwrap();
        assert!((loaded.noise_floor_db - 14.0).abs() < f32::EPSILON);
        assert_eq!(loaded.min_mask_support, 42);
    }

    #[test]
    fn rejects_config_with_invalid_utf8() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("earshot.toml");
        // A stray 0xFF in a comment would survive lossy conversion.
        std::fs::write(&path, b"sample_rate_hz = 8000\n# \xff\n").unwrap();
        assert!(matches!(
            load_from_path(&path),
            Err(ConfigError::ParseToml { .. })
        ));
    }

    #[test]
    fn rejects_step_not_dividing_range() {
        let config = SynthConfig {
            angle_step_deg: 7,
            ..SynthConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field, .. }) if field == "angle_step_deg"
        ));
    }

    #[test]
    fn rejects_hop_larger_than_frame() {
        let config = SynthConfig {
            stft_hop: 512,
            ..SynthConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_splits_consuming_everything() {
        let config = SynthConfig {
            test_fraction: 0.6,
            validation_fraction: 0.5,
            ..SynthConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
