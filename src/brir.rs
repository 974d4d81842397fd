//! Binaural room impulse response storage.
//!
//! A BRIR database is a directory holding `manifest.json` plus a raw
//! `impulses.f32le` blob laid out `[direction][ear][tap]` in little-endian
//! `f32` values. Directions are keyed by integer azimuth in `[0, 360)`.

use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

const BRIR_FORMAT_VERSION: i64 = 1;
const MANIFEST_FILE_NAME: &str = "manifest.json";
const IMPULSES_FILE_NAME: &str = "impulses.f32le";

#[derive(Debug, Error)]
pub enum BrirError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid manifest: {0}")]
    InvalidManifest(String),
    #[error("impulse blob holds {actual} f32 values, expected {expected}")]
    BlobSizeMismatch { expected: usize, actual: usize },
    #[error("impulse response {index} has mismatched ear lengths")]
    UnevenResponse { index: usize },
    #[error("azimuth {azimuth_deg} outside [-90, 90]")]
    AzimuthOutOfRange { azimuth_deg: i32 },
}

/// One direction's impulse response, one buffer per ear.
#[derive(Debug, Clone, PartialEq)]
pub struct ImpulsePair {
    pub left: Vec<f32>,
    pub right: Vec<f32>,
}

/// In-memory BRIR database with nearest-azimuth lookup.
#[derive(Debug, Clone)]
pub struct BrirDatabase {
    sample_rate_hz: u32,
    num_taps: usize,
    azimuths_deg: Vec<u32>,
    responses: Vec<ImpulsePair>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct BrirManifest {
    format_version: i64,
    sample_rate_hz: u32,
    num_taps: usize,
    azimuths_deg: Vec<u32>,
    files: BrirManifestFiles,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct BrirManifestFiles {
    impulses: String,
}

impl BrirDatabase {
    /// Assemble a database from measured responses.
    ///
    /// All responses must share one tap count and pair up with an azimuth
    /// in `[0, 360)`.
    pub fn from_parts(
        sample_rate_hz: u32,
        azimuths_deg: Vec<u32>,
        responses: Vec<ImpulsePair>,
    ) -> Result<Self, BrirError> {
        if azimuths_deg.is_empty() {
            return Err(BrirError::InvalidManifest(
                "database has no directions".to_string(),
            ));
        }
        if azimuths_deg.len() != responses.len() {
            return Err(BrirError::InvalidManifest(format!(
                "{} azimuths but {} responses",
                azimuths_deg.len(),
                responses.len()
            )));
        }
        if let Some(&bad) = azimuths_deg.iter().find(|&&az| az >= 360) {
            return Err(BrirError::InvalidManifest(format!(
                "azimuth {bad} outside [0, 360)"
            )));
        }
        let num_taps = responses[0].left.len();
        if num_taps == 0 {
            return Err(BrirError::InvalidManifest(
                "impulse responses are empty".to_string(),
            ));
        }
        for (index, pair) in responses.iter().enumerate() {
            if pair.left.len() != num_taps || pair.right.len() != num_taps {
                return Err(BrirError::UnevenResponse { index });
            }
        }
        Ok(Self {
            sample_rate_hz,
            num_taps,
            azimuths_deg,
            responses,
        })
    }

    /// Load a database directory written by [`BrirDatabase::save`].
    pub fn load(dir: &Path) -> Result<Self, BrirError> {
        let manifest_path = dir.join(MANIFEST_FILE_NAME);
        let mut manifest_bytes = Vec::new();
        File::open(&manifest_path)?.read_to_end(&mut manifest_bytes)?;
        let manifest: BrirManifest = serde_json::from_slice(&manifest_bytes)?;
        if manifest.format_version != BRIR_FORMAT_VERSION {
            return Err(BrirError::InvalidManifest(format!(
                "unsupported format_version {}",
                manifest.format_version
            )));
        }

        let values = load_f32le(&dir.join(&manifest.files.impulses))?;
        let expected = manifest
            .azimuths_deg
            .len()
            .saturating_mul(2)
            .saturating_mul(manifest.num_taps);
        if values.len() != expected {
            return Err(BrirError::BlobSizeMismatch {
                expected,
                actual: values.len(),
            });
        }

        let taps = manifest.num_taps;
        let responses = values
            .chunks_exact(2 * taps)
            .map(|pair| ImpulsePair {
                left: pair[..taps].to_vec(),
                right: pair[taps..].to_vec(),
            })
            .collect();
        Self::from_parts(manifest.sample_rate_hz, manifest.azimuths_deg, responses)
    }

    /// Write the manifest and impulse blob into `dir`, creating it if needed.
    pub fn save(&self, dir: &Path) -> Result<(), BrirError> {
        std::fs::create_dir_all(dir)?;
        let mut writer = BufWriter::new(File::create(dir.join(IMPULSES_FILE_NAME))?);
        for pair in &self.responses {
            for &sample in pair.left.iter().chain(pair.right.iter()) {
                writer.write_all(&sample.to_le_bytes())?;
            }
        }
        writer.flush()?;

        let manifest = BrirManifest {
            format_version: BRIR_FORMAT_VERSION,
            sample_rate_hz: self.sample_rate_hz,
            num_taps: self.num_taps,
            azimuths_deg: self.azimuths_deg.clone(),
            files: BrirManifestFiles {
                impulses: IMPULSES_FILE_NAME.to_string(),
            },
        };
        let manifest_bytes = serde_json::to_vec_pretty(&manifest)?;
        std::fs::write(dir.join(MANIFEST_FILE_NAME), manifest_bytes)?;
        Ok(())
    }

    pub fn sample_rate_hz(&self) -> u32 {
        self.sample_rate_hz
    }

    pub fn num_taps(&self) -> usize {
        self.num_taps
    }

    pub fn len(&self) -> usize {
        self.azimuths_deg.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn azimuths_deg(&self) -> &[u32] {
        &self.azimuths_deg
    }

    /// Response measured closest to `azimuth_deg`.
    ///
    /// Only frontal azimuths in `[-90, 90]` are accepted; negative ones are
    /// shifted by +360 to match the storage convention. Distance is plain
    /// absolute difference with no wraparound at 0/360, and the first of two
    /// equally close directions wins.
    pub fn response_toward(&self, azimuth_deg: i32) -> Result<&ImpulsePair, BrirError> {
        if !(-90..=90).contains(&azimuth_deg) {
            return Err(BrirError::AzimuthOutOfRange { azimuth_deg });
        }
        let target = if azimuth_deg < 0 {
            azimuth_deg + 360
        } else {
            azimuth_deg
        };
        let mut best_idx = 0;
        let mut best_diff = u32::MAX;
        for (idx, &az) in self.azimuths_deg.iter().enumerate() {
            let diff = (az as i32 - target).unsigned_abs();
            if diff < best_diff {
                best_diff = diff;
                best_idx = idx;
            }
        }
        Ok(&self.responses[best_idx])
    }
}

fn load_f32le(path: &Path) -> Result<Vec<f32>, BrirError> {
    let mut bytes = Vec::new();
    File::open(path)?.read_to_end(&mut bytes)?;
    if bytes.len() % 4 != 0 {
        return Err(BrirError::BlobSizeMismatch {
            expected: bytes.len() / 4 + 1,
            actual: bytes.len() / 4,
        });
    }
    let mut out = Vec::with_capacity(bytes.len() / 4);
    for chunk in bytes.chunks_exact(4) {
        out.push(f32::from_le_bytes(chunk.try_into().expect("chunk size verified")));
    }
    Ok(out)
}
