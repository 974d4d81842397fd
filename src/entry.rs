//! Synthesis and persistence of a single dataset entry.
//!
//! An entry is one auditory scene: dry clips rendered through BRIRs at
//! distinct azimuths, summed into a binaural mixture and labeled with
//! per-channel ideal binary masks. Records round-trip through a
//! directory holding WAVs, PNG renderings, raw feature/target blobs
//! and a JSON manifest.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use ndarray::Array2;
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::angles::{AngleError, AngleGrid};
use crate::brir::{BrirDatabase, BrirError};
use crate::config::SynthConfig;
use crate::eval::{self, EvalError, EvalOutcome};
use crate::features::{FeatureError, FeatureExtractor};
use crate::mask::targets_to_mixed_ibm;
use crate::ml::Predictor;
use crate::render::{BinauralRenderer, StereoBuffer, normalize_rms_in_place};
use crate::targets::{TargetError, build_targets};
use crate::viz::{self, VizError};
use crate::wav::{self, WavError};

pub const ENTRY_FORMAT_VERSION: u32 = 1;
pub const ENTRY_MANIFEST_FILE_NAME: &str = "entry.json";
const FEATURES_FILE_NAME: &str = "features.f32le";
const TARGETS_FILE_NAME: &str = "targets.f32le";

#[derive(Debug, Error)]
pub enum EntryError {
    #[error("an entry needs at least one source clip")]
    NoClips,
    #[error("clip {index} has {actual} samples, expected {expected}")]
    ClipLength {
        index: usize,
        expected: usize,
        actual: usize,
    },
    #[error("BRIR database is sampled at {brir_rate} Hz, config wants {config_rate} Hz")]
    SampleRate { brir_rate: u32, config_rate: u32 },
    #[error(transparent)]
    Angle(#[from] AngleError),
    #[error(transparent)]
    Brir(#[from] BrirError),
    #[error(transparent)]
    Target(#[from] TargetError),
    #[error(transparent)]
    Feature(#[from] FeatureError),
    #[error(transparent)]
    Wav(#[from] WavError),
    #[error(transparent)]
    Viz(#[from] VizError),
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[error("invalid record manifest: {0}")]
    InvalidManifest(String),
    #[error("{path} holds {actual} values, expected {expected}")]
    BlobSize {
        path: PathBuf,
        expected: usize,
        actual: usize,
    },
}

#[derive(Debug, Serialize, Deserialize)]
struct RecordManifest {
    format_version: u32,
    id: Uuid,
    split: DatasetSplit,
    sample_rate_hz: u32,
    angles_deg: Vec<i32>,
    frames: usize,
    freq_channels: usize,
    num_classes: usize,
    feature_width: usize,
}

/// One synthesized scene with everything derived from it.
///
/// All matrices are time major: rows are STFT frames, columns are
/// frequency channels, classes or feature columns.
#[derive(Debug, Clone)]
pub struct DataEntry {
    pub id: Uuid,
    pub sample_rate_hz: u32,
    /// Azimuth per source, in the order the clips were given.
    pub angles_deg: Vec<i32>,
    /// Binaural rendering of each source on its own.
    pub sources: Vec<StereoBuffer>,
    pub mixture: StereoBuffer,
    /// Reference noise the labeling threshold is scaled from.
    pub noise: Vec<f32>,
    pub source_sgrams: Vec<Array2<f32>>,
    pub mixture_sgram: Array2<f32>,
    /// One-hot class matrix per frequency channel.
    pub targets: Vec<Array2<f32>>,
    /// ILD/IPD/MFCC block per frequency channel.
    pub features: Vec<Array2<f32>>,
    pub mixed_ibm: Array2<usize>,
}

impl DataEntry {
    /// Render `clips` into a labeled scene.
    ///
    /// Every clip must already be cut to the configured signal length.
    /// Azimuths are drawn without replacement, so no two sources share
    /// a direction.
    pub fn synthesize<R: Rng + ?Sized>(
        clips: Vec<Vec<f32>>,
        brir: &BrirDatabase,
        config: &SynthConfig,
        rng: &mut R,
    ) -> Result<DataEntry, EntryError> {
        if clips.is_empty() {
            return Err(EntryError::NoClips);
        }
        if brir.sample_rate_hz() != config.sample_rate_hz {
            return Err(EntryError::SampleRate {
                brir_rate: brir.sample_rate_hz(),
                config_rate: config.sample_rate_hz,
            });
        }
        let expected = config.signal_length_samples();
        for (index, clip) in clips.iter().enumerate() {
            if clip.len() != expected {
                return Err(EntryError::ClipLength {
                    index,
                    expected,
                    actual: clip.len(),
                });
            }
        }

        let mut clips = clips;
        for clip in &mut clips {
            normalize_rms_in_place(clip, config.input_rms);
        }

        let grid = AngleGrid::from_config(config);
        let mut angles_deg = Vec::with_capacity(clips.len());
        for _ in &clips {
            let angle = grid.draw_unique(&angles_deg, rng)?;
            angles_deg.push(angle);
        }

        let mut renderer = BinauralRenderer::new();
        let mut sources = Vec::with_capacity(clips.len());
        let mut mixture = StereoBuffer::zeros(expected);
        for (clip, &angle) in clips.iter().zip(&angles_deg) {
            let pair = brir.response_toward(angle)?;
            let rendered = renderer.render(clip, &pair.left, &pair.right);
            mixture.accumulate(&rendered);
            sources.push(rendered);
        }
        let noise = vec![0.0; expected];

        let extractor = FeatureExtractor::new(config);
        let source_sgrams: Vec<Array2<f32>> = sources
            .iter()
            .map(|source| extractor.spectrogram(&source.left))
            .collect();
        let noise_sgram = extractor.spectrogram(&noise);
        let mixture_sgram = extractor.spectrogram(&mixture.left);
        let targets = build_targets(
            &source_sgrams,
            &noise_sgram,
            &angles_deg,
            &grid,
            config.noise_floor_db,
        )?;
        let features = extractor.channel_features(&mixture);
        let mixed_ibm = targets_to_mixed_ibm(&targets);

        Ok(DataEntry {
            id: Uuid::new_v4(),
            sample_rate_hz: config.sample_rate_hz,
            angles_deg,
            sources,
            mixture,
            noise,
            source_sgrams,
            mixture_sgram,
            targets,
            features,
            mixed_ibm,
        })
    }

    /// Write the record directory for this entry.
    ///
    /// WAVs and PNGs are for inspection; the feature and target blobs
    /// plus `entry.json` are what training and evaluation read back.
    pub fn save_record(&self, config: &SynthConfig, dir: &Path) -> Result<(), EntryError> {
        fs::create_dir_all(dir).map_err(|source| EntryError::Io {
            path: dir.to_path_buf(),
            source,
        })?;

        for (i, source) in self.sources.iter().enumerate() {
            let path = dir.join(format!("original_{}.wav", i + 1));
            wav::write_stereo(&path, &source.left, &source.right, self.sample_rate_hz)?;
        }
        wav::write_stereo(
            &dir.join("mixture.wav"),
            &self.mixture.left,
            &self.mixture.right,
            self.sample_rate_hz,
        )?;

        for (i, sgram) in self.source_sgrams.iter().enumerate() {
            viz::save_spectrogram_png(sgram, &dir.join(format!("original_{}_spectrogram.png", i + 1)))?;
        }
        viz::save_spectrogram_png(&self.mixture_sgram, &dir.join("mixture_spectrogram.png"))?;
        viz::save_class_map_png(&self.mixed_ibm, config.num_classes(), &dir.join("mixed_ibm.png"))?;
        let grid = AngleGrid::from_config(config);
        for (i, &angle) in self.angles_deg.iter().enumerate() {
            let class = grid.class_of(angle)?;
            let mask = self
                .mixed_ibm
                .mapv(|winner| if winner == class { 1.0 } else { 0.0 });
            viz::save_mask_png(&mask, &dir.join(format!("original_{}_ibm.png", i + 1)))?;
        }

        write_blocks_f32le(&dir.join(FEATURES_FILE_NAME), &self.features)?;
        write_blocks_f32le(&dir.join(TARGETS_FILE_NAME), &self.targets)?;

        let manifest = RecordManifest {
            format_version: ENTRY_FORMAT_VERSION,
            id: self.id,
            split: split_for_entry(&self.id, config),
            sample_rate_hz: self.sample_rate_hz,
            angles_deg: self.angles_deg.clone(),
            frames: self.mixture_sgram.nrows(),
            freq_channels: self.mixture_sgram.ncols(),
            num_classes: config.num_classes(),
            feature_width: self.features.first().map_or(0, |block| block.ncols()),
        };
        let manifest_path = dir.join(ENTRY_MANIFEST_FILE_NAME);
        let bytes = serde_json::to_vec_pretty(&manifest).map_err(|source| EntryError::Json {
            path: manifest_path.clone(),
            source,
        })?;
        fs::write(&manifest_path, bytes).map_err(|source| EntryError::Io {
            path: manifest_path,
            source,
        })
    }

    /// Rebuild an entry from a record directory.
    ///
    /// Audio and blobs are read back as written; spectrograms and the
    /// class map are recomputed from them.
    pub fn load_record(dir: &Path, config: &SynthConfig) -> Result<DataEntry, EntryError> {
        let manifest_path = dir.join(ENTRY_MANIFEST_FILE_NAME);
        let bytes = fs::read(&manifest_path).map_err(|source| EntryError::Io {
            path: manifest_path.clone(),
            source,
        })?;
        let manifest: RecordManifest =
            serde_json::from_slice(&bytes).map_err(|source| EntryError::Json {
                path: manifest_path.clone(),
                source,
            })?;
        if manifest.format_version != ENTRY_FORMAT_VERSION {
            return Err(EntryError::InvalidManifest(format!(
                "unsupported format version {}",
                manifest.format_version
            )));
        }
        if manifest.sample_rate_hz != config.sample_rate_hz {
            return Err(EntryError::InvalidManifest(format!(
                "record sampled at {} Hz, config wants {} Hz",
                manifest.sample_rate_hz, config.sample_rate_hz
            )));
        }
        if manifest.freq_channels != config.freq_channels() {
            return Err(EntryError::InvalidManifest(format!(
                "record has {} frequency channels, config wants {}",
                manifest.freq_channels,
                config.freq_channels()
            )));
        }
        if manifest.num_classes != config.num_classes() {
            return Err(EntryError::InvalidManifest(format!(
                "record has {} classes, config wants {}",
                manifest.num_classes,
                config.num_classes()
            )));
        }
        if manifest.feature_width != 2 + config.mfcc_coeffs {
            return Err(EntryError::InvalidManifest(format!(
                "record features are {} wide, config wants {}",
                manifest.feature_width,
                2 + config.mfcc_coeffs
            )));
        }

        let mut sources = Vec::with_capacity(manifest.angles_deg.len());
        for i in 1..=manifest.angles_deg.len() {
            let path = dir.join(format!("original_{i}.wav"));
            let (left, right) = wav::read_stereo(&path, manifest.sample_rate_hz)?;
            sources.push(StereoBuffer { left, right });
        }
        let (left, right) = wav::read_stereo(&dir.join("mixture.wav"), manifest.sample_rate_hz)?;
        let mixture = StereoBuffer { left, right };
        let noise = vec![0.0; mixture.left.len()];

        let features = read_blocks_f32le(
            &dir.join(FEATURES_FILE_NAME),
            manifest.freq_channels,
            manifest.frames,
            manifest.feature_width,
        )?;
        let targets = read_blocks_f32le(
            &dir.join(TARGETS_FILE_NAME),
            manifest.freq_channels,
            manifest.frames,
            manifest.num_classes,
        )?;

        let extractor = FeatureExtractor::new(config);
        let source_sgrams: Vec<Array2<f32>> = sources
            .iter()
            .map(|source| extractor.spectrogram(&source.left))
            .collect();
        let mixture_sgram = extractor.spectrogram(&mixture.left);
        let mixed_ibm = targets_to_mixed_ibm(&targets);

        Ok(DataEntry {
            id: manifest.id,
            sample_rate_hz: manifest.sample_rate_hz,
            angles_deg: manifest.angles_deg,
            sources,
            mixture,
            noise,
            source_sgrams,
            mixture_sgram,
            targets,
            features,
            mixed_ibm,
        })
    }

    /// Score per-channel models against this entry's planted directions.
    pub fn evaluate_models<P: Predictor>(
        &self,
        models: &[P],
        config: &SynthConfig,
    ) -> Result<EvalOutcome, EvalError> {
        let grid = AngleGrid::from_config(config);
        eval::evaluate(
            models,
            &self.features,
            &self.angles_deg,
            &grid,
            config.min_mask_support,
        )
    }

    /// Write the predicted class map and one masked reconstruction per
    /// recovered source next to the record.
    pub fn save_eval_artifacts(
        &self,
        outcome: &EvalOutcome,
        config: &SynthConfig,
        dir: &Path,
    ) -> Result<(), EntryError> {
        fs::create_dir_all(dir).map_err(|source| EntryError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        viz::save_class_map_png(
            &outcome.mixed_ibm,
            config.num_classes(),
            &dir.join("predicted_mixed_ibm.png"),
        )?;
        let extractor = FeatureExtractor::new(config);
        for (i, mask) in outcome.masks.iter().enumerate() {
            let estimated = extractor.apply_mask_to_signal(&self.mixture.left, &mask.mask)?;
            wav::write_mono(
                &dir.join(format!("estimated_{}.wav", i + 1)),
                &estimated,
                self.sample_rate_hz,
            )?;
        }
        Ok(())
    }
}

/// Train/validation/test membership of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatasetSplit {
    Train,
    Validation,
    Test,
}

impl DatasetSplit {
    pub fn dir_name(self) -> &'static str {
        match self {
            DatasetSplit::Train => "train",
            DatasetSplit::Validation => "validation",
            DatasetSplit::Test => "test",
        }
    }
}

/// Deterministic split assignment from the entry id.
///
/// Hashing `seed|id` keeps the assignment stable across runs and
/// machines, so regenerating a dataset never moves an entry between
/// splits.
pub fn split_for_entry(id: &Uuid, config: &SynthConfig) -> DatasetSplit {
    let hash = blake3::hash(format!("{}|{id}", config.split_seed).as_bytes());
    let bytes = hash.as_bytes();
    let u = u64::from_le_bytes(bytes[0..8].try_into().expect("slice size verified"));
    let frac = (u as f64) / (u64::MAX as f64);
    if frac < config.test_fraction {
        DatasetSplit::Test
    } else if frac < config.test_fraction + config.validation_fraction {
        DatasetSplit::Validation
    } else {
        DatasetSplit::Train
    }
}

fn write_blocks_f32le(path: &Path, blocks: &[Array2<f32>]) -> Result<(), EntryError> {
    let file = File::create(path).map_err(|source| EntryError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut writer = BufWriter::new(file);
    for block in blocks {
        for &value in block.iter() {
            writer
                .write_all(&value.to_le_bytes())
                .map_err(|source| EntryError::Io {
                    path: path.to_path_buf(),
                    source,
                })?;
        }
    }
    writer.flush().map_err(|source| EntryError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn read_blocks_f32le(
    path: &Path,
    channels: usize,
    rows: usize,
    cols: usize,
) -> Result<Vec<Array2<f32>>, EntryError> {
    let bytes = fs::read(path).map_err(|source| EntryError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let expected = channels * rows * cols;
    if bytes.len() != expected * 4 {
        return Err(EntryError::BlobSize {
            path: path.to_path_buf(),
            expected,
            actual: bytes.len() / 4,
        });
    }
    let values: Vec<f32> = bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes(chunk.try_into().expect("chunk size verified")))
        .collect();
    let mut blocks = Vec::with_capacity(channels);
    for chunk in values.chunks_exact(rows * cols) {
        blocks.push(
            Array2::from_shape_vec((rows, cols), chunk.to_vec()).expect("chunk size verified"),
        );
    }
    Ok(blocks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::brir::ImpulsePair;
    use crate::ml::ModelError;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::f32::consts::PI;
    use tempfile::tempdir;

    fn small_config() -> SynthConfig {
        SynthConfig {
            sample_rate_hz: 8_000,
            signal_length_sec: 0.064,
            stft_frame: 64,
            stft_hop: 32,
            mel_bands: 20,
            mfcc_coeffs: 8,
            min_mask_support: 4,
            ..SynthConfig::default()
        }
    }

    /// Single-tap unit response on the left, half gain on the right.
    fn mock_brir(config: &SynthConfig) -> BrirDatabase {
        let grid = AngleGrid::from_config(config);
        let azimuths: Vec<u32> = grid
            .angles()
            .map(|angle| if angle < 0 { (angle + 360) as u32 } else { angle as u32 })
            .collect();
        let responses = azimuths
            .iter()
            .map(|_| ImpulsePair {
                left: vec![1.0],
                right: vec![0.5],
            })
            .collect();
        BrirDatabase::from_parts(config.sample_rate_hz, azimuths, responses).unwrap()
    }

    fn sine(freq: f32, rate: u32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|n| (2.0 * PI * freq * n as f32 / rate as f32).sin())
            .collect()
    }

    fn two_clip_entry(config: &SynthConfig, seed: u64) -> DataEntry {
        let len = config.signal_length_samples();
        let clips = vec![
            sine(500.0, config.sample_rate_hz, len),
            sine(2_000.0, config.sample_rate_hz, len),
        ];
        let brir = mock_brir(config);
        let mut rng = StdRng::seed_from_u64(seed);
        DataEntry::synthesize(clips, &brir, config, &mut rng).unwrap()
    }

    #[test]
    fn synthesize_builds_a_consistent_scene() {
        let config = small_config();
        let entry = two_clip_entry(&config, 7);

        assert_eq!(entry.angles_deg.len(), 2);
        assert_ne!(entry.angles_deg[0], entry.angles_deg[1]);
        assert_eq!(entry.sources.len(), 2);
        assert_eq!(entry.targets.len(), config.freq_channels());
        assert_eq!(entry.features.len(), config.freq_channels());

        let frames = entry.mixture_sgram.nrows();
        for target in &entry.targets {
            assert_eq!(target.dim(), (frames, config.num_classes()));
        }
        for block in &entry.features {
            assert_eq!(block.dim(), (frames, 2 + config.mfcc_coeffs));
        }
        assert_eq!(entry.mixed_ibm.dim(), (frames, config.freq_channels()));

        for i in 0..entry.mixture.left.len() {
            let summed = entry.sources[0].left[i] + entry.sources[1].left[i];
            assert!((entry.mixture.left[i] - summed).abs() < 1e-6);
        }
    }

    #[test]
    fn right_ear_follows_the_half_gain_response() {
        let config = small_config();
        let entry = two_clip_entry(&config, 3);
        for source in &entry.sources {
            for (l, r) in source.left.iter().zip(source.right.iter()) {
                assert!((l * 0.5 - r).abs() < 1e-5);
            }
        }
    }

    #[test]
    fn wrong_clip_length_is_rejected() {
        let config = small_config();
        let brir = mock_brir(&config);
        let mut rng = StdRng::seed_from_u64(1);
        let err = DataEntry::synthesize(vec![vec![0.0; 100]], &brir, &config, &mut rng)
            .unwrap_err();
        assert!(matches!(
            err,
            EntryError::ClipLength {
                index: 0,
                expected: 512,
                actual: 100,
            }
        ));
    }

    #[test]
    fn empty_clip_list_is_rejected() {
        let config = small_config();
        let brir = mock_brir(&config);
        let mut rng = StdRng::seed_from_u64(1);
        assert!(matches!(
            DataEntry::synthesize(Vec::new(), &brir, &config, &mut rng),
            Err(EntryError::NoClips)
        ));
    }

    #[test]
    fn brir_rate_mismatch_is_rejected() {
        let config = small_config();
        let mut other = small_config();
        other.sample_rate_hz = 16_000;
        let brir = mock_brir(&other);
        let len = config.signal_length_samples();
        let mut rng = StdRng::seed_from_u64(1);
        assert!(matches!(
            DataEntry::synthesize(vec![vec![0.1; len]], &brir, &config, &mut rng),
            Err(EntryError::SampleRate {
                brir_rate: 16_000,
                config_rate: 8_000,
            })
        ));
    }

    #[test]
    fn record_round_trips_through_a_directory() {
        let config = small_config();
        let entry = two_clip_entry(&config, 11);
        let dir = tempdir().unwrap();
        entry.save_record(&config, dir.path()).unwrap();

        let loaded = DataEntry::load_record(dir.path(), &config).unwrap();
        assert_eq!(loaded.id, entry.id);
        assert_eq!(loaded.angles_deg, entry.angles_deg);
        assert_eq!(loaded.mixture.left, entry.mixture.left);
        assert_eq!(loaded.mixture.right, entry.mixture.right);
        assert_eq!(loaded.features, entry.features);
        assert_eq!(loaded.targets, entry.targets);
        assert_eq!(loaded.mixed_ibm, entry.mixed_ibm);
        assert_eq!(loaded.source_sgrams.len(), 2);
    }

    #[test]
    fn load_rejects_a_mismatched_config() {
        let config = small_config();
        let entry = two_clip_entry(&config, 13);
        let dir = tempdir().unwrap();
        entry.save_record(&config, dir.path()).unwrap();

        let mut other = small_config();
        other.stft_frame = 128;
        other.stft_hop = 64;
        assert!(matches!(
            DataEntry::load_record(dir.path(), &other),
            Err(EntryError::InvalidManifest(_))
        ));
    }

    /// Returns the stored matrix no matter the features.
    struct Oracle {
        out: Array2<f32>,
    }

    impl Predictor for Oracle {
        fn num_classes(&self) -> usize {
            self.out.ncols()
        }

        fn predict(&self, _features: &Array2<f32>) -> Result<Array2<f32>, ModelError> {
            Ok(self.out.clone())
        }
    }

    #[test]
    fn oracle_models_recover_the_planted_directions() {
        let config = small_config();
        let entry = two_clip_entry(&config, 17);
        let models: Vec<Oracle> = entry
            .targets
            .iter()
            .map(|target| Oracle {
                out: target.clone(),
            })
            .collect();

        let outcome = entry.evaluate_models(&models, &config).unwrap();
        assert_eq!(outcome.report.miss_rate, 0.0);
        assert_eq!(outcome.report.false_alarm_rate, 0.0);
        let mut recovered = outcome.report.recovered_deg.clone();
        let mut planted = entry.angles_deg.clone();
        recovered.sort_unstable();
        planted.sort_unstable();
        assert_eq!(recovered, planted);

        let dir = tempdir().unwrap();
        entry
            .save_eval_artifacts(&outcome, &config, dir.path())
            .unwrap();
        assert!(dir.path().join("predicted_mixed_ibm.png").exists());
        assert!(dir.path().join("estimated_1.wav").exists());
        assert!(dir.path().join("estimated_2.wav").exists());
    }

    #[test]
    fn split_assignment_is_stable_and_mostly_train() {
        let config = small_config();
        let id = Uuid::new_v4();
        assert_eq!(split_for_entry(&id, &config), split_for_entry(&id, &config));

        let train = (0..500)
            .map(|_| split_for_entry(&Uuid::new_v4(), &config))
            .filter(|split| *split == DatasetSplit::Train)
            .count();
        assert!(train > 250);
    }
}
