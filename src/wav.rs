use std::path::{Path, PathBuf};

use hound::SampleFormat;
use thiserror::Error;

/// Errors raised while reading or writing WAV files.
#[derive(Debug, Error)]
pub enum WavError {
    #[error("Failed to open {path}: {source}")]
    Open {
        path: PathBuf,
        source: hound::Error,
    },
    #[error("Failed to create {path}: {source}")]
    Create {
        path: PathBuf,
        source: hound::Error,
    },
    #[error("Bad sample in {path}: {source}")]
    Sample {
        path: PathBuf,
        source: hound::Error,
    },
    #[error("Failed to finalize {path}: {source}")]
    Finalize {
        path: PathBuf,
        source: hound::Error,
    },
    #[error("{path} is sampled at {actual} Hz, expected {expected} Hz")]
    SampleRate {
        path: PathBuf,
        expected: u32,
        actual: u32,
    },
    #[error("{path} contains no samples")]
    Empty { path: PathBuf },
    #[error("{path} has {actual} channels, expected {expected}")]
    ChannelCount {
        path: PathBuf,
        expected: u16,
        actual: u16,
    },
}

/// Read a WAV file as mono samples, averaging channels when there are
/// several. Integer formats are rescaled to [-1, 1].
pub fn read_mono(path: &Path, expected_rate: u32) -> Result<Vec<f32>, WavError> {
    let (spec, interleaved) = read_interleaved(path, expected_rate)?;
    let channels = spec.channels.max(1) as usize;
    if channels == 1 {
        return Ok(interleaved);
    }
    let mono = interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect();
    Ok(mono)
}

/// Read a two-channel WAV file into separate left and right buffers.
pub fn read_stereo(path: &Path, expected_rate: u32) -> Result<(Vec<f32>, Vec<f32>), WavError> {
    let (spec, interleaved) = read_interleaved(path, expected_rate)?;
    if spec.channels != 2 {
        return Err(WavError::ChannelCount {
            path: path.to_path_buf(),
            expected: 2,
            actual: spec.channels,
        });
    }
    let mut left = Vec::with_capacity(interleaved.len() / 2);
    let mut right = Vec::with_capacity(interleaved.len() / 2);
    for frame in interleaved.chunks_exact(2) {
        left.push(frame[0]);
        right.push(frame[1]);
    }
    Ok((left, right))
}

fn read_interleaved(path: &Path, expected_rate: u32) -> Result<(hound::WavSpec, Vec<f32>), WavError> {
    let mut reader = hound::WavReader::open(path).map_err(|source| WavError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    let spec = reader.spec();
    if spec.sample_rate != expected_rate {
        return Err(WavError::SampleRate {
            path: path.to_path_buf(),
            expected: expected_rate,
            actual: spec.sample_rate,
        });
    }
    let interleaved = match spec.sample_format {
        SampleFormat::Float => reader
            .samples::<f32>()
            .map(|s| {
                s.map_err(|source| WavError::Sample {
                    path: path.to_path_buf(),
                    source,
                })
            })
            .collect::<Result<Vec<f32>, _>>()?,
        SampleFormat::Int => {
            let scale = (1i64 << spec.bits_per_sample.saturating_sub(1)).max(1) as f32;
            reader
                .samples::<i32>()
                .map(|s| {
                    s.map(|v| v as f32 / scale).map_err(|source| WavError::Sample {
                        path: path.to_path_buf(),
                        source,
                    })
                })
                .collect::<Result<Vec<f32>, _>>()?
        }
    };
    if interleaved.is_empty() {
        return Err(WavError::Empty {
            path: path.to_path_buf(),
        });
    }
    Ok((spec, interleaved))
}

/// Write mono samples as a 32-bit float WAV file.
pub fn write_mono(path: &Path, samples: &[f32], sample_rate: u32) -> Result<(), WavError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(path, spec).map_err(|source| WavError::Create {
        path: path.to_path_buf(),
        source,
    })?;
    for &sample in samples {
        writer
            .write_sample(sample)
            .map_err(|source| WavError::Sample {
                path: path.to_path_buf(),
                source,
            })?;
    }
    writer.finalize().map_err(|source| WavError::Finalize {
        path: path.to_path_buf(),
        source,
    })
}

/// Write left/right sample pairs as an interleaved 32-bit float WAV file.
///
/// Both channels must be the same length.
pub fn write_stereo(
    path: &Path,
    left: &[f32],
    right: &[f32],
    sample_rate: u32,
) -> Result<(), WavError> {
    debug_assert_eq!(left.len(), right.len());
    let spec = hound::WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample: 32,
        sample_format: SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(path, spec).map_err(|source| WavError::Create {
        path: path.to_path_buf(),
        source,
    })?;
    for (&l, &r) in left.iter().zip(right.iter()) {
        for sample in [l, r] {
            writer
                .write_sample(sample)
                .map_err(|source| WavError::Sample {
                    path: path.to_path_buf(),
                    source,
                })?;
        }
    }
    writer.finalize().map_err(|source| WavError::Finalize {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn mono_float_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mono.wav");
        let samples = vec![0.0, 0.5, -0.5, 0.25];
        write_mono(&path, &samples, 16_000).unwrap();
        let read = read_mono(&path, 16_000).unwrap();
        assert_eq!(read, samples);
    }

    #[test]
    fn stereo_is_downmixed_by_averaging() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        write_stereo(&path, &[1.0, 0.0], &[0.0, 0.5], 16_000).unwrap();
        let read = read_mono(&path, 16_000).unwrap();
        assert_eq!(read, vec![0.5, 0.25]);
    }

    #[test]
    fn stereo_round_trips_without_downmix() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pair.wav");
        write_stereo(&path, &[1.0, 0.0, -0.25], &[0.0, 0.5, 0.75], 16_000).unwrap();
        let (left, right) = read_stereo(&path, 16_000).unwrap();
        assert_eq!(left, vec![1.0, 0.0, -0.25]);
        assert_eq!(right, vec![0.0, 0.5, 0.75]);
    }

    #[test]
    fn read_stereo_rejects_mono_files() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mono.wav");
        write_mono(&path, &[0.1], 16_000).unwrap();
        assert!(matches!(
            read_stereo(&path, 16_000),
            Err(WavError::ChannelCount {
                expected: 2,
                actual: 1,
                ..
            })
        ));
    }

    #[test]
    fn int16_samples_are_rescaled() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("int16.wav");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 16_000,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for sample in [0i16, i16::MAX, i16::MIN] {
            writer.write_sample(sample).unwrap();
        }
        writer.finalize().unwrap();

        let read = read_mono(&path, 16_000).unwrap();
        let scale = (1i64 << 15) as f32;
        assert!((read[0] - 0.0).abs() < 1e-6);
        assert!((read[1] - i16::MAX as f32 / scale).abs() < 1e-6);
        assert!((read[2] - i16::MIN as f32 / scale).abs() < 1e-6);
    }

    #[test]
    fn rejects_unexpected_sample_rate() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rate.wav");
        write_mono(&path, &[0.1, 0.2], 44_100).unwrap();
        assert!(matches!(
            read_mono(&path, 16_000),
            Err(WavError::SampleRate {
                expected: 16_000,
                actual: 44_100,
                ..
            })
        ));
    }

    #[test]
    fn rejects_empty_files() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.wav");
        write_mono(&path, &[], 16_000).unwrap();
        assert!(matches!(read_mono(&path, 16_000), Err(WavError::Empty { .. })));
    }
}
