//! PNG renderings of spectrograms, class maps and masks.
//!
//! Images are laid out with time on the x axis and frequency on the y
//! axis, lowest channel at the bottom.

use std::path::{Path, PathBuf};

use image::{Rgb, RgbImage};
use ndarray::Array2;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VizError {
    #[error("cannot render an empty matrix to {path}")]
    Empty { path: PathBuf },
    #[error("failed to write {path}: {source}")]
    Encode {
        path: PathBuf,
        source: image::ImageError,
    },
}

/// Dynamic range shown below the loudest bin.
const SPECTROGRAM_RANGE_DB: f32 = 80.0;

/// Save a magnitude spectrogram dB-scaled onto a heat palette.
pub fn save_spectrogram_png(sgram: &Array2<f32>, path: &Path) -> Result<(), VizError> {
    let (frames, channels) = sgram.dim();
    if frames == 0 || channels == 0 {
        return Err(VizError::Empty {
            path: path.to_path_buf(),
        });
    }
    let db = sgram.mapv(|mag| 20.0 * mag.max(1e-9).log10());
    let max_db = db.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let floor_db = max_db - SPECTROGRAM_RANGE_DB;

    let mut img = RgbImage::new(frames as u32, channels as u32);
    for (x, y, pixel) in img.enumerate_pixels_mut() {
        let channel = channels - 1 - y as usize;
        let t = (db[[x as usize, channel]] - floor_db) / SPECTROGRAM_RANGE_DB;
        *pixel = heat_color(t);
    }
    save(&img, path)
}

/// Save a class map with one palette step per class.
///
/// High class indices render dark, so the noise class (the highest index)
/// recedes and source regions stand out.
pub fn save_class_map_png(
    map: &Array2<usize>,
    num_classes: usize,
    path: &Path,
) -> Result<(), VizError> {
    let (frames, channels) = map.dim();
    if frames == 0 || channels == 0 {
        return Err(VizError::Empty {
            path: path.to_path_buf(),
        });
    }
    let denom = num_classes.saturating_sub(1).max(1) as f32;
    let mut img = RgbImage::new(frames as u32, channels as u32);
    for (x, y, pixel) in img.enumerate_pixels_mut() {
        let channel = channels - 1 - y as usize;
        let t = 1.0 - map[[x as usize, channel]] as f32 / denom;
        *pixel = heat_color(t);
    }
    save(&img, path)
}

/// Save a binary mask as a grayscale image, kept bins in white.
pub fn save_mask_png(mask: &Array2<f32>, path: &Path) -> Result<(), VizError> {
    let (frames, channels) = mask.dim();
    if frames == 0 || channels == 0 {
        return Err(VizError::Empty {
            path: path.to_path_buf(),
        });
    }
    let mut img = RgbImage::new(frames as u32, channels as u32);
    for (x, y, pixel) in img.enumerate_pixels_mut() {
        let channel = channels - 1 - y as usize;
        let level = (mask[[x as usize, channel]].clamp(0.0, 1.0) * 255.0).round() as u8;
        *pixel = Rgb([level, level, level]);
    }
    save(&img, path)
}

fn save(img: &RgbImage, path: &Path) -> Result<(), VizError> {
    img.save(path).map_err(|source| VizError::Encode {
        path: path.to_path_buf(),
        source,
    })
}

fn heat_color(t: f32) -> Rgb<u8> {
    const STOPS: [(f32, [f32; 3]); 5] = [
        (0.0, [0.0, 0.0, 4.0]),
        (0.25, [87.0, 16.0, 110.0]),
        (0.5, [188.0, 55.0, 84.0]),
        (0.75, [249.0, 142.0, 9.0]),
        (1.0, [252.0, 255.0, 164.0]),
    ];
    let t = t.clamp(0.0, 1.0);
    for pair in STOPS.windows(2) {
        let (t0, c0) = pair[0];
        let (t1, c1) = pair[1];
        if t <= t1 {
            let u = if t1 > t0 { (t - t0) / (t1 - t0) } else { 0.0 };
            return Rgb([
                (c0[0] + (c1[0] - c0[0]) * u).round() as u8,
                (c0[1] + (c1[1] - c0[1]) * u).round() as u8,
                (c0[2] + (c1[2] - c0[2]) * u).round() as u8,
            ]);
        }
    }
    Rgb([252, 255, 164])
}
