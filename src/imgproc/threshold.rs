use crate::core::Frame;
use crate::error::{Error, Result};
use rayon::prelude::*;

use super::histogram::calc_hist;

/// Apply a fixed binary threshold: values strictly above `thresh` become
/// `maxval`, everything else 0.
pub fn threshold(src: &Frame, dst: &mut Frame, thresh: f64, maxval: f64) -> Result<()> {
    if src.channels() != 1 {
        return Err(Error::InvalidInput(
            "threshold requires single-channel input".to_string(),
        ));
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let thresh_u8 = thresh.clamp(0.0, 255.0) as u8;
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let maxval_u8 = maxval.clamp(0.0, 255.0) as u8;

    let cols = src.cols();
    *dst = Frame::new(src.rows(), cols, 1)?;

    let src_data = src.data();
    dst.data_mut()
        .par_chunks_mut(cols.max(1))
        .enumerate()
        .for_each(|(row, dst_row)| {
            for (col, out) in dst_row.iter_mut().enumerate() {
                *out = if src_data[row * cols + col] > thresh_u8 {
                    maxval_u8
                } else {
                    0
                };
            }
        });

    Ok(())
}

/// Select the threshold level that maximises inter-class variance of the
/// intensity histogram (Otsu's method).
#[must_use]
pub fn otsu_level(src: &Frame) -> u8 {
    let hist = calc_hist(src.data());
    let total = src.data().len() as f64;
    if total == 0.0 {
        return 0;
    }

    let sum_all: f64 = hist
        .iter()
        .enumerate()
        .map(|(i, &c)| i as f64 * f64::from(c))
        .sum();

    let mut sum_bg = 0.0f64;
    let mut weight_bg = 0.0f64;
    let mut best_level = 0u8;
    let mut best_variance = 0.0f64;

    for level in 0..256usize {
        weight_bg += f64::from(hist[level]);
        if weight_bg == 0.0 {
            continue;
        }
        let weight_fg = total - weight_bg;
        if weight_fg == 0.0 {
            break;
        }

        sum_bg += level as f64 * f64::from(hist[level]);
        let mean_bg = sum_bg / weight_bg;
        let mean_fg = (sum_all - sum_bg) / weight_fg;

        let between = weight_bg * weight_fg * (mean_bg - mean_fg) * (mean_bg - mean_fg);
        if between > best_variance {
            best_variance = between;
            #[allow(clippy::cast_possible_truncation)]
            {
                best_level = level as u8;
            }
        }
    }

    best_level
}

/// Otsu binarization: automatic level selection followed by a binary
/// threshold to `{0, maxval}`. Returns the selected level.
pub fn otsu_threshold(src: &Frame, dst: &mut Frame, maxval: f64) -> Result<u8> {
    let level = otsu_level(src);
    threshold(src, dst, f64::from(level), maxval)?;
    Ok(level)
}
