use crate::core::Frame;
use crate::error::{Error, Result};

/// 256-bin histogram of a single-channel frame region
#[must_use]
pub fn calc_hist(data: &[u8]) -> [u32; 256] {
    let mut hist = [0u32; 256];
    for &v in data {
        hist[v as usize] += 1;
    }
    hist
}

/// Build an equalization lookup table from a (possibly clipped) histogram
fn equalization_lut(hist: &[u32; 256], total: u32) -> [u8; 256] {
    let mut lut = [0u8; 256];
    if total == 0 {
        return lut;
    }

    let mut cdf = [0u32; 256];
    cdf[0] = hist[0];
    for i in 1..256 {
        cdf[i] = cdf[i - 1] + hist[i];
    }

    let cdf_min = cdf.iter().copied().find(|&v| v > 0).unwrap_or(0);
    if total <= cdf_min {
        return lut;
    }

    for i in 0..256 {
        let normalized =
            f64::from(cdf[i].saturating_sub(cdf_min)) / f64::from(total - cdf_min) * 255.0;
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        {
            lut[i] = normalized.round().clamp(0.0, 255.0) as u8;
        }
    }
    lut
}

/// Contrast-Limited Adaptive Histogram Equalization.
///
/// The frame is divided into `tile_size x tile_size` tiles; each tile's
/// histogram is clipped at `clip_limit` times the uniform bin height (excess
/// redistributed evenly) and equalized, and output pixels bilinearly
/// interpolate between the four surrounding tile lookup tables.
pub struct Clahe {
    clip_limit: f64,
    tile_size: usize,
}

impl Clahe {
    pub fn new(clip_limit: f64, tile_size: usize) -> Result<Self> {
        if clip_limit <= 0.0 {
            return Err(Error::Config("CLAHE clip limit must be positive".to_string()));
        }
        if tile_size == 0 {
            return Err(Error::Config("CLAHE tile size must be positive".to_string()));
        }
        Ok(Self { clip_limit, tile_size })
    }

    /// Apply to a single-channel frame
    pub fn apply(&self, src: &Frame, dst: &mut Frame) -> Result<()> {
        if src.channels() != 1 {
            return Err(Error::InvalidInput(
                "CLAHE requires single-channel input".to_string(),
            ));
        }

        let rows = src.rows();
        let cols = src.cols();
        if rows == 0 || cols == 0 {
            return Err(Error::InvalidInput("Empty frame".to_string()));
        }

        let tiles_y = self.tile_size.min(rows).max(1);
        let tiles_x = self.tile_size.min(cols).max(1);
        let tile_h = rows.div_ceil(tiles_y);
        let tile_w = cols.div_ceil(tiles_x);

        // Per-tile clipped equalization LUTs
        let mut luts = vec![[0u8; 256]; tiles_y * tiles_x];
        let src_data = src.data();

        for ty in 0..tiles_y {
            for tx in 0..tiles_x {
                let y0 = ty * tile_h;
                let y1 = ((ty + 1) * tile_h).min(rows);
                let x0 = tx * tile_w;
                let x1 = ((tx + 1) * tile_w).min(cols);

                let mut hist = [0u32; 256];
                for row in y0..y1 {
                    for col in x0..x1 {
                        hist[src_data[row * cols + col] as usize] += 1;
                    }
                }

                let total = ((y1 - y0) * (x1 - x0)) as u32;
                self.clip_histogram(&mut hist, total);
                luts[ty * tiles_x + tx] = equalization_lut(&hist, total);
            }
        }

        // Bilinear interpolation between tile LUTs
        *dst = Frame::new(rows, cols, 1)?;
        let dst_data = dst.data_mut();

        for row in 0..rows {
            let fy = (row as f64 - tile_h as f64 / 2.0) / tile_h as f64;
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let ty0 = fy.floor().max(0.0).min((tiles_y - 1) as f64) as usize;
            let ty1 = (ty0 + 1).min(tiles_y - 1);
            let wy = if fy < 0.0 { 0.0 } else { (fy - fy.floor()).clamp(0.0, 1.0) };

            for col in 0..cols {
                let fx = (col as f64 - tile_w as f64 / 2.0) / tile_w as f64;
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let tx0 = fx.floor().max(0.0).min((tiles_x - 1) as f64) as usize;
                let tx1 = (tx0 + 1).min(tiles_x - 1);
                let wx = if fx < 0.0 { 0.0 } else { (fx - fx.floor()).clamp(0.0, 1.0) };

                let v = src_data[row * cols + col] as usize;
                let tl = f64::from(luts[ty0 * tiles_x + tx0][v]);
                let tr = f64::from(luts[ty0 * tiles_x + tx1][v]);
                let bl = f64::from(luts[ty1 * tiles_x + tx0][v]);
                let br = f64::from(luts[ty1 * tiles_x + tx1][v]);

                let top = tl * (1.0 - wx) + tr * wx;
                let bottom = bl * (1.0 - wx) + br * wx;
                let value = top * (1.0 - wy) + bottom * wy;

                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                {
                    dst_data[row * cols + col] = value.round().clamp(0.0, 255.0) as u8;
                }
            }
        }

        Ok(())
    }

    fn clip_histogram(&self, hist: &mut [u32; 256], total: u32) {
        if total == 0 {
            return;
        }
        let uniform = f64::from(total) / 256.0;
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let limit = ((self.clip_limit * uniform).max(1.0)) as u32;

        let mut excess = 0u32;
        for bin in hist.iter_mut() {
            if *bin > limit {
                excess += *bin - limit;
                *bin = limit;
            }
        }

        // Redistribute clipped mass evenly
        let per_bin = excess / 256;
        let remainder = (excess % 256) as usize;
        for (i, bin) in hist.iter_mut().enumerate() {
            *bin += per_bin + u32::from(i < remainder);
        }
    }
}
