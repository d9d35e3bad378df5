use crate::core::types::Size;
use crate::core::Frame;
use crate::error::{Error, Result};
use rayon::prelude::*;

/// Apply Gaussian blur with a separable kernel
pub fn gaussian_blur(src: &Frame, dst: &mut Frame, ksize: Size, sigma: f64) -> Result<()> {
    if ksize.width % 2 == 0 || ksize.height % 2 == 0 || ksize.width < 1 || ksize.height < 1 {
        return Err(Error::InvalidInput(
            "Kernel size must be odd and positive".to_string(),
        ));
    }

    let kernel = gaussian_kernel(ksize.width, sigma);
    apply_separable_filter(src, dst, &kernel, &kernel)
}

fn gaussian_kernel(ksize: i32, sigma: f64) -> Vec<f32> {
    // OpenCV's convention when sigma is not given
    let sigma = if sigma > 0.0 {
        sigma
    } else {
        0.3 * (f64::from(ksize - 1) * 0.5 - 1.0) + 0.8
    };

    let half = ksize / 2;
    let mut kernel = Vec::with_capacity(ksize as usize);
    let mut sum = 0.0f64;
    for i in -half..=half {
        let x = f64::from(i);
        let v = (-(x * x) / (2.0 * sigma * sigma)).exp();
        kernel.push(v);
        sum += v;
    }

    #[allow(clippy::cast_possible_truncation)]
    kernel.into_iter().map(|v| (v / sum) as f32).collect()
}

/// Convolve rows then columns with 1-D kernels, clamping at the border
fn apply_separable_filter(
    src: &Frame,
    dst: &mut Frame,
    kernel_x: &[f32],
    kernel_y: &[f32],
) -> Result<()> {
    let rows = src.rows();
    let cols = src.cols();
    let channels = src.channels();
    if rows == 0 || cols == 0 {
        return Err(Error::InvalidInput("Empty frame".to_string()));
    }

    let half_x = kernel_x.len() / 2;
    let half_y = kernel_y.len() / 2;
    let row_size = cols * channels;

    // Horizontal pass
    let mut temp = vec![0f32; rows * cols * channels];
    {
        let src_data = src.data();
        temp.par_chunks_mut(row_size).enumerate().for_each(|(row, out_row)| {
            for col in 0..cols {
                for ch in 0..channels {
                    let mut acc = 0.0f32;
                    for (k, &w) in kernel_x.iter().enumerate() {
                        #[allow(clippy::cast_possible_wrap)]
                        let c = (col as i64 + k as i64 - half_x as i64)
                            .clamp(0, cols as i64 - 1) as usize;
                        acc += w * f32::from(src_data[(row * cols + c) * channels + ch]);
                    }
                    out_row[col * channels + ch] = acc;
                }
            }
        });
    }

    // Vertical pass
    *dst = Frame::new(rows, cols, channels)?;
    let dst_data = dst.data_mut();
    dst_data.par_chunks_mut(row_size).enumerate().for_each(|(row, out_row)| {
        for col in 0..cols {
            for ch in 0..channels {
                let mut acc = 0.0f32;
                for (k, &w) in kernel_y.iter().enumerate() {
                    #[allow(clippy::cast_possible_wrap)]
                    let r = (row as i64 + k as i64 - half_y as i64)
                        .clamp(0, rows as i64 - 1) as usize;
                    acc += w * temp[(r * cols + col) * channels + ch];
                }
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                {
                    out_row[col * channels + ch] = acc.round().clamp(0.0, 255.0) as u8;
                }
            }
        }
    });

    Ok(())
}

/// Apply median blur
pub fn median_blur(src: &Frame, dst: &mut Frame, ksize: i32) -> Result<()> {
    if ksize % 2 == 0 || ksize < 1 {
        return Err(Error::InvalidInput(
            "Kernel size must be odd and positive".to_string(),
        ));
    }
    if ksize > 21 {
        return Err(Error::InvalidInput(
            "Kernel size must be <= 21 for median blur".to_string(),
        ));
    }

    let rows = src.rows();
    let cols = src.cols();
    let channels = src.channels();
    let half = (ksize / 2) as usize;
    let row_size = cols * channels;

    *dst = Frame::new(rows, cols, channels)?;
    let src_data = src.data();
    let dst_data = dst.data_mut();

    dst_data.par_chunks_mut(row_size).enumerate().for_each(|(row, out_row)| {
        // Max 21x21 = 441 kernel values
        let mut values = [0u8; 441];

        for col in 0..cols {
            for ch in 0..channels {
                let mut count = 0usize;
                for ky in 0..ksize as usize {
                    #[allow(clippy::cast_possible_wrap)]
                    let r = (row as i64 + ky as i64 - half as i64).clamp(0, rows as i64 - 1)
                        as usize;
                    for kx in 0..ksize as usize {
                        #[allow(clippy::cast_possible_wrap)]
                        let c = (col as i64 + kx as i64 - half as i64).clamp(0, cols as i64 - 1)
                            as usize;
                        values[count] = src_data[(r * cols + c) * channels + ch];
                        count += 1;
                    }
                }
                values[..count].sort_unstable();
                out_row[col * channels + ch] = values[count / 2];
            }
        }
    });

    Ok(())
}

/// Apply a bilateral filter: Gaussian in space, Gaussian in intensity.
/// Requires single-channel input.
pub fn bilateral_filter(
    src: &Frame,
    dst: &mut Frame,
    d: i32,
    sigma_color: f64,
    sigma_space: f64,
) -> Result<()> {
    if src.channels() != 1 {
        return Err(Error::InvalidInput(
            "bilateral_filter requires single-channel input".to_string(),
        ));
    }
    if d < 1 {
        return Err(Error::InvalidInput(
            "Filter diameter must be positive".to_string(),
        ));
    }

    let rows = src.rows();
    let cols = src.cols();
    let half = (d / 2) as i64;

    let color_coeff = -0.5 / (sigma_color * sigma_color);
    let space_coeff = -0.5 / (sigma_space * sigma_space);

    *dst = Frame::new(rows, cols, 1)?;
    let src_data = src.data();
    let dst_data = dst.data_mut();

    dst_data.par_chunks_mut(cols).enumerate().for_each(|(row, out_row)| {
        for col in 0..cols {
            let center = f64::from(src_data[row * cols + col]);
            let mut weight_sum = 0.0f64;
            let mut value_sum = 0.0f64;

            for ky in -half..=half {
                #[allow(clippy::cast_possible_wrap)]
                let r = (row as i64 + ky).clamp(0, rows as i64 - 1) as usize;
                for kx in -half..=half {
                    #[allow(clippy::cast_possible_wrap)]
                    let c = (col as i64 + kx).clamp(0, cols as i64 - 1) as usize;

                    let neighbor = f64::from(src_data[r * cols + c]);
                    let spatial2 = (ky * ky + kx * kx) as f64;
                    let diff = neighbor - center;
                    let w = (spatial2 * space_coeff + diff * diff * color_coeff).exp();

                    weight_sum += w;
                    value_sum += w * neighbor;
                }
            }

            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            {
                out_row[col] = (value_sum / weight_sum).round().clamp(0.0, 255.0) as u8;
            }
        }
    });

    Ok(())
}
