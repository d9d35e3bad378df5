use crate::core::types::Size;
use crate::core::Frame;
use crate::error::{Error, Result};

/// Morphological operation types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MorphOp {
    Erode,
    Dilate,
    Open,
    Close,
}

/// Structuring element shapes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MorphShape {
    Rect,
    Cross,
    Ellipse,
}

/// Build a structuring element for morphological operations
#[must_use]
pub fn get_structuring_element(shape: MorphShape, ksize: Size) -> Vec<Vec<bool>> {
    let rows = ksize.height.max(1) as usize;
    let cols = ksize.width.max(1) as usize;
    let mut kernel = vec![vec![false; cols]; rows];

    let center_y = rows / 2;
    let center_x = cols / 2;

    match shape {
        MorphShape::Rect => {
            for row in &mut kernel {
                row.fill(true);
            }
        }
        MorphShape::Cross => {
            for (y, row) in kernel.iter_mut().enumerate() {
                for (x, elem) in row.iter_mut().enumerate() {
                    *elem = y == center_y || x == center_x;
                }
            }
        }
        MorphShape::Ellipse => {
            let a = (center_x as f64).max(0.5);
            let b = (center_y as f64).max(0.5);
            for (y, row) in kernel.iter_mut().enumerate() {
                for (x, elem) in row.iter_mut().enumerate() {
                    let dx = (x as f64 - center_x as f64) / a;
                    let dy = (y as f64 - center_y as f64) / b;
                    *elem = dx * dx + dy * dy <= 1.0;
                }
            }
        }
    }

    kernel
}

fn check_kernel(kernel: &[Vec<bool>]) -> Result<()> {
    if kernel.is_empty() || kernel[0].is_empty() {
        return Err(Error::InvalidInput("Kernel is empty".to_string()));
    }
    Ok(())
}

/// Erode: each output pixel is the minimum over the kernel footprint
pub fn erode(src: &Frame, dst: &mut Frame, kernel: &[Vec<bool>]) -> Result<()> {
    check_kernel(kernel)?;
    min_max_sweep(src, dst, kernel, true)
}

/// Dilate: each output pixel is the maximum over the kernel footprint
pub fn dilate(src: &Frame, dst: &mut Frame, kernel: &[Vec<bool>]) -> Result<()> {
    check_kernel(kernel)?;
    min_max_sweep(src, dst, kernel, false)
}

fn min_max_sweep(src: &Frame, dst: &mut Frame, kernel: &[Vec<bool>], take_min: bool) -> Result<()> {
    let rows = src.rows();
    let cols = src.cols();
    let channels = src.channels();

    *dst = Frame::new(rows, cols, channels)?;

    let k_height = kernel.len();
    let k_width = kernel[0].len();
    let half_h = (k_height / 2) as i64;
    let half_w = (k_width / 2) as i64;

    let src_data = src.data();
    let dst_data = dst.data_mut();

    for row in 0..rows {
        for col in 0..cols {
            for ch in 0..channels {
                let mut acc: u8 = if take_min { 255 } else { 0 };

                for (ky, kernel_row) in kernel.iter().enumerate() {
                    #[allow(clippy::cast_possible_wrap)]
                    let y = row as i64 + ky as i64 - half_h;
                    if y < 0 || y >= rows as i64 {
                        continue;
                    }
                    for (kx, &active) in kernel_row.iter().enumerate() {
                        if !active {
                            continue;
                        }
                        #[allow(clippy::cast_possible_wrap)]
                        let x = col as i64 + kx as i64 - half_w;
                        if x < 0 || x >= cols as i64 {
                            continue;
                        }

                        #[allow(clippy::cast_sign_loss)]
                        let v = src_data[((y as usize) * cols + x as usize) * channels + ch];
                        acc = if take_min { acc.min(v) } else { acc.max(v) };
                    }
                }

                dst_data[(row * cols + col) * channels + ch] = acc;
            }
        }
    }

    Ok(())
}

/// Compound morphological operations
pub fn morphology_ex(src: &Frame, dst: &mut Frame, op: MorphOp, kernel: &[Vec<bool>]) -> Result<()> {
    match op {
        MorphOp::Erode => erode(src, dst, kernel),
        MorphOp::Dilate => dilate(src, dst, kernel),
        MorphOp::Open => {
            // Erosion followed by dilation removes small specks
            let mut temp = Frame::new(1, 1, 1)?;
            erode(src, &mut temp, kernel)?;
            dilate(&temp, dst, kernel)
        }
        MorphOp::Close => {
            // Dilation followed by erosion fills small holes
            let mut temp = Frame::new(1, 1, 1)?;
            dilate(src, &mut temp, kernel)?;
            erode(&temp, dst, kernel)
        }
    }
}
