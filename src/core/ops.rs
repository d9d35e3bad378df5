//! Element-wise frame operations composed by the pipeline.

use crate::core::frame::Frame;
use crate::core::types::Scalar;
use crate::error::{Error, Result};

fn check_same_shape(a: &Frame, b: &Frame) -> Result<()> {
    if a.rows() != b.rows() || a.cols() != b.cols() || a.channels() != b.channels() {
        return Err(Error::InvalidInput(format!(
            "Frame shapes differ: {}x{}x{} vs {}x{}x{}",
            a.rows(),
            a.cols(),
            a.channels(),
            b.rows(),
            b.cols(),
            b.channels()
        )));
    }
    Ok(())
}

/// Per-element absolute difference
pub fn abs_diff(src1: &Frame, src2: &Frame, dst: &mut Frame) -> Result<()> {
    check_same_shape(src1, src2)?;

    *dst = Frame::new(src1.rows(), src1.cols(), src1.channels())?;
    for ((d, &a), &b) in dst
        .data_mut()
        .iter_mut()
        .zip(src1.data().iter())
        .zip(src2.data().iter())
    {
        *d = a.abs_diff(b);
    }
    Ok(())
}

/// Per-element bitwise OR
pub fn bitwise_or(src1: &Frame, src2: &Frame, dst: &mut Frame) -> Result<()> {
    check_same_shape(src1, src2)?;

    *dst = Frame::new(src1.rows(), src1.cols(), src1.channels())?;
    for ((d, &a), &b) in dst
        .data_mut()
        .iter_mut()
        .zip(src1.data().iter())
        .zip(src2.data().iter())
    {
        *d = a | b;
    }
    Ok(())
}

/// Binary mask of pixels whose every channel lies within [lower, upper].
/// Output is single-channel with values in {0, 255}.
pub fn in_range(src: &Frame, dst: &mut Frame, lower: Scalar, upper: Scalar) -> Result<()> {
    let channels = src.channels();
    if channels > 4 {
        return Err(Error::InvalidInput(
            "in_range supports up to 4 channels".to_string(),
        ));
    }

    *dst = Frame::new(src.rows(), src.cols(), 1)?;
    let dst_data = dst.data_mut();

    for (i, pixel) in src.data().chunks_exact(channels).enumerate() {
        let mut inside = true;
        for ch in 0..channels {
            let v = f64::from(pixel[ch]);
            if v < lower.val[ch] || v > upper.val[ch] {
                inside = false;
                break;
            }
        }
        dst_data[i] = if inside { 255 } else { 0 };
    }
    Ok(())
}

/// Split a multi-channel frame into single-channel planes
pub fn split(src: &Frame) -> Result<Vec<Frame>> {
    let channels = src.channels();
    let mut planes = Vec::with_capacity(channels);
    for _ in 0..channels {
        planes.push(Frame::new(src.rows(), src.cols(), 1)?);
    }

    for (i, pixel) in src.data().chunks_exact(channels).enumerate() {
        for (ch, plane) in planes.iter_mut().enumerate() {
            plane.data_mut()[i] = pixel[ch];
        }
    }
    Ok(planes)
}

/// Merge single-channel planes into one multi-channel frame
pub fn merge(planes: &[Frame], dst: &mut Frame) -> Result<()> {
    if planes.is_empty() {
        return Err(Error::InvalidInput("No planes to merge".to_string()));
    }
    let (rows, cols) = (planes[0].rows(), planes[0].cols());
    for plane in planes {
        if plane.channels() != 1 || plane.rows() != rows || plane.cols() != cols {
            return Err(Error::InvalidInput(
                "All planes must be single-channel with identical size".to_string(),
            ));
        }
    }

    let channels = planes.len();
    *dst = Frame::new(rows, cols, channels)?;
    let dst_data = dst.data_mut();
    for (i, pixel) in dst_data.chunks_exact_mut(channels).enumerate() {
        for (ch, plane) in planes.iter().enumerate() {
            pixel[ch] = plane.data()[i];
        }
    }
    Ok(())
}

/// Number of non-zero elements
#[must_use]
pub fn count_nonzero(src: &Frame) -> usize {
    src.data().iter().filter(|&&v| v != 0).count()
}
