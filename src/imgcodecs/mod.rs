//! Reading and writing frames as image files. Used by the driver to feed
//! the pipeline from a directory of frames, and by tests for fixtures.

use crate::core::Frame;
use crate::error::{Error, Result};
use image::{DynamicImage, ImageBuffer, Luma, Rgb};
use std::path::Path;

/// Read an image file into a frame. Anything that is not already 8-bit
/// grayscale or RGB is converted to RGB.
pub fn imread<P: AsRef<Path>>(path: P) -> Result<Frame> {
    let img = image::open(path)?;

    match img {
        DynamicImage::ImageLuma8(buffer) => {
            let (width, height) = buffer.dimensions();
            Frame::from_raw(buffer.into_raw(), height as usize, width as usize, 1)
        }
        DynamicImage::ImageRgb8(buffer) => {
            let (width, height) = buffer.dimensions();
            Frame::from_raw(buffer.into_raw(), height as usize, width as usize, 3)
        }
        other => {
            let rgb = other.to_rgb8();
            let (width, height) = rgb.dimensions();
            Frame::from_raw(rgb.into_raw(), height as usize, width as usize, 3)
        }
    }
}

/// Write a frame to an image file; the format follows the file extension
pub fn imwrite<P: AsRef<Path>>(path: P, frame: &Frame) -> Result<()> {
    #[allow(clippy::cast_possible_truncation)]
    let (width, height) = (frame.cols() as u32, frame.rows() as u32);

    match frame.channels() {
        1 => {
            let buffer =
                ImageBuffer::<Luma<u8>, Vec<u8>>::from_raw(width, height, frame.data().to_vec())
                    .ok_or_else(|| {
                        Error::Internal("Failed to create image buffer".to_string())
                    })?;
            buffer.save(path)?;
        }
        3 => {
            let buffer =
                ImageBuffer::<Rgb<u8>, Vec<u8>>::from_raw(width, height, frame.data().to_vec())
                    .ok_or_else(|| {
                        Error::Internal("Failed to create image buffer".to_string())
                    })?;
            buffer.save(path)?;
        }
        n => {
            return Err(Error::InvalidInput(format!(
                "Cannot write frame with {n} channels"
            )));
        }
    }

    Ok(())
}
