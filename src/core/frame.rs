use crate::core::types::{Rect, Scalar, Size};
use crate::error::{Error, Result};
use ndarray::Array3;

/// An 8-bit image with 1 or 3 channels, stored row-major.
///
/// Frames are value objects: the pipeline never mutates an input frame and
/// every processing stage produces new frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    data: Vec<u8>,
    rows: usize,
    cols: usize,
    channels: usize,
}

impl Frame {
    /// Create a zero-filled frame with the given dimensions and channels
    pub fn new(rows: usize, cols: usize, channels: usize) -> Result<Self> {
        if channels == 0 || channels > 4 {
            return Err(Error::InvalidInput(format!(
                "Unsupported channel count: {channels}"
            )));
        }

        Ok(Self {
            data: vec![0u8; rows * cols * channels],
            rows,
            cols,
            channels,
        })
    }

    /// Create a zero-filled frame (alias for `new`)
    pub fn zeros(rows: usize, cols: usize, channels: usize) -> Result<Self> {
        Self::new(rows, cols, channels)
    }

    /// A 0x0 single-channel frame, the placeholder for empty results
    #[must_use]
    pub fn empty() -> Self {
        Self {
            data: Vec::new(),
            rows: 0,
            cols: 0,
            channels: 1,
        }
    }

    /// Create a frame with every pixel set to a scalar value
    pub fn filled(rows: usize, cols: usize, channels: usize, value: Scalar) -> Result<Self> {
        let mut frame = Self::new(rows, cols, channels)?;
        frame.fill(value);
        Ok(frame)
    }

    /// Create a frame from raw row-major data
    pub fn from_raw(data: Vec<u8>, rows: usize, cols: usize, channels: usize) -> Result<Self> {
        let expected = rows * cols * channels;
        if data.len() != expected {
            return Err(Error::InvalidInput(format!(
                "Data size {} doesn't match expected size {}",
                data.len(),
                expected
            )));
        }

        Ok(Self {
            data,
            rows,
            cols,
            channels,
        })
    }

    #[must_use]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[must_use]
    pub fn cols(&self) -> usize {
        self.cols
    }

    #[must_use]
    pub fn channels(&self) -> usize {
        self.channels
    }

    #[must_use]
    pub fn size(&self) -> Size {
        #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
        Size::new(self.cols as i32, self.rows as i32)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows == 0 || self.cols == 0
    }

    /// The full frame rectangle at origin
    #[must_use]
    pub fn rect(&self) -> Rect {
        #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
        Rect::new(0, 0, self.cols as i32, self.rows as i32)
    }

    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Pixel slice at (row, col)
    #[inline]
    pub fn at(&self, row: usize, col: usize) -> Result<&[u8]> {
        if row >= self.rows || col >= self.cols {
            return Err(Error::Internal(format!(
                "Index ({}, {}) out of range for {}x{} frame",
                row, col, self.rows, self.cols
            )));
        }
        let idx = (row * self.cols + col) * self.channels;
        Ok(&self.data[idx..idx + self.channels])
    }

    /// Mutable pixel slice at (row, col)
    #[inline]
    pub fn at_mut(&mut self, row: usize, col: usize) -> Result<&mut [u8]> {
        if row >= self.rows || col >= self.cols {
            return Err(Error::Internal(format!(
                "Index ({}, {}) out of range for {}x{} frame",
                row, col, self.rows, self.cols
            )));
        }
        let idx = (row * self.cols + col) * self.channels;
        Ok(&mut self.data[idx..idx + self.channels])
    }

    /// Set all pixels to a scalar value
    pub fn fill(&mut self, value: Scalar) {
        let channels = self.channels.min(4);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let vals: Vec<u8> = value.val[..channels]
            .iter()
            .map(|&v| v.clamp(0.0, 255.0) as u8)
            .collect();

        for pixel in self.data.chunks_exact_mut(self.channels) {
            pixel[..channels].copy_from_slice(&vals);
        }
    }

    /// Copy out a region of interest. The rectangle is clipped to the frame.
    pub fn roi(&self, rect: Rect) -> Result<Frame> {
        let clipped = rect.clip_to(self.size());
        if clipped.is_empty() {
            return Err(Error::InvalidInput(
                "ROI does not intersect the frame".to_string(),
            ));
        }

        #[allow(clippy::cast_sign_loss)]
        let (x, y, w, h) = (
            clipped.x as usize,
            clipped.y as usize,
            clipped.width as usize,
            clipped.height as usize,
        );

        let mut out = Frame::new(h, w, self.channels)?;
        let row_bytes = w * self.channels;
        for row in 0..h {
            let src_start = ((y + row) * self.cols + x) * self.channels;
            let dst_start = row * row_bytes;
            out.data[dst_start..dst_start + row_bytes]
                .copy_from_slice(&self.data[src_start..src_start + row_bytes]);
        }
        Ok(out)
    }

    /// Convert to an ndarray (rows, cols, channels) for external consumers
    pub fn to_array3(&self) -> Result<Array3<u8>> {
        Array3::from_shape_vec((self.rows, self.cols, self.channels), self.data.clone())
            .map_err(|e| Error::Internal(e.to_string()))
    }

    /// Create a frame from an ndarray (rows, cols, channels)
    pub fn from_array3(arr: Array3<u8>) -> Result<Self> {
        let shape = arr.shape();
        let (rows, cols, channels) = (shape[0], shape[1], shape[2]);
        Self::from_raw(arr.into_raw_vec(), rows, cols, channels)
    }
}
