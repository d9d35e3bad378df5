//! Background subtraction models.
//!
//! Both models consume 1- or 3-channel frames (multi-channel pixels are
//! reduced to their channel mean) and produce a single-channel foreground
//! mask: 0 for background, 255 for foreground, and [`SHADOW_VALUE`] for
//! foreground pixels classified as shadows when `detect_shadows` is on.

use crate::core::Frame;
use crate::error::{Error, Result};

/// Mask value for pixels classified as shadow rather than true foreground
pub const SHADOW_VALUE: u8 = 127;

/// A shadow is a darkened copy of the background: intensity below the
/// background estimate but above this fraction of it.
const SHADOW_RATIO: f32 = 0.5;

/// Parameters shared by both model families
#[derive(Debug, Clone, Copy)]
pub struct BackgroundParams {
    pub history: usize,
    pub threshold: f64,
    pub detect_shadows: bool,
}

#[inline]
fn is_shadow(intensity: f32, background: f32) -> bool {
    background > 0.0 && intensity < background && intensity >= SHADOW_RATIO * background
}

/// A background model selected from configuration
pub enum BackgroundModel {
    Mog2(Mog2Model),
    Knn(KnnModel),
}

impl BackgroundModel {
    /// Update the model with a frame and return its foreground mask
    pub fn apply(&mut self, frame: &Frame) -> Result<Frame> {
        match self {
            BackgroundModel::Mog2(model) => model.apply(frame),
            BackgroundModel::Knn(model) => model.apply(frame),
        }
    }
}

#[inline]
fn pixel_intensity(pixel: &[u8]) -> f32 {
    let sum: u32 = pixel.iter().map(|&v| u32::from(v)).sum();
    sum as f32 / pixel.len() as f32
}

fn check_input(frame: &Frame) -> Result<()> {
    if frame.is_empty() {
        return Err(Error::BackgroundModel("Empty input frame".to_string()));
    }
    if frame.channels() != 1 && frame.channels() != 3 {
        return Err(Error::BackgroundModel(format!(
            "Unsupported channel count: {}",
            frame.channels()
        )));
    }
    Ok(())
}

/// Per-pixel mixture-of-Gaussians background model
pub struct Mog2Model {
    params: BackgroundParams,
    num_gaussians: usize,
    background_ratio: f32,
    var_init: f32,
    var_min: f32,
    var_max: f32,

    // Flattened [pixel][gaussian] model state
    mean: Vec<f32>,
    variance: Vec<f32>,
    weight: Vec<f32>,
    pixels: usize,
}

impl Mog2Model {
    #[must_use]
    pub fn new(params: BackgroundParams) -> Self {
        Self {
            params,
            num_gaussians: 5,
            background_ratio: 0.9,
            var_init: 15.0,
            var_min: 4.0,
            var_max: 75.0,
            mean: Vec::new(),
            variance: Vec::new(),
            weight: Vec::new(),
            pixels: 0,
        }
    }

    pub fn apply(&mut self, frame: &Frame) -> Result<Frame> {
        check_input(frame)?;

        let rows = frame.rows();
        let cols = frame.cols();
        let pixels = rows * cols;
        let k = self.num_gaussians;

        if self.pixels != pixels {
            self.mean = vec![0.0; pixels * k];
            self.variance = vec![self.var_init; pixels * k];
            self.weight = vec![0.0; pixels * k];
            self.pixels = pixels;
        }

        let alpha = 1.0 / self.params.history.max(1) as f32;
        let channels = frame.channels();

        let mut mask = Frame::new(rows, cols, 1)?;
        let mask_data = mask.data_mut();

        for (i, pixel) in frame.data().chunks_exact(channels).enumerate() {
            let intensity = pixel_intensity(pixel);
            let base = i * k;
            // Dominant Gaussian before this pixel's update
            let bg_estimate = self.mean[base];

            // Find the first Gaussian this intensity matches
            let mut matched = None;
            for g in 0..k {
                let diff = (intensity - self.mean[base + g]).abs();
                #[allow(clippy::cast_possible_truncation)]
                let gate = (self.params.threshold as f32) * self.variance[base + g].sqrt();
                if diff < gate {
                    matched = Some(g);
                    break;
                }
            }

            let mut is_background = false;

            if let Some(g) = matched {
                let rho = alpha * self.weight[base + g];
                self.mean[base + g] += rho * (intensity - self.mean[base + g]);
                let diff = intensity - self.mean[base + g];
                self.variance[base + g] = ((1.0 - rho) * self.variance[base + g]
                    + rho * diff * diff)
                    .clamp(self.var_min, self.var_max);

                // Background if the matched Gaussian lies within the
                // dominant-weight prefix
                let mut weight_sum = 0.0f32;
                for j in 0..k {
                    weight_sum += self.weight[base + j];
                    if weight_sum > self.background_ratio {
                        if j >= g {
                            is_background = true;
                        }
                        break;
                    }
                }
            } else {
                // Replace the least probable Gaussian
                let g = k - 1;
                self.mean[base + g] = intensity;
                self.variance[base + g] = self.var_init;
                self.weight[base + g] = 0.05;
            }

            // Weight update and renormalization
            for g in 0..k {
                let m = matched == Some(g);
                self.weight[base + g] = (1.0 - alpha) * self.weight[base + g]
                    + if m { alpha } else { 0.0 };
            }
            let total: f32 = self.weight[base..base + k].iter().sum();
            if total > 0.0 {
                for g in 0..k {
                    self.weight[base + g] /= total;
                }
            }

            // Keep Gaussians ordered by weight / sigma
            let mut order: Vec<usize> = (0..k).collect();
            order.sort_by(|&a, &b| {
                let score_a = self.weight[base + a] / self.variance[base + a].sqrt();
                let score_b = self.weight[base + b] / self.variance[base + b].sqrt();
                score_b.partial_cmp(&score_a).unwrap_or(std::cmp::Ordering::Equal)
            });
            if order.iter().enumerate().any(|(idx, &o)| idx != o) {
                let mean_copy: Vec<f32> = self.mean[base..base + k].to_vec();
                let var_copy: Vec<f32> = self.variance[base..base + k].to_vec();
                let weight_copy: Vec<f32> = self.weight[base..base + k].to_vec();
                for (new_idx, &old_idx) in order.iter().enumerate() {
                    self.mean[base + new_idx] = mean_copy[old_idx];
                    self.variance[base + new_idx] = var_copy[old_idx];
                    self.weight[base + new_idx] = weight_copy[old_idx];
                }
            }

            mask_data[i] = if is_background {
                0
            } else if self.params.detect_shadows && is_shadow(intensity, bg_estimate) {
                SHADOW_VALUE
            } else {
                255
            };
        }

        Ok(mask)
    }
}

/// Sample-based adaptive background model (KNN over a per-pixel ring buffer)
pub struct KnnModel {
    params: BackgroundParams,
    k_samples: usize,
    max_samples: usize,

    samples: Vec<f32>,
    write_idx: Vec<usize>,
    filled: Vec<usize>,
    pixels: usize,
}

impl KnnModel {
    #[must_use]
    pub fn new(params: BackgroundParams) -> Self {
        let max_samples = params.history.clamp(1, 100);
        Self {
            params,
            k_samples: 5,
            max_samples,
            samples: Vec::new(),
            write_idx: Vec::new(),
            filled: Vec::new(),
            pixels: 0,
        }
    }

    pub fn apply(&mut self, frame: &Frame) -> Result<Frame> {
        check_input(frame)?;

        let rows = frame.rows();
        let cols = frame.cols();
        let pixels = rows * cols;

        if self.pixels != pixels {
            self.samples = vec![0.0; pixels * self.max_samples];
            self.write_idx = vec![0; pixels];
            self.filled = vec![0; pixels];
            self.pixels = pixels;
        }

        let channels = frame.channels();
        let mut mask = Frame::new(rows, cols, 1)?;
        let mask_data = mask.data_mut();

        let mut distances: Vec<f32> = Vec::with_capacity(self.max_samples);

        for (i, pixel) in frame.data().chunks_exact(channels).enumerate() {
            let intensity = pixel_intensity(pixel);
            let base = i * self.max_samples;

            distances.clear();
            let mut sample_sum = 0.0f32;
            for s in 0..self.filled[i] {
                let sample = self.samples[base + s];
                sample_sum += sample;
                let diff = intensity - sample;
                distances.push(diff * diff);
            }
            let bg_estimate = if self.filled[i] > 0 {
                sample_sum / self.filled[i] as f32
            } else {
                0.0
            };

            let is_background = if distances.is_empty() {
                false
            } else {
                distances.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
                let k = self.k_samples.min(distances.len());
                let avg: f32 = distances[..k].iter().sum::<f32>() / k as f32;
                #[allow(clippy::cast_possible_truncation)]
                {
                    avg < self.params.threshold as f32
                }
            };

            // Insert the observation into the ring buffer
            let w = self.write_idx[i];
            self.samples[base + w] = intensity;
            self.write_idx[i] = (w + 1) % self.max_samples;
            self.filled[i] = (self.filled[i] + 1).min(self.max_samples);

            mask_data[i] = if is_background {
                0
            } else if self.params.detect_shadows && is_shadow(intensity, bg_estimate) {
                SHADOW_VALUE
            } else {
                255
            };
        }

        Ok(mask)
    }
}
