//! Frame-to-bounds stage: preprocessing, differencing, thresholding,
//! morphology and contour extraction.

use std::collections::VecDeque;

use tracing::{debug, error, warn};

use crate::config::{BackgroundMethod, BlurType, ContourDetectionMode, ProcessingMode, ProcessorConfig};
use crate::core::types::{Rect, Scalar, Size};
use crate::core::{abs_diff, bitwise_or, in_range, merge, split, Frame};
use crate::error::{Error, Result};
use crate::imgproc::{
    approx_poly_dp, arc_length, bilateral_filter, bounding_rect, contour_area, convex_hull,
    cvt_color, find_contours, gaussian_blur, get_structuring_element, median_blur, morphology_ex,
    otsu_threshold, threshold, Clahe, ColorConversionCode, MorphOp, MorphShape,
};
use crate::video::{BackgroundModel, BackgroundParams, KnnModel, Mog2Model, SHADOW_VALUE};

/// Output of one `process_frame` call
#[derive(Debug, Clone)]
pub struct ProcessingResult {
    pub processed: Frame,
    pub diff: Frame,
    pub threshold: Frame,
    pub morph: Frame,
    pub candidate_bounds: Vec<Rect>,
    pub has_motion: bool,
}

impl ProcessingResult {
    fn empty() -> Self {
        Self {
            processed: Frame::empty(),
            diff: Frame::empty(),
            threshold: Frame::empty(),
            morph: Frame::empty(),
            candidate_bounds: Vec::new(),
            has_motion: false,
        }
    }

    fn first_frame(processed: Frame) -> Self {
        let zeros = Frame::new(processed.rows(), processed.cols(), 1)
            .unwrap_or_else(|_| Frame::empty());
        Self {
            processed,
            diff: zeros.clone(),
            threshold: zeros.clone(),
            morph: zeros,
            candidate_bounds: Vec::new(),
            has_motion: false,
        }
    }
}

/// Rolling contour statistics backing adaptive filter thresholds
struct AdaptiveStats {
    areas: VecDeque<f64>,
    solidities: VecDeque<f64>,
    aspects: VecDeque<f64>,
    min_area: f64,
    min_solidity: f64,
    max_aspect: f64,
}

/// Samples required before the adaptive thresholds are recomputed
const ADAPTIVE_MIN_SAMPLES: usize = 10;
const ADAPTIVE_WINDOW: usize = 500;

impl AdaptiveStats {
    fn new(min_area: f64, min_solidity: f64, max_aspect: f64) -> Self {
        Self {
            areas: VecDeque::new(),
            solidities: VecDeque::new(),
            aspects: VecDeque::new(),
            min_area,
            min_solidity,
            max_aspect,
        }
    }

    fn observe(&mut self, area: f64, solidity: f64, aspect: f64) {
        push_bounded(&mut self.areas, area);
        push_bounded(&mut self.solidities, solidity);
        push_bounded(&mut self.aspects, aspect);
    }

    fn recompute(&mut self) {
        if self.areas.len() < ADAPTIVE_MIN_SAMPLES {
            return;
        }
        self.min_area = percentile(&self.areas, 0.25);
        self.min_solidity = percentile(&self.solidities, 0.5);
        self.max_aspect = percentile(&self.aspects, 0.9);
        debug!(
            min_area = self.min_area,
            min_solidity = self.min_solidity,
            max_aspect = self.max_aspect,
            "Recomputed adaptive contour thresholds"
        );
    }
}

fn push_bounded(window: &mut VecDeque<f64>, value: f64) {
    if window.len() == ADAPTIVE_WINDOW {
        window.pop_front();
    }
    window.push_back(value);
}

fn percentile(window: &VecDeque<f64>, q: f64) -> f64 {
    let mut sorted: Vec<f64> = window.iter().copied().collect();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    if sorted.is_empty() {
        return 0.0;
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let idx = ((sorted.len() - 1) as f64 * q).round() as usize;
    sorted[idx]
}

/// Stateful frame processor: turns one raw frame into candidate rectangles.
///
/// Holds the previous preprocessed frame and an optional background model.
/// A size change between frames resets both.
pub struct MotionProcessor {
    config: ProcessorConfig,
    clahe: Option<Clahe>,
    morph_kernel: Vec<Vec<bool>>,
    prev_frame: Option<Frame>,
    background: Option<BackgroundModel>,
    background_failed: bool,
    adaptive: AdaptiveStats,
    frame_count: u64,
}

impl MotionProcessor {
    pub fn new(config: ProcessorConfig) -> Result<Self> {
        let clahe = if config.contrast_enhancement {
            Some(Clahe::new(config.clahe_clip_limit, config.clahe_tile_size)?)
        } else {
            None
        };

        let morph_kernel = get_structuring_element(
            MorphShape::Ellipse,
            Size::new(config.morph_kernel_size, config.morph_kernel_size),
        );

        let background = make_background_model(&config);
        let adaptive = AdaptiveStats::new(
            config.min_contour_area,
            config.min_contour_solidity,
            config.max_contour_aspect_ratio,
        );

        Ok(Self {
            config,
            clahe,
            morph_kernel,
            prev_frame: None,
            background,
            background_failed: false,
            adaptive,
            frame_count: 0,
        })
    }

    /// Process one frame. Failures are absorbed: an invalid input or an
    /// internal imaging failure yields an empty result and leaves the
    /// processor ready for the next frame.
    pub fn process_frame(&mut self, frame: &Frame) -> ProcessingResult {
        match self.try_process(frame) {
            Ok(result) => result,
            Err(e) => {
                error!("Frame processing failed: {e}");
                ProcessingResult::empty()
            }
        }
    }

    /// Clear the previous frame and background model; the next frame is
    /// treated as the first again.
    pub fn reset(&mut self) {
        self.prev_frame = None;
        self.background = make_background_model(&self.config);
        self.background_failed = false;
        self.adaptive = AdaptiveStats::new(
            self.config.min_contour_area,
            self.config.min_contour_solidity,
            self.config.max_contour_aspect_ratio,
        );
        self.frame_count = 0;
    }

    #[must_use]
    pub fn is_first_frame(&self) -> bool {
        self.prev_frame.is_none()
    }

    #[must_use]
    pub fn max_threshold(&self) -> i32 {
        self.config.max_threshold
    }

    #[must_use]
    pub fn is_background_subtraction_enabled(&self) -> bool {
        self.background.is_some() && !self.background_failed
    }

    /// Effective contour thresholds: (min area, min solidity, max aspect)
    #[must_use]
    pub fn contour_thresholds(&self) -> (f64, f64, f64) {
        match self.config.contour_detection_mode {
            ContourDetectionMode::Permissive => (
                self.config.permissive_min_area,
                self.config.permissive_min_solidity,
                self.config.permissive_max_aspect_ratio,
            ),
            ContourDetectionMode::Adaptive => (
                self.adaptive.min_area,
                self.adaptive.min_solidity,
                self.adaptive.max_aspect,
            ),
        }
    }

    fn try_process(&mut self, frame: &Frame) -> Result<ProcessingResult> {
        if frame.is_empty() {
            debug!("Empty input frame");
            return Ok(ProcessingResult::empty());
        }
        if frame.channels() != 1 && frame.channels() != 3 {
            return Err(Error::InvalidInput(format!(
                "Expected 1 or 3 channels, got {}",
                frame.channels()
            )));
        }

        // A size change invalidates all per-frame state
        let size_changed = self
            .prev_frame
            .as_ref()
            .is_some_and(|prev| prev.rows() != frame.rows() || prev.cols() != frame.cols());
        if size_changed {
            warn!(
                "Frame size changed to {}x{}, resetting",
                frame.cols(),
                frame.rows()
            );
            self.reset();
        }

        let processed = self.preprocess(frame)?;

        self.frame_count += 1;
        let Some(prev) = self.prev_frame.clone() else {
            self.prev_frame = Some(processed.clone());
            return Ok(ProcessingResult::first_frame(processed));
        };

        let mut diff = Frame::new(1, 1, 1)?;
        abs_diff(&processed, &prev, &mut diff)?;

        // The motion mask is always single-channel
        let mut motion_mask = if diff.channels() == 1 {
            diff.clone()
        } else {
            let mut luma = Frame::new(1, 1, 1)?;
            cvt_color(&diff, &mut luma, ColorConversionCode::RgbToGray)?;
            luma
        };

        if let Some(model) = self.background.as_mut() {
            match model.apply(&processed) {
                Ok(fg_mask) => {
                    // Shadow-valued pixels are not motion
                    let mut foreground = Frame::new(1, 1, 1)?;
                    threshold(&fg_mask, &mut foreground, f64::from(SHADOW_VALUE), 255.0)?;
                    let mut combined = Frame::new(1, 1, 1)?;
                    bitwise_or(&foreground, &motion_mask, &mut combined)?;
                    motion_mask = combined;
                }
                Err(e) => {
                    if !self.background_failed {
                        warn!("Background model failed, falling back to frame differencing: {e}");
                    }
                    self.background_failed = true;
                    self.background = None;
                }
            }
        }

        let mut threshold = Frame::new(1, 1, 1)?;
        otsu_threshold(&motion_mask, &mut threshold, f64::from(self.config.max_threshold))?;

        let morph = self.apply_morphology(&threshold)?;
        let candidate_bounds = self.extract_contours(&morph)?;
        let has_motion = !candidate_bounds.is_empty();

        self.prev_frame = Some(processed.clone());

        Ok(ProcessingResult {
            processed,
            diff,
            threshold,
            morph,
            candidate_bounds,
            has_motion,
        })
    }

    /// Color conversion, contrast enhancement and blur
    fn preprocess(&self, frame: &Frame) -> Result<Frame> {
        let mut processed = match self.config.processing_mode {
            ProcessingMode::Grayscale => {
                if frame.channels() == 1 {
                    frame.clone()
                } else {
                    let mut gray = Frame::new(1, 1, 1)?;
                    cvt_color(frame, &mut gray, ColorConversionCode::RgbToGray)?;
                    gray
                }
            }
            ProcessingMode::Ycrcb => {
                if frame.channels() == 1 {
                    frame.clone()
                } else {
                    let mut ycrcb = Frame::new(1, 1, 1)?;
                    cvt_color(frame, &mut ycrcb, ColorConversionCode::RgbToYCrCb)?;
                    // Luma plane only
                    let planes = split(&ycrcb)?;
                    planes.into_iter().next().ok_or_else(|| {
                        Error::Internal("split produced no planes".to_string())
                    })?
                }
            }
            ProcessingMode::Hsv => {
                if frame.channels() != 3 {
                    return Err(Error::InvalidInput(
                        "HSV mode requires 3-channel input".to_string(),
                    ));
                }
                let mut hsv = Frame::new(1, 1, 1)?;
                cvt_color(frame, &mut hsv, ColorConversionCode::RgbToHsv)?;

                let lo = self.config.hsv_lower;
                let hi = self.config.hsv_upper;
                let mut mask = Frame::new(1, 1, 1)?;
                in_range(
                    &hsv,
                    &mut mask,
                    Scalar::new(f64::from(lo.h), f64::from(lo.s), f64::from(lo.v), 0.0),
                    Scalar::new(f64::from(hi.h), f64::from(hi.s), f64::from(hi.v), 0.0),
                )?;
                mask
            }
            ProcessingMode::Rgb => frame.clone(),
        };

        if let Some(clahe) = &self.clahe {
            processed = if processed.channels() == 1 {
                let mut enhanced = Frame::new(1, 1, 1)?;
                clahe.apply(&processed, &mut enhanced)?;
                enhanced
            } else {
                let mut planes = split(&processed)?;
                for plane in &mut planes {
                    let mut enhanced = Frame::new(1, 1, 1)?;
                    clahe.apply(plane, &mut enhanced)?;
                    *plane = enhanced;
                }
                let mut merged = Frame::new(1, 1, 1)?;
                merge(&planes, &mut merged)?;
                merged
            };
        }

        match self.config.blur_type {
            BlurType::None => {}
            BlurType::Gaussian => {
                let k = self.config.gaussian_blur_size;
                let mut blurred = Frame::new(1, 1, 1)?;
                gaussian_blur(&processed, &mut blurred, Size::new(k, k), 0.0)?;
                processed = blurred;
            }
            BlurType::Median => {
                let mut blurred = Frame::new(1, 1, 1)?;
                median_blur(&processed, &mut blurred, self.config.median_blur_size)?;
                processed = blurred;
            }
            BlurType::Bilateral => {
                // Bilateral runs on 8-bit single-channel data only
                let input = if processed.channels() == 1 {
                    processed
                } else {
                    let mut gray = Frame::new(1, 1, 1)?;
                    cvt_color(&processed, &mut gray, ColorConversionCode::RgbToGray)?;
                    gray
                };
                let mut blurred = Frame::new(1, 1, 1)?;
                bilateral_filter(
                    &input,
                    &mut blurred,
                    self.config.bilateral_d,
                    self.config.bilateral_sigma_color,
                    self.config.bilateral_sigma_space,
                )?;
                processed = blurred;
            }
        }

        Ok(processed)
    }

    fn apply_morphology(&self, threshold: &Frame) -> Result<Frame> {
        if !self.config.morphology {
            return Ok(threshold.clone());
        }

        let mut current = threshold.clone();
        let kernel = &self.morph_kernel;

        if self.config.morph_close {
            let mut out = Frame::new(1, 1, 1)?;
            morphology_ex(&current, &mut out, MorphOp::Close, kernel)?;
            current = out;
        }
        if self.config.morph_open {
            let mut out = Frame::new(1, 1, 1)?;
            morphology_ex(&current, &mut out, MorphOp::Open, kernel)?;
            current = out;
        }
        if self.config.morph_dilation {
            let mut out = Frame::new(1, 1, 1)?;
            morphology_ex(&current, &mut out, MorphOp::Dilate, kernel)?;
            current = out;
        }
        if self.config.morph_erosion {
            let mut out = Frame::new(1, 1, 1)?;
            morphology_ex(&current, &mut out, MorphOp::Erode, kernel)?;
            current = out;
        }

        Ok(current)
    }

    fn extract_contours(&mut self, morph: &Frame) -> Result<Vec<Rect>> {
        let contours = find_contours(morph)?;
        let frame_size = morph.size();

        // Feed raw contour statistics to the adaptive window before any
        // filtering so the thresholds reflect what the scene produces.
        if self.config.contour_detection_mode == ContourDetectionMode::Adaptive {
            for contour in &contours {
                let area = contour_area(contour);
                if area <= 0.0 {
                    continue;
                }
                let hull = convex_hull(contour);
                let hull_area = contour_area(&hull);
                let solidity = if hull_area > 0.0 { area / hull_area } else { 0.0 };
                let aspect = bounding_rect(contour).aspect_ratio();
                self.adaptive.observe(area, solidity, aspect);
            }

            let interval = self.config.adaptive_update_interval.max(1) as u64;
            if self.frame_count % interval == 0 {
                self.adaptive.recompute();
            }
        }

        let (min_area, min_solidity, max_aspect) = self.contour_thresholds();

        let mut bounds = Vec::new();
        for contour in &contours {
            let area = contour_area(contour);
            if area < min_area {
                continue;
            }

            let approx = if self.config.contour_approximation {
                let epsilon = self.config.contour_epsilon_factor * arc_length(contour, true);
                approx_poly_dp(contour, epsilon)
            } else {
                contour.clone()
            };

            let rect = if self.config.convex_hull {
                let hull = convex_hull(&approx);
                let hull_area = contour_area(&hull);
                let solidity = if hull_area > 0.0 { area / hull_area } else { 0.0 };
                if self.config.contour_filtering && solidity < min_solidity {
                    continue;
                }
                bounding_rect(&hull)
            } else {
                bounding_rect(&approx)
            };

            if self.config.contour_filtering && rect.aspect_ratio() > max_aspect {
                continue;
            }

            let clipped = rect.clip_to(frame_size);
            if !clipped.is_empty() {
                bounds.push(clipped);
            }
        }

        if self.frame_count % 30 == 0 {
            debug!(
                "Found {} contours, {} passed filtering",
                contours.len(),
                bounds.len()
            );
        }

        Ok(bounds)
    }
}

fn make_background_model(config: &ProcessorConfig) -> Option<BackgroundModel> {
    if !config.background_subtraction {
        return None;
    }
    let params = BackgroundParams {
        history: config.background_history,
        threshold: config.background_threshold,
        detect_shadows: config.background_detect_shadows,
    };
    Some(match config.background_subtraction_method {
        BackgroundMethod::Mog2 => BackgroundModel::Mog2(Mog2Model::new(params)),
        BackgroundMethod::Knn => BackgroundModel::Knn(KnnModel::new(params)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ProcessorConfig;

    fn test_config() -> ProcessorConfig {
        ProcessorConfig {
            blur_type: BlurType::None,
            morphology: false,
            contour_filtering: false,
            permissive_min_area: 50.0,
            ..ProcessorConfig::default()
        }
    }

    fn frame_with_square(rows: usize, cols: usize, rect: Rect, value: u8) -> Frame {
        let mut frame = Frame::new(rows, cols, 1).unwrap();
        for row in rect.y..rect.y + rect.height {
            for col in rect.x..rect.x + rect.width {
                frame.at_mut(row as usize, col as usize).unwrap()[0] = value;
            }
        }
        frame
    }

    #[test]
    fn test_first_frame_has_no_motion() {
        let mut processor = MotionProcessor::new(test_config()).unwrap();
        let frame = Frame::new(120, 160, 1).unwrap();

        let result = processor.process_frame(&frame);
        assert!(!result.has_motion);
        assert!(result.candidate_bounds.is_empty());
        assert!(!processor.is_first_frame());
    }

    #[test]
    fn test_static_input_is_quiet() {
        let mut processor = MotionProcessor::new(test_config()).unwrap();
        let frame = frame_with_square(120, 160, Rect::new(20, 20, 40, 40), 200);

        for _ in 0..5 {
            let result = processor.process_frame(&frame);
            assert!(!result.has_motion);
        }
    }

    #[test]
    fn test_moving_square_detected() {
        let mut processor = MotionProcessor::new(test_config()).unwrap();

        let dark = Frame::new(480, 640, 1).unwrap();
        processor.process_frame(&dark);

        let lit = frame_with_square(480, 640, Rect::new(100, 100, 50, 50), 255);
        let result = processor.process_frame(&lit);

        assert!(result.has_motion);
        assert_eq!(result.candidate_bounds.len(), 1);
        let b = result.candidate_bounds[0];
        assert!((b.x - 100).abs() <= 5 && (b.y - 100).abs() <= 5);
        assert!((b.width - 50).abs() <= 5 && (b.height - 50).abs() <= 5);
    }

    #[test]
    fn test_empty_input_returns_default() {
        let mut processor = MotionProcessor::new(test_config()).unwrap();
        let result = processor.process_frame(&Frame::new(0, 0, 1).unwrap());
        assert!(!result.has_motion);
        assert!(result.candidate_bounds.is_empty());
        // State untouched: next real frame is still the first
        assert!(processor.is_first_frame());
    }

    #[test]
    fn test_size_change_resets() {
        let mut processor = MotionProcessor::new(test_config()).unwrap();
        processor.process_frame(&Frame::new(100, 100, 1).unwrap());
        assert!(!processor.is_first_frame());

        // Different size: dropped previous frame, so no motion reported
        let result = processor.process_frame(&Frame::new(200, 200, 1).unwrap());
        assert!(!result.has_motion);
        assert!(!processor.is_first_frame());
    }

    #[test]
    fn test_reset_forgets_previous() {
        let mut processor = MotionProcessor::new(test_config()).unwrap();
        processor.process_frame(&Frame::new(100, 100, 1).unwrap());
        processor.reset();
        assert!(processor.is_first_frame());
    }

    #[test]
    fn test_bounds_clipped_to_frame() {
        let mut processor = MotionProcessor::new(test_config()).unwrap();

        let dark = Frame::new(100, 100, 1).unwrap();
        processor.process_frame(&dark);

        // Blob flush against the border
        let lit = frame_with_square(100, 100, Rect::new(80, 80, 20, 20), 255);
        let result = processor.process_frame(&lit);

        let frame_rect = Rect::new(0, 0, 100, 100);
        for b in &result.candidate_bounds {
            assert_eq!(b.intersection(&frame_rect), *b);
        }
    }

    #[test]
    fn test_area_filter_rejects_specks() {
        let mut config = test_config();
        config.permissive_min_area = 100.0;
        let mut processor = MotionProcessor::new(config).unwrap();

        processor.process_frame(&Frame::new(100, 100, 1).unwrap());
        // 4x4 blob: boundary area 9 < 100
        let lit = frame_with_square(100, 100, Rect::new(50, 50, 4, 4), 255);
        let result = processor.process_frame(&lit);
        assert!(!result.has_motion);
    }

    #[test]
    fn test_aspect_ratio_filter() {
        let mut config = test_config();
        config.contour_filtering = true;
        config.permissive_max_aspect_ratio = 3.0;
        config.permissive_min_area = 10.0;
        let mut processor = MotionProcessor::new(config).unwrap();

        processor.process_frame(&Frame::new(100, 200, 1).unwrap());
        // 100x10 sliver: aspect 10 > 3
        let lit = frame_with_square(100, 200, Rect::new(10, 50, 100, 10), 255);
        let result = processor.process_frame(&lit);
        assert!(result.candidate_bounds.is_empty());
    }

    #[test]
    fn test_rejects_bad_channel_count() {
        let mut processor = MotionProcessor::new(test_config()).unwrap();
        let frame = Frame::new(10, 10, 4).unwrap();
        let result = processor.process_frame(&frame);
        assert!(!result.has_motion);
        assert!(result.candidate_bounds.is_empty());
    }

    #[test]
    fn test_hsv_full_match_is_white() {
        let mut config = test_config();
        config.processing_mode = ProcessingMode::Hsv;
        config.hsv_lower = crate::config::HsvBound { h: 0, s: 0, v: 40 };
        config.hsv_upper = crate::config::HsvBound { h: 179, s: 255, v: 255 };
        let mut processor = MotionProcessor::new(config).unwrap();

        // First frame black: value channel 0, outside the range
        let black = Frame::new(60, 80, 3).unwrap();
        processor.process_frame(&black);

        let colored = Frame::filled(60, 80, 3, Scalar::all(128.0)).unwrap();
        let result = processor.process_frame(&colored);

        assert!(result.processed.data().iter().all(|&v| v == 255));
        assert_eq!(result.candidate_bounds, vec![Rect::new(0, 0, 80, 60)]);
    }

    #[test]
    fn test_morphology_close_bridges_gap() {
        let mut config = test_config();
        config.morphology = true;
        config.morph_close = true;
        config.morph_open = false;
        config.morph_kernel_size = 5;
        let mut processor = MotionProcessor::new(config).unwrap();

        processor.process_frame(&Frame::new(100, 100, 1).unwrap());

        // Two blobs separated by a 2px gap fuse after closing
        let mut lit = frame_with_square(100, 100, Rect::new(20, 20, 10, 10), 255);
        for row in 20..30 {
            for col in 32..42 {
                lit.at_mut(row, col).unwrap()[0] = 255;
            }
        }
        let result = processor.process_frame(&lit);
        assert_eq!(result.candidate_bounds.len(), 1);
    }
}
