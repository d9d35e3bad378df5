//! Runtime configuration.
//!
//! Loaded once at startup from a YAML document; every option has a default
//! so an empty document is valid. Components receive their section by value
//! at construction and hold it immutably afterwards — reconfiguration is a
//! destroy-and-recreate.

use crate::core::types::Size;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Color handling applied to each incoming frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingMode {
    Grayscale,
    Hsv,
    Ycrcb,
    Rgb,
}

/// Smoothing filter applied after color conversion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlurType {
    None,
    Gaussian,
    Median,
    Bilateral,
}

/// Background model family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackgroundMethod {
    #[serde(rename = "MOG2")]
    Mog2,
    #[serde(rename = "KNN")]
    Knn,
}

/// How contour filter thresholds are chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContourDetectionMode {
    Adaptive,
    Permissive,
}

/// An inclusive HSV corner, one bound of the color filter box
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HsvBound {
    pub h: u8,
    pub s: u8,
    pub v: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
    pub processing_mode: ProcessingMode,
    pub contrast_enhancement: bool,
    pub blur_type: BlurType,
    pub clahe_clip_limit: f64,
    pub clahe_tile_size: usize,
    pub gaussian_blur_size: i32,
    pub median_blur_size: i32,
    pub bilateral_d: i32,
    pub bilateral_sigma_color: f64,
    pub bilateral_sigma_space: f64,
    pub background_subtraction: bool,
    pub background_subtraction_method: BackgroundMethod,
    pub background_history: usize,
    pub background_threshold: f64,
    pub background_detect_shadows: bool,
    pub hsv_lower: HsvBound,
    pub hsv_upper: HsvBound,
    pub canny_low_threshold: i32,
    pub canny_high_threshold: i32,
    pub morphology: bool,
    pub morph_kernel_size: i32,
    pub morph_close: bool,
    pub morph_open: bool,
    pub morph_dilation: bool,
    pub morph_erosion: bool,
    pub max_threshold: i32,
    pub convex_hull: bool,
    pub contour_approximation: bool,
    pub contour_filtering: bool,
    pub contour_epsilon_factor: f64,
    pub min_contour_area: f64,
    pub min_contour_solidity: f64,
    pub max_contour_aspect_ratio: f64,
    pub contour_detection_mode: ContourDetectionMode,
    pub permissive_min_area: f64,
    pub permissive_min_solidity: f64,
    pub permissive_max_aspect_ratio: f64,
    pub adaptive_update_interval: usize,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            processing_mode: ProcessingMode::Grayscale,
            contrast_enhancement: false,
            blur_type: BlurType::Gaussian,
            clahe_clip_limit: 2.0,
            clahe_tile_size: 8,
            gaussian_blur_size: 5,
            median_blur_size: 5,
            bilateral_d: 9,
            bilateral_sigma_color: 75.0,
            bilateral_sigma_space: 75.0,
            background_subtraction: false,
            background_subtraction_method: BackgroundMethod::Mog2,
            background_history: 500,
            background_threshold: 16.0,
            background_detect_shadows: true,
            hsv_lower: HsvBound { h: 0, s: 0, v: 0 },
            hsv_upper: HsvBound { h: 179, s: 255, v: 255 },
            canny_low_threshold: 50,
            canny_high_threshold: 150,
            morphology: true,
            morph_kernel_size: 5,
            morph_close: true,
            morph_open: true,
            morph_dilation: false,
            morph_erosion: false,
            max_threshold: 255,
            convex_hull: false,
            contour_approximation: false,
            contour_filtering: true,
            contour_epsilon_factor: 0.02,
            min_contour_area: 100.0,
            min_contour_solidity: 0.2,
            max_contour_aspect_ratio: 5.0,
            contour_detection_mode: ContourDetectionMode::Permissive,
            permissive_min_area: 50.0,
            permissive_min_solidity: 0.1,
            permissive_max_aspect_ratio: 8.0,
            adaptive_update_interval: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    pub max_trajectory_points: usize,
    pub min_trajectory_length: usize,
    pub max_tracking_distance: f64,
    pub smoothing_factor: f64,
    pub min_tracking_confidence: f64,
    pub spatial_merging: bool,
    pub spatial_merge_distance: f64,
    pub spatial_merge_overlap_threshold: f64,
    pub motion_clustering: bool,
    pub motion_similarity_threshold: f64,
    pub motion_history_frames: usize,
    pub enable_classification: bool,
    pub classifier_model_path: Option<PathBuf>,
    pub classifier_labels_path: Option<PathBuf>,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_trajectory_points: 50,
            min_trajectory_length: 5,
            max_tracking_distance: 100.0,
            smoothing_factor: 0.7,
            min_tracking_confidence: 0.2,
            spatial_merging: false,
            spatial_merge_distance: 50.0,
            spatial_merge_overlap_threshold: 0.3,
            motion_clustering: false,
            motion_similarity_threshold: 0.8,
            motion_history_frames: 5,
            enable_classification: false,
            classifier_model_path: None,
            classifier_labels_path: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsolidatorConfig {
    pub eps: f64,
    pub min_pts: usize,
    pub overlap_weight: f64,
    pub edge_weight: f64,
    pub max_edge_distance: f64,
    pub max_frames_without_update: usize,
    pub region_expansion_factor: f64,
    pub frame_width: i32,
    pub frame_height: i32,
}

impl Default for ConsolidatorConfig {
    fn default() -> Self {
        Self {
            eps: 50.0,
            min_pts: 2,
            overlap_weight: 0.7,
            edge_weight: 0.3,
            max_edge_distance: 100.0,
            max_frames_without_update: 10,
            region_expansion_factor: 1.1,
            frame_width: 1920,
            frame_height: 1080,
        }
    }
}

impl ConsolidatorConfig {
    #[must_use]
    pub fn frame_size(&self) -> Size {
        Size::new(self.frame_width, self.frame_height)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub log_level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Top-level configuration handed to each component at construction
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub processor: ProcessorConfig,
    pub tracker: TrackerConfig,
    pub consolidator: ConsolidatorConfig,
    pub logging: LoggingConfig,
}

impl CoreConfig {
    /// Parse and validate a YAML document
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let config: CoreConfig =
            serde_yaml::from_str(text).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a YAML configuration file
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&text)
    }

    /// Reject configurations the pipeline cannot run with. Errors here are
    /// fatal at startup.
    pub fn validate(&self) -> Result<()> {
        let p = &self.processor;

        if p.blur_type == BlurType::Gaussian
            && (p.gaussian_blur_size < 1 || p.gaussian_blur_size % 2 == 0)
        {
            return Err(Error::Config(format!(
                "gaussian_blur_size must be odd and positive, got {}",
                p.gaussian_blur_size
            )));
        }
        if p.blur_type == BlurType::Median
            && (p.median_blur_size < 1 || p.median_blur_size % 2 == 0 || p.median_blur_size > 21)
        {
            return Err(Error::Config(format!(
                "median_blur_size must be odd, positive and <= 21, got {}",
                p.median_blur_size
            )));
        }
        if p.blur_type == BlurType::Bilateral && p.bilateral_d < 1 {
            return Err(Error::Config(format!(
                "bilateral_d must be positive, got {}",
                p.bilateral_d
            )));
        }
        if p.contrast_enhancement && (p.clahe_clip_limit <= 0.0 || p.clahe_tile_size == 0) {
            return Err(Error::Config(
                "CLAHE clip limit and tile size must be positive".to_string(),
            ));
        }
        if p.morphology && p.morph_kernel_size < 1 {
            return Err(Error::Config(format!(
                "morph_kernel_size must be positive, got {}",
                p.morph_kernel_size
            )));
        }
        if p.max_threshold < 1 || p.max_threshold > 255 {
            return Err(Error::Config(format!(
                "max_threshold must be in 1..=255, got {}",
                p.max_threshold
            )));
        }
        if p.hsv_lower.h > p.hsv_upper.h
            || p.hsv_lower.s > p.hsv_upper.s
            || p.hsv_lower.v > p.hsv_upper.v
        {
            return Err(Error::Config("hsv_lower exceeds hsv_upper".to_string()));
        }

        let t = &self.tracker;
        if t.smoothing_factor <= 0.0 || t.smoothing_factor >= 1.0 {
            return Err(Error::Config(format!(
                "smoothing_factor must lie in (0, 1), got {}",
                t.smoothing_factor
            )));
        }
        if !(0.0..=1.0).contains(&t.min_tracking_confidence) {
            return Err(Error::Config(format!(
                "min_tracking_confidence must lie in [0, 1], got {}",
                t.min_tracking_confidence
            )));
        }
        if t.max_trajectory_points == 0 {
            return Err(Error::Config(
                "max_trajectory_points must be positive".to_string(),
            ));
        }
        if t.max_tracking_distance <= 0.0 {
            return Err(Error::Config(
                "max_tracking_distance must be positive".to_string(),
            ));
        }

        let c = &self.consolidator;
        if c.eps <= 0.0 {
            return Err(Error::Config("eps must be positive".to_string()));
        }
        if c.min_pts == 0 {
            return Err(Error::Config("min_pts must be positive".to_string()));
        }
        if c.max_edge_distance <= 0.0 {
            return Err(Error::Config(
                "max_edge_distance must be positive".to_string(),
            ));
        }
        if c.overlap_weight < 0.0 || c.edge_weight < 0.0 {
            return Err(Error::Config(
                "distance weights must be non-negative".to_string(),
            ));
        }
        if c.region_expansion_factor < 1.0 {
            return Err(Error::Config(format!(
                "region_expansion_factor must be >= 1.0, got {}",
                c.region_expansion_factor
            )));
        }
        if c.frame_width < 1 || c.frame_height < 1 {
            return Err(Error::Config("frame size must be positive".to_string()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_is_valid() {
        let config = CoreConfig::from_yaml_str("{}").unwrap();
        assert_eq!(config.processor.processing_mode, ProcessingMode::Grayscale);
        assert_eq!(config.consolidator.min_pts, 2);
        assert!((config.consolidator.eps - 50.0).abs() < 1e-9);
        assert_eq!(config.logging.log_level, "info");
    }

    #[test]
    fn test_parse_sections() {
        let yaml = r"
processor:
  processing_mode: hsv
  blur_type: median
  median_blur_size: 7
  background_subtraction: true
  background_subtraction_method: KNN
tracker:
  max_tracking_distance: 80.0
  spatial_merging: true
consolidator:
  eps: 90.0
  min_pts: 3
";
        let config = CoreConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.processor.processing_mode, ProcessingMode::Hsv);
        assert_eq!(config.processor.blur_type, BlurType::Median);
        assert_eq!(config.processor.median_blur_size, 7);
        assert_eq!(
            config.processor.background_subtraction_method,
            BackgroundMethod::Knn
        );
        assert!(config.tracker.spatial_merging);
        assert_eq!(config.consolidator.min_pts, 3);
    }

    #[test]
    fn test_even_gaussian_kernel_rejected() {
        let yaml = "processor:\n  gaussian_blur_size: 4\n";
        assert!(matches!(
            CoreConfig::from_yaml_str(yaml),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_unknown_mode_rejected() {
        let yaml = "processor:\n  processing_mode: sepia\n";
        assert!(CoreConfig::from_yaml_str(yaml).is_err());
    }

    #[test]
    fn test_smoothing_factor_bounds() {
        let yaml = "tracker:\n  smoothing_factor: 1.5\n";
        assert!(CoreConfig::from_yaml_str(yaml).is_err());

        let yaml = "tracker:\n  smoothing_factor: 0.0\n";
        assert!(CoreConfig::from_yaml_str(yaml).is_err());
    }

    #[test]
    fn test_inverted_hsv_range_rejected() {
        let yaml = "processor:\n  hsv_lower: {h: 100, s: 0, v: 0}\n  hsv_upper: {h: 50, s: 255, v: 255}\n";
        assert!(CoreConfig::from_yaml_str(yaml).is_err());
    }

    #[test]
    fn test_round_trip() {
        let config = CoreConfig::default();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed = CoreConfig::from_yaml_str(&yaml).unwrap();
        assert_eq!(parsed.processor.min_contour_area, config.processor.min_contour_area);
    }
}
