//! # motion-regions
//!
//! A real-time motion-detection and region-consolidation engine. Each video
//! frame flows through three stages:
//!
//! 1. [`motion::MotionProcessor`] finds pixels that changed relative to a
//!    recent background and reduces them to candidate bounding rectangles.
//! 2. [`motion::ObjectTracker`] assigns the candidates stable identities
//!    across frames, smoothing trajectories and decaying confidence.
//! 3. [`motion::RegionConsolidator`] clusters spatially related trackers
//!    (DBSCAN with an overlap-aware metric) into few stable, expanded
//!    regions sized for a downstream detector.
//!
//! [`motion::MotionPipeline`] threads the stages over one frame at a time
//! and hands artifacts to an externally implemented [`sink::FrameSink`].
//!
//! ## Example
//!
//! ```rust
//! use motion_regions::config::CoreConfig;
//! use motion_regions::motion::MotionPipeline;
//! use motion_regions::prelude::*;
//!
//! # fn main() -> motion_regions::error::Result<()> {
//! let config = CoreConfig::default();
//! let mut pipeline = MotionPipeline::new(&config)?;
//!
//! let frame = Frame::new(480, 640, 1)?;
//! let output = pipeline.process(&frame);
//! assert!(!output.processing.has_motion); // first frame is always quiet
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod imgcodecs;
pub mod imgproc;
pub mod motion;
pub mod sink;
pub mod video;

pub mod prelude {
    //! Convenience re-exports of the most commonly used items
    pub use crate::config::CoreConfig;
    pub use crate::core::{Frame, Point, Rect, Scalar, Size};
    pub use crate::error::{Error, Result};
    pub use crate::motion::{
        ConsolidatedRegion, MotionPipeline, MotionProcessor, ObjectTracker, RegionConsolidator,
        TrackedObject,
    };
    pub use crate::sink::{Classification, Classifier, FrameSink};
}
