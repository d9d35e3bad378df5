pub mod consolidator;
pub mod pipeline;
pub mod processor;
pub mod tracker;

pub use consolidator::{ConsolidatedRegion, RegionConsolidator};
pub use pipeline::{process_frame_and_consolidate, FrameOutput, MotionPipeline};
pub use processor::{MotionProcessor, ProcessingResult};
pub use tracker::{ObjectTracker, TrackedObject, TrackingResult};
