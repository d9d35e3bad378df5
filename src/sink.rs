//! Interfaces to external collaborators: the artifact sink consuming
//! per-frame output, and the optional object classifier.

use crate::core::types::{Point, Rect};
use crate::core::Frame;
use crate::error::Result;
use crate::motion::consolidator::ConsolidatedRegion;
use chrono::{DateTime, Utc};

/// Classification payload attached to a tracker by an external classifier
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub label: String,
    pub confidence: f32,
    pub class_id: i32,
}

impl Classification {
    /// The fallback used when no classifier is attached or a call fails
    #[must_use]
    pub fn unknown() -> Self {
        Self {
            label: "unknown".to_string(),
            confidence: 0.0,
            class_id: -1,
        }
    }
}

/// Synchronous object classifier over a cropped frame
pub trait Classifier {
    fn classify(&self, crop: &Frame) -> Result<Classification>;
}

/// Per-frame bookkeeping handed to the sink alongside the artifacts
#[derive(Debug, Clone)]
pub struct FrameMetadata {
    pub frame_index: u64,
    pub timestamp: DateTime<Utc>,
    pub has_motion: bool,
    pub tracker_count: usize,
    pub region_count: usize,
}

/// One tracker's per-frame record for the sink
#[derive(Debug)]
pub struct TrackingUpdate<'a> {
    pub tracker_id: u64,
    pub uuid: &'a str,
    pub crop: &'a Frame,
    pub bounds: Rect,
    pub trajectory_point: Point,
    pub confidence: f64,
    pub class_info: Option<&'a Classification>,
}

/// Downstream consumer of per-frame artifacts (persistence, rendering,
/// classification queues). Implemented externally; the pipeline only calls.
pub trait FrameSink {
    /// Called once per live tracker per frame, once its trajectory is long
    /// enough to be worth persisting
    fn on_tracking_data(&mut self, update: &TrackingUpdate<'_>);

    /// Called exactly once per lost tracker id
    fn on_object_lost(&mut self, tracker_id: u64);

    /// Called once per processed frame
    fn on_frame_artifacts(
        &mut self,
        original: &Frame,
        annotated: &Frame,
        regions: &[ConsolidatedRegion],
        metadata: &FrameMetadata,
    );
}

/// A sink that discards everything
#[derive(Debug, Default)]
pub struct NullSink;

impl FrameSink for NullSink {
    fn on_tracking_data(&mut self, _update: &TrackingUpdate<'_>) {}

    fn on_object_lost(&mut self, _tracker_id: u64) {}

    fn on_frame_artifacts(
        &mut self,
        _original: &Frame,
        _annotated: &Frame,
        _regions: &[ConsolidatedRegion],
        _metadata: &FrameMetadata,
    ) {
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_classification() {
        let c = Classification::unknown();
        assert_eq!(c.label, "unknown");
        assert_eq!(c.confidence, 0.0);
        assert_eq!(c.class_id, -1);
    }
}
