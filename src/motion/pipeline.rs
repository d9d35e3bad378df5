//! Threads the three stages over one frame and feeds the sink.

use chrono::Utc;
use tracing::debug;

use crate::config::CoreConfig;
use crate::core::types::Scalar;
use crate::core::Frame;
use crate::error::Result;
use crate::imgproc::drawing;
use crate::imgproc::{cvt_color, ColorConversionCode};
use crate::motion::consolidator::{ConsolidatedRegion, RegionConsolidator};
use crate::motion::processor::{MotionProcessor, ProcessingResult};
use crate::motion::tracker::{ObjectTracker, TrackedObject};
use crate::sink::{Classifier, FrameMetadata, FrameSink, TrackingUpdate};

/// Everything one frame produced
#[derive(Debug)]
pub struct FrameOutput {
    pub processing: ProcessingResult,
    pub tracked: Vec<TrackedObject>,
    pub lost_ids: Vec<u64>,
    pub regions: Vec<ConsolidatedRegion>,
}

/// The full per-frame pipeline: processor -> tracker -> consolidator,
/// with optional sink notification. Owns no state beyond its stages.
pub struct MotionPipeline {
    processor: MotionProcessor,
    tracker: ObjectTracker,
    consolidator: RegionConsolidator,
    sink: Option<Box<dyn FrameSink>>,
    frame_index: u64,
}

impl MotionPipeline {
    pub fn new(config: &CoreConfig) -> Result<Self> {
        Ok(Self {
            processor: MotionProcessor::new(config.processor.clone())?,
            tracker: ObjectTracker::new(config.tracker.clone()),
            consolidator: RegionConsolidator::new(config.consolidator.clone()),
            sink: None,
            frame_index: 0,
        })
    }

    pub fn with_sink(mut self, sink: Box<dyn FrameSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_classifier(mut self, classifier: Box<dyn Classifier>) -> Self {
        self.tracker = self.tracker.with_classifier(classifier);
        self
    }

    #[must_use]
    pub fn tracker(&self) -> &ObjectTracker {
        &self.tracker
    }

    #[must_use]
    pub fn regions(&self) -> &[ConsolidatedRegion] {
        self.consolidator.regions()
    }

    /// Run one frame through all three stages in order.
    pub fn process(&mut self, frame: &Frame) -> FrameOutput {
        self.frame_index += 1;

        let processing = self.processor.process_frame(frame);
        let tracking = self.tracker.track(&processing.candidate_bounds, frame);

        self.consolidator.set_frame_size(frame.size());
        let regions = self.consolidator.consolidate(&tracking.tracked).to_vec();

        debug!(
            frame = self.frame_index,
            bounds = processing.candidate_bounds.len(),
            tracked = tracking.tracked.len(),
            lost = tracking.lost_ids.len(),
            regions = regions.len(),
            "Pipeline step"
        );

        if self.sink.is_some() {
            self.notify_sink(frame, &processing, &tracking.tracked, &tracking.lost_ids, &regions);
        }

        FrameOutput {
            processing,
            tracked: tracking.tracked,
            lost_ids: tracking.lost_ids,
            regions,
        }
    }

    fn notify_sink(
        &mut self,
        frame: &Frame,
        processing: &ProcessingResult,
        tracked: &[TrackedObject],
        lost_ids: &[u64],
        regions: &[ConsolidatedRegion],
    ) {
        let min_trajectory = self.tracker.min_trajectory_length();
        let Some(sink) = self.sink.as_mut() else {
            return;
        };

        for obj in tracked {
            if obj.trajectory.len() < min_trajectory {
                continue;
            }
            let bounds = obj.current_bounds.clip_to(frame.size());
            let Ok(crop) = frame.roi(bounds) else {
                continue;
            };
            let trajectory_point = *obj.trajectory.back().unwrap_or(&obj.smoothed_center);

            sink.on_tracking_data(&TrackingUpdate {
                tracker_id: obj.id,
                uuid: &obj.uuid,
                crop: &crop,
                bounds,
                trajectory_point,
                confidence: obj.confidence,
                class_info: self.tracker.classification_of(obj.id),
            });
        }

        for &id in lost_ids {
            sink.on_object_lost(id);
        }

        let annotated = annotate(frame, tracked, regions);
        let metadata = FrameMetadata {
            frame_index: self.frame_index,
            timestamp: Utc::now(),
            has_motion: processing.has_motion,
            tracker_count: tracked.len(),
            region_count: regions.len(),
        };
        sink.on_frame_artifacts(frame, &annotated, regions, &metadata);
    }
}

/// Draw tracker bounds, trajectories and region boxes on a copy of the frame
fn annotate(frame: &Frame, tracked: &[TrackedObject], regions: &[ConsolidatedRegion]) -> Frame {
    let mut annotated = if frame.channels() == 3 {
        frame.clone()
    } else {
        let mut rgb = Frame::new(1, 1, 1).unwrap_or_else(|_| frame.clone());
        if cvt_color(frame, &mut rgb, ColorConversionCode::GrayToRgb).is_ok() {
            rgb
        } else {
            frame.clone()
        }
    };

    for obj in tracked {
        let color = tracker_color(obj.id);
        let _ = drawing::rectangle(&mut annotated, obj.current_bounds, color);
        let points: Vec<_> = obj.trajectory.iter().copied().collect();
        let _ = drawing::polylines(&mut annotated, &points, color);
    }
    for region in regions {
        let _ = drawing::rectangle(&mut annotated, region.bounding_box, Scalar::from_rgb(255, 255, 255));
    }

    annotated
}

/// Cycle through a fixed palette by tracker id
fn tracker_color(id: u64) -> Scalar {
    const COLORS: [(u8, u8, u8); 6] = [
        (0, 255, 0),
        (0, 0, 255),
        (255, 0, 0),
        (0, 255, 255),
        (255, 0, 255),
        (255, 255, 0),
    ];
    let (r, g, b) = COLORS[(id % COLORS.len() as u64) as usize];
    Scalar::from_rgb(r, g, b)
}

/// Tracker-less adapter: run the processor, wrap its candidate bounds in
/// provisional trackers and consolidate them directly.
pub fn process_frame_and_consolidate(
    processor: &mut MotionProcessor,
    consolidator: &mut RegionConsolidator,
    next_provisional_id: &mut u64,
    frame: &Frame,
) -> (ProcessingResult, Vec<ConsolidatedRegion>) {
    let processing = processor.process_frame(frame);

    let mut provisional = Vec::with_capacity(processing.candidate_bounds.len());
    for &bounds in &processing.candidate_bounds {
        provisional.push(provisional_tracker(*next_provisional_id, bounds));
        *next_provisional_id += 1;
    }

    consolidator.set_frame_size(frame.size());
    let regions = consolidator.consolidate(&provisional).to_vec();
    (processing, regions)
}

fn provisional_tracker(id: u64, bounds: crate::core::types::Rect) -> TrackedObject {
    let center = bounds.center();
    let mut trajectory = std::collections::VecDeque::new();
    trajectory.push_back(center);
    TrackedObject {
        id,
        uuid: format!("provisional-{id}"),
        current_bounds: bounds,
        trajectory,
        smoothed_center: center,
        confidence: 0.5,
        frames_without_detection: 0,
        first_seen: Utc::now(),
    }
}
