//! End-to-end scenarios for the frame-to-regions pipeline.

use motion_regions::config::{BlurType, CoreConfig, HsvBound, ProcessingMode};
use motion_regions::core::{Frame, Rect, Scalar};
use motion_regions::motion::{MotionPipeline, MotionProcessor, ObjectTracker, RegionConsolidator};

fn quiet_processor_config() -> CoreConfig {
    let mut config = CoreConfig::default();
    config.processor.blur_type = BlurType::None;
    config.processor.morphology = false;
    config.processor.contour_filtering = false;
    config.processor.permissive_min_area = 50.0;
    config
}

fn gray_frame(rows: usize, cols: usize) -> Frame {
    Frame::new(rows, cols, 1).unwrap()
}

fn with_square(mut frame: Frame, rect: Rect, value: u8) -> Frame {
    for row in rect.y..rect.y + rect.height {
        for col in rect.x..rect.x + rect.width {
            frame.at_mut(row as usize, col as usize).unwrap()[0] = value;
        }
    }
    frame
}

// --- MotionProcessor properties ---

#[test]
fn first_frame_never_reports_motion() {
    let config = quiet_processor_config();
    for frame in [
        gray_frame(480, 640),
        with_square(gray_frame(480, 640), Rect::new(10, 10, 100, 100), 200),
        Frame::filled(240, 320, 3, Scalar::all(77.0)).unwrap(),
    ] {
        let mut processor = MotionProcessor::new(config.processor.clone()).unwrap();
        let result = processor.process_frame(&frame);
        assert!(!result.has_motion);
        assert!(result.candidate_bounds.is_empty());
    }
}

#[test]
fn static_input_is_idempotent() {
    let mut processor = MotionProcessor::new(quiet_processor_config().processor).unwrap();
    let frame = with_square(gray_frame(480, 640), Rect::new(50, 50, 80, 80), 180);

    for _ in 0..10 {
        let result = processor.process_frame(&frame);
        assert!(!result.has_motion);
    }
}

#[test]
fn empty_input_is_a_no_op() {
    let mut processor = MotionProcessor::new(quiet_processor_config().processor).unwrap();
    let result = processor.process_frame(&Frame::new(0, 0, 1).unwrap());
    assert!(!result.has_motion);
    assert!(result.candidate_bounds.is_empty());
    assert!(processor.is_first_frame());
}

#[test]
fn candidate_bounds_are_clipped() {
    let mut processor = MotionProcessor::new(quiet_processor_config().processor).unwrap();
    processor.process_frame(&gray_frame(200, 200));

    // Blobs hugging every border
    let mut lit = gray_frame(200, 200);
    for rect in [
        Rect::new(0, 0, 30, 30),
        Rect::new(170, 0, 30, 30),
        Rect::new(0, 170, 30, 30),
        Rect::new(170, 170, 30, 30),
    ] {
        lit = with_square(lit, rect, 255);
    }

    let result = processor.process_frame(&lit);
    assert!(result.has_motion);
    let frame_rect = Rect::new(0, 0, 200, 200);
    for bounds in &result.candidate_bounds {
        assert_eq!(bounds.intersection(&frame_rect), *bounds, "{bounds:?} escapes");
    }
}

// --- Scenario: single moving square ---

#[test]
fn single_moving_square() {
    let config = quiet_processor_config();
    let mut processor = MotionProcessor::new(config.processor.clone()).unwrap();
    let mut tracker = ObjectTracker::new(config.tracker.clone());

    let dark = gray_frame(480, 640);
    let first = processor.process_frame(&dark);
    assert!(!first.has_motion);
    tracker.track(&first.candidate_bounds, &dark);

    let lit = with_square(gray_frame(480, 640), Rect::new(100, 100, 50, 50), 255);
    let second = processor.process_frame(&lit);

    assert!(second.has_motion);
    assert_eq!(second.candidate_bounds.len(), 1);
    let b = second.candidate_bounds[0];
    assert!((b.x - 100).abs() <= 5, "x = {}", b.x);
    assert!((b.y - 100).abs() <= 5, "y = {}", b.y);
    assert!((b.width - 50).abs() <= 5, "width = {}", b.width);
    assert!((b.height - 50).abs() <= 5, "height = {}", b.height);

    let tracking = tracker.track(&second.candidate_bounds, &lit);
    assert_eq!(tracking.tracked.len(), 1);
    assert_eq!(tracking.tracked[0].id, 0);
    assert_eq!(tracking.tracked[0].trajectory.len(), 1);
    assert!((tracking.tracked[0].confidence - 0.5).abs() < 1e-9);
    assert!(tracking.lost_ids.is_empty());
}

// --- Scenario: two close blobs consolidate into one region ---

#[test]
fn two_close_blobs_one_region() {
    let mut config = CoreConfig::default();
    config.tracker.max_tracking_distance = 80.0;
    config.consolidator.eps = 120.0;
    config.consolidator.min_pts = 2;
    config.consolidator.frame_width = 640;
    config.consolidator.frame_height = 480;

    let mut tracker = ObjectTracker::new(config.tracker.clone());
    let mut consolidator = RegionConsolidator::new(config.consolidator.clone());
    let frame = gray_frame(480, 640);

    let bounds = [Rect::new(100, 100, 50, 50), Rect::new(200, 100, 50, 50)];

    let mut regions = Vec::new();
    for _ in 0..config.tracker.min_trajectory_length.max(2) {
        let tracking = tracker.track(&bounds, &frame);
        regions = consolidator.consolidate(&tracking.tracked).to_vec();
    }

    assert_eq!(regions.len(), 1);
    assert_eq!(regions[0].member_ids.len(), 2);

    // Cluster box (100,100,150,50) expanded by the configured factor, clipped
    let cluster_box = Rect::new(100, 100, 150, 50);
    let bbox = regions[0].bounding_box;
    assert!(bbox.intersection(&cluster_box) == cluster_box, "{bbox:?}");
    let factor = config.consolidator.region_expansion_factor;
    assert!(f64::from(bbox.width) <= f64::from(cluster_box.width) * factor + 2.0);
    assert!(f64::from(bbox.height) <= f64::from(cluster_box.height) * factor + 2.0);
}

// --- Scenario: lost recovery and staleness ---

#[test]
fn lost_id_emitted_once_then_region_goes_stale() {
    let mut config = CoreConfig::default();
    config.consolidator.min_pts = 1;
    config.consolidator.max_frames_without_update = 4;

    let mut tracker = ObjectTracker::new(config.tracker.clone());
    let mut consolidator = RegionConsolidator::new(config.consolidator.clone());
    let frame = gray_frame(480, 640);
    let bounds = [Rect::new(100, 100, 50, 50)];

    for _ in 0..15 {
        let tracking = tracker.track(&bounds, &frame);
        consolidator.consolidate(&tracking.tracked);
    }
    assert_eq!(consolidator.regions().len(), 1);
    let lost_id = tracker.tracked()[0].id;

    // First empty frame: the tracker is reported lost exactly once
    let tracking = tracker.track(&[], &frame);
    assert_eq!(tracking.lost_ids, vec![lost_id]);
    consolidator.consolidate(&tracking.tracked);

    let tracking = tracker.track(&[], &frame);
    assert!(tracking.lost_ids.is_empty());
    consolidator.consolidate(&tracking.tracked);

    // Region outlives the tracker until it exceeds the staleness budget
    assert_eq!(consolidator.regions().len(), 1);
    for _ in 0..3 {
        consolidator.consolidate(&[]);
    }
    assert!(consolidator.regions().is_empty());
}

// --- Scenario: spatial merge on and off ---

#[test]
fn spatial_merge_fuses_close_bounds() {
    let frame = gray_frame(480, 640);
    let bounds = [Rect::new(100, 100, 40, 40), Rect::new(130, 110, 40, 40)];

    let mut config = CoreConfig::default();
    config.tracker.spatial_merging = true;
    config.tracker.spatial_merge_distance = 40.0;
    let mut merging = ObjectTracker::new(config.tracker.clone());

    for _ in 0..5 {
        let tracking = merging.track(&bounds, &frame);
        assert_eq!(tracking.tracked.len(), 1);
        assert_eq!(tracking.tracked[0].current_bounds, Rect::new(100, 100, 70, 50));
    }

    let mut config = CoreConfig::default();
    config.tracker.spatial_merging = false;
    config.tracker.max_tracking_distance = 20.0;
    let mut plain = ObjectTracker::new(config.tracker.clone());

    for _ in 0..5 {
        let tracking = plain.track(&bounds, &frame);
        assert_eq!(tracking.tracked.len(), 2);
    }
}

// --- Scenario: HSV full-match ---

#[test]
fn hsv_full_match_yields_full_frame() {
    let mut config = quiet_processor_config();
    config.processor.processing_mode = ProcessingMode::Hsv;
    config.processor.hsv_lower = HsvBound { h: 0, s: 0, v: 60 };
    config.processor.hsv_upper = HsvBound { h: 179, s: 255, v: 255 };

    let mut processor = MotionProcessor::new(config.processor).unwrap();

    // Start black (value below the range), then switch to an in-range color
    let black = Frame::new(120, 160, 3).unwrap();
    processor.process_frame(&black);

    let colored = Frame::filled(120, 160, 3, Scalar::all(150.0)).unwrap();
    let result = processor.process_frame(&colored);

    assert!(result.processed.data().iter().all(|&v| v == 255));
    assert!(result.has_motion);
    assert_eq!(result.candidate_bounds, vec![Rect::new(0, 0, 160, 120)]);
}

// --- Full pipeline sanity ---

#[test]
fn pipeline_tracks_and_consolidates_motion() {
    let mut config = quiet_processor_config();
    config.consolidator.min_pts = 1;
    let mut pipeline = MotionPipeline::new(&config).unwrap();

    let output = pipeline.process(&gray_frame(480, 640));
    assert!(!output.processing.has_motion);

    // A blob appears, then keeps flickering so the diff stays non-zero
    for step in 0..6 {
        let value = if step % 2 == 0 { 255 } else { 200 };
        let lit = with_square(gray_frame(480, 640), Rect::new(100, 100, 60, 60), value);
        let output = pipeline.process(&lit);
        assert!(output.processing.has_motion, "step {step}");
        assert!(!output.tracked.is_empty(), "step {step}");
        assert!(!output.regions.is_empty(), "step {step}");
    }
}

#[test]
fn pipeline_survives_size_changes() {
    let config = quiet_processor_config();
    let mut pipeline = MotionPipeline::new(&config).unwrap();

    pipeline.process(&gray_frame(480, 640));
    pipeline.process(&gray_frame(240, 320));
    let output = pipeline.process(&with_square(
        gray_frame(240, 320),
        Rect::new(50, 50, 40, 40),
        255,
    ));
    assert!(output.processing.has_motion);
}
