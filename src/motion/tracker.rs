//! Multi-object tracker: identity assignment, trajectory smoothing,
//! confidence decay and lost-object reporting.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::TrackerConfig;
use crate::core::types::{Point, Rect};
use crate::core::Frame;
use crate::sink::{Classification, Classifier};

/// Identity record for one moving blob
#[derive(Debug, Clone)]
pub struct TrackedObject {
    pub id: u64,
    pub uuid: String,
    pub current_bounds: Rect,
    pub trajectory: VecDeque<Point>,
    pub smoothed_center: Point,
    pub confidence: f64,
    pub frames_without_detection: u32,
    pub first_seen: DateTime<Utc>,
}

impl TrackedObject {
    fn new(id: u64, bounds: Rect) -> Self {
        let center = bounds.center();
        let mut trajectory = VecDeque::new();
        trajectory.push_back(center);

        Self {
            id,
            uuid: Uuid::new_v4().to_string(),
            current_bounds: bounds,
            trajectory,
            smoothed_center: center,
            confidence: 0.5,
            frames_without_detection: 0,
            first_seen: Utc::now(),
        }
    }

    #[must_use]
    pub fn center(&self) -> Point {
        self.current_bounds.center()
    }
}

/// Output of one `track` call
#[derive(Debug, Clone, Default)]
pub struct TrackingResult {
    pub tracked: Vec<TrackedObject>,
    pub lost_ids: Vec<u64>,
}

/// Stateful tracker: gives each moving blob a stable identity across frames.
pub struct ObjectTracker {
    config: TrackerConfig,
    tracked: Vec<TrackedObject>,
    lost_ids: Vec<u64>,
    previous_bounds: VecDeque<Vec<Rect>>,
    classifications: HashMap<u64, Classification>,
    classifier: Option<Box<dyn Classifier>>,
    next_id: u64,
}

impl ObjectTracker {
    #[must_use]
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            tracked: Vec::new(),
            lost_ids: Vec::new(),
            previous_bounds: VecDeque::new(),
            classifications: HashMap::new(),
            classifier: None,
            next_id: 0,
        }
    }

    /// Attach an external classifier invoked on each newly created tracker
    pub fn with_classifier(mut self, classifier: Box<dyn Classifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    /// Match candidate bounds against the live tracker set for one frame.
    pub fn track(&mut self, bounds: &[Rect], frame: &Frame) -> TrackingResult {
        self.lost_ids.clear();

        let mut bounds = bounds.to_vec();
        if self.config.spatial_merging {
            bounds = self.merge_spatial_overlaps(&bounds);
        }
        if self.config.motion_clustering {
            bounds = self.cluster_by_motion(&bounds);
        }

        self.update_trajectories(&bounds, frame);
        self.push_bounds_history(bounds);

        TrackingResult {
            tracked: self.tracked.clone(),
            lost_ids: self.lost_ids.clone(),
        }
    }

    #[must_use]
    pub fn find_by_id(&self, id: u64) -> Option<&TrackedObject> {
        self.tracked.iter().find(|obj| obj.id == id)
    }

    /// Classification attached to a tracker, if any
    #[must_use]
    pub fn classification_of(&self, id: u64) -> Option<&Classification> {
        self.classifications.get(&id)
    }

    #[must_use]
    pub fn tracked(&self) -> &[TrackedObject] {
        &self.tracked
    }

    #[must_use]
    pub fn lost_ids(&self) -> &[u64] {
        &self.lost_ids
    }

    #[must_use]
    pub fn min_trajectory_length(&self) -> usize {
        self.config.min_trajectory_length
    }

    /// Clear the lost-id list (test seeding)
    pub fn clear_lost(&mut self) {
        self.lost_ids.clear();
    }

    /// Replace the tracker set (test seeding)
    pub fn set_tracked(&mut self, objects: Vec<TrackedObject>) {
        self.next_id = objects
            .iter()
            .map(|o| o.id + 1)
            .max()
            .unwrap_or(self.next_id)
            .max(self.next_id);
        self.tracked = objects;
    }

    /// Read access to the bounded bounds history (test seeding)
    #[must_use]
    pub fn bounds_history(&self) -> &VecDeque<Vec<Rect>> {
        &self.previous_bounds
    }

    /// Iteratively merge rectangles that are close or strongly overlapping
    /// until a fixed point is reached.
    fn merge_spatial_overlaps(&self, bounds: &[Rect]) -> Vec<Rect> {
        if bounds.is_empty() {
            return Vec::new();
        }

        let mut merged_bounds = bounds.to_vec();
        let mut merged = true;

        while merged {
            merged = false;
            let mut next = Vec::with_capacity(merged_bounds.len());
            let mut used = vec![false; merged_bounds.len()];

            for i in 0..merged_bounds.len() {
                if used[i] {
                    continue;
                }
                let mut current = merged_bounds[i];
                used[i] = true;

                for j in i + 1..merged_bounds.len() {
                    if used[j] {
                        continue;
                    }
                    let other = merged_bounds[j];

                    let distance = f64::from(current.center().x - other.center().x)
                        .hypot(f64::from(current.center().y - other.center().y));
                    let overlap = current.overlap_ratio(&other);

                    if distance <= self.config.spatial_merge_distance
                        || overlap >= self.config.spatial_merge_overlap_threshold
                    {
                        current = current.union_with(&other);
                        used[j] = true;
                        merged = true;
                        debug!("Merged bounding boxes: distance={distance:.1}, overlap={overlap:.2}");
                    }
                }

                next.push(current);
            }

            merged_bounds = next;
        }

        merged_bounds
    }

    /// Group rectangles whose displacement vectors (vs the previous frame's
    /// accepted bounds) point the same way, merging each group.
    fn cluster_by_motion(&self, bounds: &[Rect]) -> Vec<Rect> {
        let Some(prev_bounds) = self.previous_bounds.back() else {
            return bounds.to_vec();
        };
        if bounds.is_empty() || prev_bounds.is_empty() {
            return bounds.to_vec();
        }

        let mut used = vec![false; bounds.len()];
        let mut final_bounds = Vec::with_capacity(bounds.len());

        for i in 0..bounds.len() {
            if used[i] {
                continue;
            }
            used[i] = true;
            let mut group = bounds[i];

            let motion_i = motion_vector(&bounds[i], &closest_rect(&bounds[i], prev_bounds));

            for j in i + 1..bounds.len() {
                if used[j] {
                    continue;
                }
                let motion_j = motion_vector(&bounds[j], &closest_rect(&bounds[j], prev_bounds));
                let similarity = cosine_similarity(motion_i, motion_j);

                if similarity >= self.config.motion_similarity_threshold {
                    group = group.union_with(&bounds[j]);
                    used[j] = true;
                    debug!("Motion clustering: similarity={similarity:.2}");
                }
            }

            final_bounds.push(group);
        }

        final_bounds
    }

    fn update_trajectories(&mut self, bounds: &[Rect], frame: &Frame) {
        // Only pre-existing trackers participate in the removal sweep;
        // trackers created below always survive their creation frame.
        let mut matched = vec![false; self.tracked.len()];
        let preexisting = self.tracked.len();

        for &rect in bounds {
            let center = rect.center();

            match self.find_nearest_index(center) {
                Some(idx) => {
                    if idx < preexisting {
                        matched[idx] = true;
                    }
                    let alpha = self.config.smoothing_factor;
                    let max_points = self.config.max_trajectory_points;
                    let obj = &mut self.tracked[idx];

                    obj.current_bounds = rect;
                    obj.frames_without_detection = 0;

                    #[allow(clippy::cast_possible_truncation)]
                    let smoothed = Point::new(
                        (f64::from(obj.smoothed_center.x) * alpha
                            + f64::from(center.x) * (1.0 - alpha)) as i32,
                        (f64::from(obj.smoothed_center.y) * alpha
                            + f64::from(center.y) * (1.0 - alpha)) as i32,
                    );
                    obj.smoothed_center = smoothed;
                    obj.trajectory.push_back(smoothed);
                    while obj.trajectory.len() > max_points {
                        obj.trajectory.pop_front();
                    }

                    // Consistent motion raises confidence, erratic motion
                    // lowers it; stationary objects hold the midpoint.
                    if obj.trajectory.len() >= 3 {
                        let n = obj.trajectory.len();
                        let v_prev = obj.trajectory[n - 2] - obj.trajectory[n - 3];
                        let v_curr = obj.trajectory[n - 1] - obj.trajectory[n - 2];
                        let similarity = stabilized_cosine(v_prev, v_curr);
                        obj.confidence = 0.7 * obj.confidence + 0.3 * (similarity + 1.0) / 2.0;
                    } else {
                        obj.confidence = 0.5;
                    }
                }
                None => {
                    let id = self.next_id;
                    self.next_id += 1;
                    let obj = TrackedObject::new(id, rect);
                    debug!("Created tracker {} at {:?}", id, rect);

                    if self.config.enable_classification {
                        let classification = self.classify_crop(frame, rect);
                        self.classifications.insert(id, classification);
                    }
                    self.tracked.push(obj);
                }
            }
        }

        // Remove unmatched or low-confidence trackers, reporting each id once
        let min_confidence = self.config.min_tracking_confidence;
        for i in (0..preexisting).rev() {
            let remove = !matched[i] || self.tracked[i].confidence < min_confidence;
            if remove {
                let obj = self.tracked.remove(i);
                debug!(
                    "Lost tracker {} (matched: {}, confidence: {:.2})",
                    obj.id, matched[i], obj.confidence
                );
                self.classifications.remove(&obj.id);
                self.lost_ids.push(obj.id);
            }
        }
    }

    /// Index of the live tracker nearest to `center`, if within
    /// `max_tracking_distance` (inclusive). The tracker list is in creation
    /// order, so equal distances resolve to the lower id.
    fn find_nearest_index(&self, center: Point) -> Option<usize> {
        let mut best_idx = None;
        let mut best_dist = f64::MAX;

        for (idx, obj) in self.tracked.iter().enumerate() {
            let distance = center.distance_to(obj.center());
            if distance <= self.config.max_tracking_distance && distance < best_dist {
                best_dist = distance;
                best_idx = Some(idx);
            }
        }

        best_idx
    }

    fn classify_crop(&self, frame: &Frame, bounds: Rect) -> Classification {
        let Some(classifier) = &self.classifier else {
            return Classification::unknown();
        };

        let safe = bounds.clip_to(frame.size());
        if safe.is_empty() {
            return Classification::unknown();
        }

        match frame.roi(safe) {
            Ok(crop) => match classifier.classify(&crop) {
                Ok(classification) => classification,
                Err(e) => {
                    warn!("Classifier failed: {e}");
                    Classification::unknown()
                }
            },
            Err(e) => {
                warn!("Crop failed: {e}");
                Classification::unknown()
            }
        }
    }

    fn push_bounds_history(&mut self, bounds: Vec<Rect>) {
        while self.previous_bounds.len() >= self.config.motion_history_frames.max(1) {
            self.previous_bounds.pop_front();
        }
        self.previous_bounds.push_back(bounds);
    }
}

fn motion_vector(current: &Rect, previous: &Rect) -> Point {
    current.center() - previous.center()
}

fn closest_rect(current: &Rect, candidates: &[Rect]) -> Rect {
    let mut closest = *current;
    let mut min_distance = f64::MAX;

    for rect in candidates {
        let distance = current.center().distance_to(rect.center());
        if distance < min_distance {
            min_distance = distance;
            closest = *rect;
        }
    }

    closest
}

fn cosine_similarity(a: Point, b: Point) -> f64 {
    let dot = f64::from(a.x * b.x + a.y * b.y);
    let mag_a = f64::from(a.x * a.x + a.y * a.y).sqrt();
    let mag_b = f64::from(b.x * b.x + b.y * b.y).sqrt();
    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }
    dot / (mag_a * mag_b)
}

/// Cosine with +1 in the magnitude terms so zero-length displacements
/// yield 0 instead of NaN
fn stabilized_cosine(a: Point, b: Point) -> f64 {
    let dot = f64::from(a.x * b.x + a.y * b.y);
    let mag_a = f64::from(a.x * a.x + a.y * a.y + 1).sqrt();
    let mag_b = f64::from(b.x * b.x + b.y * b.y + 1).sqrt();
    dot / (mag_a * mag_b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Error, Result};

    fn test_config() -> TrackerConfig {
        TrackerConfig {
            max_tracking_distance: 50.0,
            min_tracking_confidence: 0.2,
            min_trajectory_length: 3,
            max_trajectory_points: 10,
            ..TrackerConfig::default()
        }
    }

    fn dummy_frame() -> Frame {
        Frame::new(480, 640, 1).unwrap()
    }

    #[test]
    fn test_new_tracker_created() {
        let mut tracker = ObjectTracker::new(test_config());
        let result = tracker.track(&[Rect::new(100, 100, 50, 50)], &dummy_frame());

        assert_eq!(result.tracked.len(), 1);
        assert_eq!(result.tracked[0].id, 0);
        assert_eq!(result.tracked[0].trajectory.len(), 1);
        assert!((result.tracked[0].confidence - 0.5).abs() < 1e-9);
        assert!(result.lost_ids.is_empty());
    }

    #[test]
    fn test_identity_stable_across_frames() {
        let mut tracker = ObjectTracker::new(test_config());
        let rect = Rect::new(100, 100, 50, 50);

        for k in 1..=8 {
            let result = tracker.track(&[rect], &dummy_frame());
            assert_eq!(result.tracked.len(), 1, "frame {k}");
            assert_eq!(result.tracked[0].id, 0);
            assert_eq!(result.tracked[0].trajectory.len(), k.min(10));
        }
    }

    #[test]
    fn test_trajectory_capped() {
        let mut config = test_config();
        config.max_trajectory_points = 4;
        let mut tracker = ObjectTracker::new(config);
        let rect = Rect::new(100, 100, 50, 50);

        for _ in 0..10 {
            tracker.track(&[rect], &dummy_frame());
        }
        assert_eq!(tracker.tracked()[0].trajectory.len(), 4);
    }

    #[test]
    fn test_moving_object_followed() {
        let mut tracker = ObjectTracker::new(test_config());

        for step in 0..10 {
            let rect = Rect::new(100 + step * 10, 100, 50, 50);
            let result = tracker.track(&[rect], &dummy_frame());
            assert_eq!(result.tracked.len(), 1);
            assert_eq!(result.tracked[0].id, 0);
        }

        // Steady motion keeps confidence above the starting level
        assert!(tracker.tracked()[0].confidence > 0.5);
    }

    #[test]
    fn test_match_at_exact_max_distance() {
        let mut tracker = ObjectTracker::new(test_config());
        tracker.track(&[Rect::new(100, 100, 20, 20)], &dummy_frame());

        // Center moved exactly max_tracking_distance (50): still a match
        let result = tracker.track(&[Rect::new(150, 100, 20, 20)], &dummy_frame());
        assert_eq!(result.tracked.len(), 1);
        assert_eq!(result.tracked[0].id, 0);
        assert_eq!(result.tracked[0].current_bounds, Rect::new(150, 100, 20, 20));
        assert!(result.lost_ids.is_empty());
    }

    #[test]
    fn test_distant_blob_gets_new_id() {
        let mut tracker = ObjectTracker::new(test_config());
        tracker.track(&[Rect::new(0, 0, 20, 20)], &dummy_frame());

        let result = tracker.track(
            &[Rect::new(0, 0, 20, 20), Rect::new(400, 400, 20, 20)],
            &dummy_frame(),
        );
        assert_eq!(result.tracked.len(), 2);
        let ids: Vec<u64> = result.tracked.iter().map(|o| o.id).collect();
        assert!(ids.contains(&0) && ids.contains(&1));
    }

    #[test]
    fn test_lost_emitted_exactly_once() {
        let mut tracker = ObjectTracker::new(test_config());
        for _ in 0..15 {
            tracker.track(&[Rect::new(100, 100, 50, 50)], &dummy_frame());
        }

        let result = tracker.track(&[], &dummy_frame());
        assert_eq!(result.lost_ids, vec![0]);
        assert!(result.tracked.is_empty());

        let result = tracker.track(&[], &dummy_frame());
        assert!(result.lost_ids.is_empty());
    }

    #[test]
    fn test_ids_never_reused() {
        let mut tracker = ObjectTracker::new(test_config());
        tracker.track(&[Rect::new(100, 100, 50, 50)], &dummy_frame());
        tracker.track(&[], &dummy_frame());

        let result = tracker.track(&[Rect::new(100, 100, 50, 50)], &dummy_frame());
        assert_eq!(result.tracked[0].id, 1);
    }

    #[test]
    fn test_no_duplicate_ids_in_tracked() {
        let mut tracker = ObjectTracker::new(test_config());
        let bounds = [
            Rect::new(100, 100, 40, 40),
            Rect::new(300, 100, 40, 40),
            Rect::new(100, 300, 40, 40),
        ];
        for _ in 0..5 {
            let result = tracker.track(&bounds, &dummy_frame());
            let mut ids: Vec<u64> = result.tracked.iter().map(|o| o.id).collect();
            ids.sort_unstable();
            ids.dedup();
            assert_eq!(ids.len(), result.tracked.len());
        }
    }

    #[test]
    fn test_spatial_merge_combines_close_rects() {
        let mut config = test_config();
        config.spatial_merging = true;
        config.spatial_merge_distance = 40.0;
        let mut tracker = ObjectTracker::new(config);

        for _ in 0..5 {
            let result = tracker.track(
                &[Rect::new(100, 100, 40, 40), Rect::new(130, 110, 40, 40)],
                &dummy_frame(),
            );
            assert_eq!(result.tracked.len(), 1);
        }
    }

    #[test]
    fn test_without_spatial_merge_two_trackers() {
        let mut config = test_config();
        config.spatial_merging = false;
        config.max_tracking_distance = 15.0;
        let mut tracker = ObjectTracker::new(config);

        for _ in 0..5 {
            let result = tracker.track(
                &[Rect::new(100, 100, 40, 40), Rect::new(130, 110, 40, 40)],
                &dummy_frame(),
            );
            assert_eq!(result.tracked.len(), 2);
        }
    }

    #[test]
    fn test_find_by_id() {
        let mut tracker = ObjectTracker::new(test_config());
        tracker.track(&[Rect::new(100, 100, 50, 50)], &dummy_frame());

        assert!(tracker.find_by_id(0).is_some());
        assert!(tracker.find_by_id(7).is_none());
    }

    #[test]
    fn test_set_tracked_respects_future_ids() {
        let mut tracker = ObjectTracker::new(test_config());
        let seeded = TrackedObject::new(5, Rect::new(10, 10, 20, 20));
        tracker.set_tracked(vec![seeded]);

        let result = tracker.track(
            &[Rect::new(10, 10, 20, 20), Rect::new(400, 400, 20, 20)],
            &dummy_frame(),
        );
        let ids: Vec<u64> = result.tracked.iter().map(|o| o.id).collect();
        assert!(ids.contains(&5) && ids.contains(&6));
    }

    struct FailingClassifier;

    impl Classifier for FailingClassifier {
        fn classify(&self, _crop: &Frame) -> Result<Classification> {
            Err(Error::Classifier("model not loaded".to_string()))
        }
    }

    struct BirdClassifier;

    impl Classifier for BirdClassifier {
        fn classify(&self, _crop: &Frame) -> Result<Classification> {
            Ok(Classification {
                label: "bird".to_string(),
                confidence: 0.9,
                class_id: 14,
            })
        }
    }

    #[test]
    fn test_classifier_failure_yields_unknown() {
        let mut config = test_config();
        config.enable_classification = true;
        let mut tracker =
            ObjectTracker::new(config).with_classifier(Box::new(FailingClassifier));

        tracker.track(&[Rect::new(100, 100, 50, 50)], &dummy_frame());
        let classification = tracker.classification_of(0).unwrap();
        assert_eq!(classification.label, "unknown");
        assert_eq!(classification.class_id, -1);
    }

    #[test]
    fn test_classifier_result_attached() {
        let mut config = test_config();
        config.enable_classification = true;
        let mut tracker = ObjectTracker::new(config).with_classifier(Box::new(BirdClassifier));

        tracker.track(&[Rect::new(100, 100, 50, 50)], &dummy_frame());
        assert_eq!(tracker.classification_of(0).unwrap().label, "bird");

        // Classification is dropped with the tracker
        tracker.track(&[], &dummy_frame());
        assert!(tracker.classification_of(0).is_none());
    }

    #[test]
    fn test_motion_clustering_groups_parallel_movers() {
        let mut config = test_config();
        config.motion_clustering = true;
        config.motion_similarity_threshold = 0.9;
        config.max_tracking_distance = 30.0;
        let mut tracker = ObjectTracker::new(config);

        // Frame 1 establishes history
        tracker.track(
            &[Rect::new(100, 100, 20, 20), Rect::new(200, 100, 20, 20)],
            &dummy_frame(),
        );
        // Both rects moved +10 in x: one merged bound results
        let result = tracker.track(
            &[Rect::new(110, 100, 20, 20), Rect::new(210, 100, 20, 20)],
            &dummy_frame(),
        );

        let merged: Vec<Rect> = result.tracked.iter().map(|o| o.current_bounds).collect();
        assert!(merged.contains(&Rect::new(110, 100, 120, 20)));
    }

    #[test]
    fn test_bounds_history_is_bounded() {
        let mut config = test_config();
        config.motion_history_frames = 3;
        let mut tracker = ObjectTracker::new(config);

        for _ in 0..10 {
            tracker.track(&[Rect::new(100, 100, 20, 20)], &dummy_frame());
        }
        assert_eq!(tracker.bounds_history().len(), 3);
    }
}
