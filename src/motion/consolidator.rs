//! Region consolidation: DBSCAN over tracked objects with an overlap-aware
//! distance metric, producing few stable regions sized for a downstream
//! detector.

use tracing::debug;

use crate::config::ConsolidatorConfig;
use crate::core::types::{Rect, Size};
use crate::motion::tracker::TrackedObject;

/// A cluster of spatially related trackers with a lifecycle across frames
#[derive(Debug, Clone)]
pub struct ConsolidatedRegion {
    pub bounding_box: Rect,
    pub member_ids: Vec<u64>,
    pub frames_since_update: u32,
}

impl ConsolidatedRegion {
    #[must_use]
    pub fn new(bounding_box: Rect, member_ids: Vec<u64>) -> Self {
        Self {
            bounding_box,
            member_ids,
            frames_since_update: 0,
        }
    }
}

const UNVISITED: i32 = -1;
const NOISE: i32 = -2;

/// Stateful clusterer over the current tracker set.
pub struct RegionConsolidator {
    config: ConsolidatorConfig,
    regions: Vec<ConsolidatedRegion>,
    frame_counter: u64,
}

impl RegionConsolidator {
    #[must_use]
    pub fn new(config: ConsolidatorConfig) -> Self {
        Self {
            config,
            regions: Vec::new(),
            frame_counter: 0,
        }
    }

    /// Frame size used for clipping region boxes. The pipeline keeps this in
    /// sync with the actual input.
    pub fn set_frame_size(&mut self, size: Size) {
        if !size.is_empty() {
            self.config.frame_width = size.width;
            self.config.frame_height = size.height;
        }
    }

    #[must_use]
    pub fn regions(&self) -> &[ConsolidatedRegion] {
        &self.regions
    }

    pub fn clear_regions(&mut self) {
        self.regions.clear();
    }

    /// Cluster the current trackers and fold the clusters into the region
    /// set, aging out regions that stopped receiving updates.
    pub fn consolidate(&mut self, trackers: &[TrackedObject]) -> &[ConsolidatedRegion] {
        self.frame_counter += 1;

        // Staleness advances on every frame, with or without trackers
        for region in &mut self.regions {
            region.frames_since_update += 1;
        }

        if trackers.is_empty() {
            self.remove_stale_regions();
            return &self.regions;
        }

        debug!("Consolidating {} tracked objects", trackers.len());

        // Canonical processing order: ascending tracker id
        let mut order: Vec<usize> = (0..trackers.len()).collect();
        order.sort_by_key(|&i| trackers[i].id);

        let clusters = self.dbscan(trackers, &order);
        let new_regions = self.build_regions(trackers, &clusters);

        self.refresh_existing_regions(trackers);

        // Merge each new cluster into the first overlapping region
        for new_region in new_regions {
            let mut merged = false;
            for existing in &mut self.regions {
                if new_region
                    .bounding_box
                    .intersection(&existing.bounding_box)
                    .area()
                    > 0
                {
                    *existing = merge_regions(existing, &new_region);
                    merged = true;
                    break;
                }
            }
            if !merged {
                self.regions.push(new_region);
            }
        }

        self.remove_stale_regions();

        debug!(
            frame = self.frame_counter,
            regions = self.regions.len(),
            "Consolidation complete"
        );

        &self.regions
    }

    /// Weighted sum of the overlap- and edge-distance components
    #[must_use]
    pub fn distance(&self, r1: &Rect, r2: &Rect) -> f64 {
        self.config.overlap_weight * self.overlap_component(r1, r2)
            + self.config.edge_weight * self.edge_component(r1, r2)
    }

    /// Overlap penalty: 0 for identical boxes, `max_edge_distance` for
    /// disjoint ones, scaled by how much of the smaller box is covered.
    fn overlap_component(&self, r1: &Rect, r2: &Rect) -> f64 {
        let intersection = r1.intersection(r2).area();
        if intersection == 0 {
            return self.config.max_edge_distance;
        }

        let min_area = r1.area().min(r2.area());
        if min_area == 0 {
            return self.config.max_edge_distance;
        }

        let overlap_ratio = intersection as f64 / min_area as f64;
        self.config.max_edge_distance * (1.0 - overlap_ratio)
    }

    /// Minimum gap between box edges: axis-aligned when the boxes share a
    /// projection, otherwise nearest-corner distance. Capped.
    fn edge_component(&self, r1: &Rect, r2: &Rect) -> f64 {
        let (left1, right1) = (r1.x, r1.x + r1.width);
        let (top1, bottom1) = (r1.y, r1.y + r1.height);
        let (left2, right2) = (r2.x, r2.x + r2.width);
        let (top2, bottom2) = (r2.y, r2.y + r2.height);

        let overlapping =
            !(right1 < left2 || right2 < left1 || bottom1 < top2 || bottom2 < top1);
        if overlapping {
            return 0.0;
        }

        let mut min_distance = f64::MAX;

        if right1 < left2 {
            min_distance = min_distance.min(f64::from(left2 - right1));
        } else if right2 < left1 {
            min_distance = min_distance.min(f64::from(left1 - right2));
        }

        if bottom1 < top2 {
            min_distance = min_distance.min(f64::from(top2 - bottom1));
        } else if bottom2 < top1 {
            min_distance = min_distance.min(f64::from(top1 - bottom2));
        }

        // Diagonally separated: nearest corner pair
        if min_distance == f64::MAX {
            let corners1 = [
                (left1, top1),
                (right1, top1),
                (left1, bottom1),
                (right1, bottom1),
            ];
            let corners2 = [
                (left2, top2),
                (right2, top2),
                (left2, bottom2),
                (right2, bottom2),
            ];
            for (x1, y1) in corners1 {
                for (x2, y2) in corners2 {
                    let d = f64::from(x1 - x2).hypot(f64::from(y1 - y2));
                    min_distance = min_distance.min(d);
                }
            }
        }

        min_distance.min(self.config.max_edge_distance)
    }

    /// DBSCAN over trackers, visiting points in the given canonical order.
    /// Returns clusters of indices into `trackers`.
    fn dbscan(&self, trackers: &[TrackedObject], order: &[usize]) -> Vec<Vec<usize>> {
        let n = trackers.len();
        let mut labels = vec![UNVISITED; n];
        let mut clusters: Vec<Vec<usize>> = Vec::new();

        for &i in order {
            if labels[i] != UNVISITED {
                continue;
            }

            // The point itself counts toward the density threshold
            let mut neighbors = self.range_query(trackers, order, i);
            if neighbors.len() + 1 < self.config.min_pts {
                labels[i] = NOISE;
                continue;
            }

            #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
            let cluster_id = clusters.len() as i32;
            labels[i] = cluster_id;
            let mut cluster = vec![i];

            let mut idx = 0;
            while idx < neighbors.len() {
                let j = neighbors[idx];
                idx += 1;

                if labels[j] == NOISE {
                    // Noise promoted to border point
                    labels[j] = cluster_id;
                    cluster.push(j);
                } else if labels[j] == UNVISITED {
                    labels[j] = cluster_id;
                    cluster.push(j);

                    let expansion = self.range_query(trackers, order, j);
                    if expansion.len() + 1 >= self.config.min_pts {
                        for candidate in expansion {
                            if !neighbors.contains(&candidate) {
                                neighbors.push(candidate);
                            }
                        }
                    }
                }
            }

            clusters.push(cluster);
        }

        debug!("DBSCAN produced {} clusters from {} trackers", clusters.len(), n);
        clusters
    }

    /// All other points within `eps` of `point_idx`, in canonical order
    fn range_query(&self, trackers: &[TrackedObject], order: &[usize], point_idx: usize) -> Vec<usize> {
        let mut neighbors = Vec::new();
        for &i in order {
            if i == point_idx {
                continue;
            }
            let d = self.distance(
                &trackers[point_idx].current_bounds,
                &trackers[i].current_bounds,
            );
            if d <= self.config.eps {
                neighbors.push(i);
            }
        }
        neighbors
    }

    fn build_regions(
        &self,
        trackers: &[TrackedObject],
        clusters: &[Vec<usize>],
    ) -> Vec<ConsolidatedRegion> {
        let frame_size = self.config.frame_size();
        let mut regions = Vec::with_capacity(clusters.len());

        for cluster in clusters {
            if cluster.is_empty() {
                continue;
            }

            let mut bbox = trackers[cluster[0]].current_bounds;
            for &idx in &cluster[1..] {
                bbox = bbox.union_with(&trackers[idx].current_bounds);
            }

            let expanded = expand_box(bbox, self.config.region_expansion_factor, frame_size);
            let member_ids: Vec<u64> = cluster.iter().map(|&idx| trackers[idx].id).collect();

            debug!(
                "New region {:?} with {} members",
                expanded,
                member_ids.len()
            );
            regions.push(ConsolidatedRegion::new(expanded, member_ids));
        }

        regions
    }

    /// Keep regions alive whose members are still tracked: retain the
    /// surviving subset, recompute the box and reset staleness.
    fn refresh_existing_regions(&mut self, trackers: &[TrackedObject]) {
        let frame_size = self.config.frame_size();

        for region in &mut self.regions {
            let surviving: Vec<u64> = region
                .member_ids
                .iter()
                .copied()
                .filter(|id| trackers.iter().any(|t| t.id == *id))
                .collect();

            if surviving.is_empty() {
                continue;
            }

            let mut bbox: Option<Rect> = None;
            for id in &surviving {
                if let Some(obj) = trackers.iter().find(|t| t.id == *id) {
                    bbox = Some(match bbox {
                        Some(b) => b.union_with(&obj.current_bounds),
                        None => obj.current_bounds,
                    });
                }
            }

            if let Some(bbox) = bbox {
                region.member_ids = surviving;
                region.bounding_box = bbox.clip_to(frame_size);
                region.frames_since_update = 0;
            }
        }
    }

    fn remove_stale_regions(&mut self) {
        #[allow(clippy::cast_possible_truncation)]
        let max_age = self.config.max_frames_without_update as u32;
        let before = self.regions.len();
        self.regions
            .retain(|region| region.frames_since_update <= max_age);
        if self.regions.len() != before {
            debug!("Dropped {} stale regions", before - self.regions.len());
        }
    }
}

fn merge_regions(a: &ConsolidatedRegion, b: &ConsolidatedRegion) -> ConsolidatedRegion {
    let mut member_ids = a.member_ids.clone();
    for id in &b.member_ids {
        if !member_ids.contains(id) {
            member_ids.push(*id);
        }
    }

    ConsolidatedRegion {
        bounding_box: a.bounding_box.union_with(&b.bounding_box),
        member_ids,
        frames_since_update: a.frames_since_update.min(b.frames_since_update),
    }
}

/// Centered expansion of a box by `factor`, clipped to the frame
fn expand_box(bbox: Rect, factor: f64, frame_size: Size) -> Rect {
    #[allow(clippy::cast_possible_truncation)]
    let expand_x = (f64::from(bbox.width) * (factor - 1.0) / 2.0) as i32;
    #[allow(clippy::cast_possible_truncation)]
    let expand_y = (f64::from(bbox.height) * (factor - 1.0) / 2.0) as i32;

    Rect::new(
        bbox.x - expand_x,
        bbox.y - expand_y,
        bbox.width + 2 * expand_x,
        bbox.height + 2 * expand_y,
    )
    .clip_to(frame_size)
}
