//! Object summaries and closest-object selection.

use serde::Serialize;

use crate::detect::{BoundingBox, DetectedObject, ObjectMask};
use crate::error::{PipelineError, Result};
use crate::frame::{is_valid_depth, DepthFrame, Pixel};

/// Default radius for the nearest-valid-depth search around a center pixel.
pub const DEFAULT_DEPTH_SEARCH_RADIUS: u32 = 4;

/// Pixel position plus the depth sampled there.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct DepthPose {
    pub x: u32,
    pub y: u32,
    pub depth: f32,
}

/// One detected object of a completed cycle.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ObjectSummary {
    /// 1-based position in the batch.
    pub id: usize,
    pub name: String,
    pub center: Pixel,
    /// `NaN` when no valid depth was found near the center.
    pub depth: f32,
}

impl ObjectSummary {
    pub fn pose(&self) -> DepthPose {
        DepthPose {
            x: self.center.x,
            y: self.center.y,
            depth: self.depth,
        }
    }

    pub fn has_depth(&self) -> bool {
        is_valid_depth(self.depth)
    }
}

pub type DetectionResult = Vec<ObjectSummary>;

/// How a depth value is read for an object.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DepthPolicy {
    /// Chebyshev radius searched when the center pixel has no return.
    /// Zero samples the center only.
    pub search_radius: u32,
}

impl Default for DepthPolicy {
    fn default() -> Self {
        Self {
            search_radius: DEFAULT_DEPTH_SEARCH_RADIUS,
        }
    }
}

impl DepthPolicy {
    pub fn center_only() -> Self {
        Self { search_radius: 0 }
    }

    /// Depth at `center`, or the nearest valid sample within the search radius
    /// that lies inside `bbox`. Rings are scanned row-major, so the first valid
    /// sample of the closest ring wins.
    pub fn sample(&self, depth: &DepthFrame, center: Pixel, bbox: &BoundingBox) -> f32 {
        if let Some(value) = depth.depth_at(center.x, center.y) {
            if is_valid_depth(value) {
                return value;
            }
        }

        let min_x = bbox.tl.x as i64;
        let min_y = bbox.tl.y as i64;
        let max_x = (bbox.br.x as i64 - 1).max(min_x);
        let max_y = (bbox.br.y as i64 - 1).max(min_y);
        let (cx, cy) = (center.x as i64, center.y as i64);

        for r in 1..=self.search_radius as i64 {
            for y in (cy - r)..=(cy + r) {
                for x in (cx - r)..=(cx + r) {
                    let on_ring = (x - cx).abs() == r || (y - cy).abs() == r;
                    if !on_ring || x < min_x || y < min_y || x > max_x || y > max_y {
                        continue;
                    }
                    if let Some(value) = depth.depth_at(x as u32, y as u32) {
                        if is_valid_depth(value) {
                            return value;
                        }
                    }
                }
            }
        }
        f32::NAN
    }
}

/// Build one summary per object, in batch order.
pub fn build_results(
    masks: &[ObjectMask<'_>],
    depth: &DepthFrame,
    objects: &[DetectedObject],
    policy: DepthPolicy,
) -> DetectionResult {
    masks
        .iter()
        .zip(objects)
        .enumerate()
        .map(|(i, (_mask, object))| {
            let center = object.bbox.center();
            ObjectSummary {
                id: i + 1,
                name: object.name.clone(),
                center,
                depth: policy.sample(depth, center, &object.bbox),
            }
        })
        .collect()
}

/// Entry with the smallest valid depth; first in list order on ties.
///
/// Entries without a valid depth rank after every entry that has one. Fails
/// with `Empty` only when `results` is empty.
pub fn select_closest(results: &[ObjectSummary]) -> Result<&ObjectSummary> {
    let mut iter = results.iter();
    let mut best = iter.next().ok_or(PipelineError::Empty)?;
    for candidate in iter {
        let closer = match (best.has_depth(), candidate.has_depth()) {
            (true, true) => candidate.depth < best.depth,
            (false, true) => true,
            _ => false,
        };
        if closer {
            best = candidate;
        }
    }
    Ok(best)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{reconstruct, DetectionBatch};
    use crate::frame::NO_DEPTH;

    fn summary(id: usize, depth: f32) -> ObjectSummary {
        ObjectSummary {
            id,
            name: format!("obj{id}"),
            center: Pixel::new(0, 0),
            depth,
        }
    }

    #[test]
    fn closest_has_minimal_depth() {
        let results = vec![summary(1, 1.2), summary(2, 0.8), summary(3, 2.0)];
        assert_eq!(select_closest(&results).unwrap().id, 2);
    }

    #[test]
    fn ties_go_to_first_in_order() {
        let results = vec![summary(1, 1.0), summary(2, 0.5), summary(3, 0.5)];
        assert_eq!(select_closest(&results).unwrap().id, 2);
    }

    #[test]
    fn missing_depth_ranks_last() {
        let results = vec![summary(1, f32::NAN), summary(2, 3.0), summary(3, f32::NAN)];
        assert_eq!(select_closest(&results).unwrap().id, 2);

        let none = vec![summary(1, f32::NAN), summary(2, f32::NAN)];
        assert_eq!(select_closest(&none).unwrap().id, 1);
    }

    #[test]
    fn empty_results_are_empty() {
        assert_eq!(select_closest(&[]).unwrap_err(), PipelineError::Empty);
    }

    #[test]
    fn closest_is_never_beaten() {
        let depths = [3.5, 0.9, 4.2, 0.9, 1.7, 0.31, 2.2];
        let results: Vec<_> = depths
            .iter()
            .enumerate()
            .map(|(i, &d)| summary(i + 1, d))
            .collect();
        let best = select_closest(&results).unwrap();
        assert!(results.iter().all(|r| best.depth <= r.depth));
    }

    #[test]
    fn builds_centers_and_samples_depth() {
        let (w, h) = (10, 10);
        let mut depth = DepthFrame::filled(w, h, 2.0).image().clone();
        depth.put_pixel(3, 3, image::Luma([1.25]));
        let depth = DepthFrame::from_image(depth);

        let batch = DetectionBatch::new(
            vec![
                DetectedObject {
                    name: "a".into(),
                    likelihood: 0.9,
                    bbox: BoundingBox::from_corners(1, 1, 6, 6),
                },
                DetectedObject {
                    name: "b".into(),
                    likelihood: 0.4,
                    bbox: BoundingBox::from_corners(6, 6, 10, 10),
                },
            ],
            vec![0; 200],
        );
        let masks = reconstruct(&batch, w, h).unwrap();
        let results = build_results(&masks, &depth, &batch.objects, DepthPolicy::center_only());

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, 1);
        assert_eq!(results[0].center, Pixel::new(3, 3));
        assert_eq!(results[0].depth, 1.25);
        assert_eq!(results[1].id, 2);
        assert_eq!(results[1].center, Pixel::new(8, 8));
        assert_eq!(results[1].depth, 2.0);
        assert_eq!(
            results[1].pose(),
            DepthPose {
                x: 8,
                y: 8,
                depth: 2.0
            }
        );
    }

    #[test]
    fn invalid_center_searches_nearest_valid_sample_in_box() {
        let mut depth = DepthFrame::filled(9, 9, NO_DEPTH).image().clone();
        depth.put_pixel(6, 4, image::Luma([0.7]));
        depth.put_pixel(8, 8, image::Luma([0.1]));
        let depth = DepthFrame::from_image(depth);
        let bbox = BoundingBox::from_corners(2, 2, 8, 8);
        let center = bbox.center();
        assert_eq!(center, Pixel::new(5, 5));

        assert_eq!(DepthPolicy::default().sample(&depth, center, &bbox), 0.7);
        assert!(DepthPolicy::center_only()
            .sample(&depth, center, &bbox)
            .is_nan());
        // (8, 8) lies outside the box and is never used.
        let tight = BoundingBox::from_corners(4, 4, 7, 7);
        let policy = DepthPolicy { search_radius: 3 };
        assert_eq!(policy.sample(&depth, tight.center(), &tight), 0.7);
    }
}
