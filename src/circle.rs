//! Auxiliary circle path.
//!
//! Runs on every color frame when enabled: finds dark, roughly circular blobs
//! over a sweep of grayscale thresholds and reports the strongest one with the
//! depth under its center. Independent of the trigger/detect cycle.

use image::Rgb;
use imageproc::drawing::draw_hollow_circle_mut;

use crate::blob::connected_components;
use crate::compose::{draw_banner, draw_marker};
use crate::frame::{ColorFrame, DepthFrame};
use crate::select::DepthPose;

const BLOB_OUTLINE: [u8; 3] = [0, 0, 127];
const BLOB_MARKER: [u8; 3] = [0, 0, 255];
const NOT_FOUND_COLOR: [u8; 3] = [255, 255, 255];

#[derive(Clone, Debug, PartialEq)]
pub struct BlobParams {
    /// First threshold of the sweep (inclusive).
    pub min_threshold: u8,
    /// End of the sweep (exclusive).
    pub max_threshold: u8,
    pub threshold_step: u8,
    pub min_area: usize,
    pub max_area: usize,
    pub min_circularity: f32,
    /// Thresholds a blob must survive to be reported.
    pub min_repeatability: usize,
    pub min_dist_between_blobs: f32,
}

impl Default for BlobParams {
    fn default() -> Self {
        Self {
            min_threshold: 60,
            max_threshold: 150,
            threshold_step: 10,
            min_area: 600,
            max_area: 16000,
            min_circularity: 0.4,
            min_repeatability: 2,
            min_dist_between_blobs: 10.0,
        }
    }
}

/// Detected blob: center and diameter in pixels.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct KeyPoint {
    pub x: f32,
    pub y: f32,
    pub size: f32,
}

struct BlobGroup {
    centers: Vec<(f32, f32)>,
    radii: Vec<f32>,
}

impl BlobGroup {
    fn center(&self) -> (f32, f32) {
        let n = self.centers.len() as f32;
        let (sx, sy) = self
            .centers
            .iter()
            .fold((0.0, 0.0), |(ax, ay), (x, y)| (ax + x, ay + y));
        (sx / n, sy / n)
    }

    fn median_radius(&self) -> f32 {
        let mut radii = self.radii.clone();
        radii.sort_by(f32::total_cmp);
        radii[radii.len() / 2]
    }
}

#[derive(Clone, Debug, Default)]
pub struct BlobDetector {
    params: BlobParams,
}

impl BlobDetector {
    pub fn new(params: BlobParams) -> Self {
        Self { params }
    }

    /// Keypoints ordered by repeatability, then by first appearance.
    pub fn detect(&self, frame: &ColorFrame) -> Vec<KeyPoint> {
        let p = &self.params;
        let (width, height) = (frame.width(), frame.height());
        let gray: Vec<u8> = frame.image().pixels().map(|px| luma(px.0)).collect();

        let mut groups: Vec<BlobGroup> = Vec::new();
        let step = p.threshold_step.max(1) as usize;
        for threshold in (p.min_threshold as usize..p.max_threshold as usize).step_by(step) {
            let dark: Vec<bool> = gray.iter().map(|&g| (g as usize) <= threshold).collect();
            for component in connected_components(&dark, width, height) {
                let area = component.area();
                if area < p.min_area || area > p.max_area {
                    continue;
                }
                if component.circularity() < p.min_circularity {
                    continue;
                }
                let center = component.centroid;
                let radius = (area as f32 / std::f32::consts::PI).sqrt();

                let existing = groups.iter_mut().find(|group| {
                    let (gx, gy) = group.center();
                    let dist = ((gx - center.0).powi(2) + (gy - center.1).powi(2)).sqrt();
                    dist < p.min_dist_between_blobs.max(group.median_radius())
                });
                match existing {
                    Some(group) => {
                        group.centers.push(center);
                        group.radii.push(radius);
                    }
                    None => groups.push(BlobGroup {
                        centers: vec![center],
                        radii: vec![radius],
                    }),
                }
            }
        }

        let mut kept: Vec<&BlobGroup> = groups
            .iter()
            .filter(|g| g.centers.len() >= p.min_repeatability)
            .collect();
        kept.sort_by(|a, b| b.centers.len().cmp(&a.centers.len()));
        kept.into_iter()
            .map(|g| {
                let (x, y) = g.center();
                KeyPoint {
                    x,
                    y,
                    size: 2.0 * g.median_radius(),
                }
            })
            .collect()
    }
}

fn luma(bgr: [u8; 3]) -> u8 {
    let [b, g, r] = bgr;
    (0.114 * b as f32 + 0.587 * g as f32 + 0.299 * r as f32).round() as u8
}

/// Output of one frame through the circle path.
#[derive(Clone, Debug)]
pub struct CircleOutcome {
    pub keypoints: Vec<KeyPoint>,
    /// Pose of the strongest blob; `None` when nothing was found or no depth
    /// frame has arrived yet.
    pub pose: Option<DepthPose>,
    pub image: ColorFrame,
}

/// Detect blobs on `color`, sample `depth` under the strongest one and render the result view.
pub fn run_circle_path(
    detector: &BlobDetector,
    color: &ColorFrame,
    depth: Option<&DepthFrame>,
) -> CircleOutcome {
    let keypoints = detector.detect(color);
    let mut canvas = color.image().clone();

    let pose = match keypoints.first() {
        Some(first) => {
            for kp in &keypoints {
                draw_hollow_circle_mut(
                    &mut canvas,
                    (kp.x.round() as i32, kp.y.round() as i32),
                    (kp.size / 2.0).round().max(1.0) as i32,
                    Rgb(BLOB_OUTLINE),
                );
            }
            draw_marker(&mut canvas, first.x, first.y, BLOB_MARKER);
            let (x, y) = (first.x.round() as u32, first.y.round() as u32);
            depth.map(|frame| DepthPose {
                x,
                y,
                depth: frame.depth_at(x, y).unwrap_or(f32::NAN),
            })
        }
        None => {
            draw_banner(&mut canvas, "NOT FOUND", NOT_FOUND_COLOR);
            None
        }
    };

    CircleOutcome {
        keypoints,
        pose,
        image: ColorFrame::from_image(canvas),
    }
}
