use anyhow::Result;

use crate::blob::connected_components;
use crate::detect::backend::DetectorBackend;
use crate::detect::batch::{DetectedObject, DetectionBatch};
use crate::frame::ColorFrame;

/// Per-channel distance from the background color that marks a foreground pixel.
const FOREGROUND_TOLERANCE: u8 = 24;

/// Smallest region reported as an object.
const MIN_OBJECT_AREA: usize = 16;

/// Stub backend for testing. Treats the top-left pixel as background and
/// reports every sufficiently large foreground region as an object.
pub struct StubBackend {
    min_area: usize,
    frames_seen: u64,
}

impl StubBackend {
    pub fn new() -> Self {
        Self {
            min_area: MIN_OBJECT_AREA,
            frames_seen: 0,
        }
    }

    pub fn with_min_area(mut self, min_area: usize) -> Self {
        self.min_area = min_area.max(1);
        self
    }
}

impl Default for StubBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(&mut self, frame: &ColorFrame) -> Result<DetectionBatch> {
        self.frames_seen += 1;
        let (width, height) = (frame.width(), frame.height());
        let Some(background) = frame.bgr_at(0, 0) else {
            return Ok(DetectionBatch::empty());
        };

        let foreground: Vec<bool> = frame
            .image()
            .pixels()
            .map(|px| {
                px.0.iter()
                    .zip(background.iter())
                    .any(|(a, b)| a.abs_diff(*b) > FOREGROUND_TOLERANCE)
            })
            .collect();

        let plane = width as usize * height as usize;
        let mut objects = Vec::new();
        let mut labels = Vec::new();
        for component in connected_components(&foreground, width, height)
            .into_iter()
            .filter(|c| c.area() >= self.min_area)
        {
            let mut block = vec![0i16; plane];
            for &idx in &component.pixels {
                block[idx] = 1;
            }
            labels.extend_from_slice(&block);

            // Box fill ratio stands in for a confidence score.
            let box_area = (component.bbox.width() * component.bbox.height()).max(1) as f32;
            objects.push(DetectedObject {
                name: format!("region{}", objects.len() + 1),
                likelihood: (component.area() as f32 / box_area).min(1.0),
                bbox: component.bbox,
            });
        }

        log::debug!(
            "stub detector: frame #{} -> {} objects",
            self.frames_seen,
            objects.len()
        );
        Ok(DetectionBatch::new(objects, labels))
    }
}
