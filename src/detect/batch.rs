use serde::Deserialize;

use crate::error::{PipelineError, Result};
use crate::frame::Pixel;

/// Axis-aligned box in pixel coordinates. `br` is exclusive, like a
/// top-left/size rectangle built from two corners.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BoundingBox {
    pub tl: Pixel,
    pub br: Pixel,
}

impl BoundingBox {
    pub fn new(tl: Pixel, br: Pixel) -> Self {
        Self { tl, br }
    }

    pub fn from_corners(x0: u32, y0: u32, x1: u32, y1: u32) -> Self {
        Self::new(Pixel::new(x0, y0), Pixel::new(x1, y1))
    }

    /// Integer midpoint, rounded toward the top-left corner.
    ///
    /// Only meaningful for a box that passed `check_within`.
    pub fn center(&self) -> Pixel {
        Pixel::new(
            self.tl.x + (self.br.x.saturating_sub(self.tl.x)) / 2,
            self.tl.y + (self.br.y.saturating_sub(self.tl.y)) / 2,
        )
    }

    pub fn width(&self) -> u32 {
        self.br.x.saturating_sub(self.tl.x)
    }

    pub fn height(&self) -> u32 {
        self.br.y.saturating_sub(self.tl.y)
    }

    /// Reject boxes that are inverted or leave a `width` x `height` frame.
    pub(crate) fn check_within(&self, width: u32, height: u32) -> Result<()> {
        if self.br.x < self.tl.x || self.br.y < self.tl.y {
            return Err(PipelineError::malformed(format!(
                "inverted box ({},{})-({},{})",
                self.tl.x, self.tl.y, self.br.x, self.br.y
            )));
        }
        if self.tl.x >= width || self.tl.y >= height || self.br.x > width || self.br.y > height
        {
            return Err(PipelineError::malformed(format!(
                "box ({},{})-({},{}) outside {}x{} frame",
                self.tl.x, self.tl.y, self.br.x, self.br.y, width, height
            )));
        }
        Ok(())
    }
}

/// Per-object metadata reported by the detector.
#[derive(Clone, Debug, PartialEq)]
pub struct DetectedObject {
    pub name: String,
    pub likelihood: f32,
    pub bbox: BoundingBox,
}

/// One detector output: ordered objects plus the flattened label array.
///
/// `labels` holds one `width * height` block per object, in object order.
/// Zero means "not this object", anything else is a member pixel.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DetectionBatch {
    pub objects: Vec<DetectedObject>,
    pub labels: Vec<i16>,
}

impl DetectionBatch {
    pub fn new(objects: Vec<DetectedObject>, labels: Vec<i16>) -> Self {
        Self { objects, labels }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

/// Detector output as it arrives on the feed: parallel arrays.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct DetectionMessage {
    #[serde(default)]
    pub names: Vec<String>,
    #[serde(default)]
    pub likelihoods: Vec<f32>,
    /// `[x0, y0, x1, y1]` per object.
    #[serde(default)]
    pub boxes: Vec<[u32; 4]>,
    #[serde(default)]
    pub labels: Vec<i16>,
}

impl TryFrom<DetectionMessage> for DetectionBatch {
    type Error = PipelineError;

    fn try_from(msg: DetectionMessage) -> Result<Self> {
        let count = msg.names.len();
        if msg.likelihoods.len() != count || msg.boxes.len() != count {
            return Err(PipelineError::malformed(format!(
                "object count disagrees: {} names, {} likelihoods, {} boxes",
                count,
                msg.likelihoods.len(),
                msg.boxes.len()
            )));
        }
        let objects = msg
            .names
            .into_iter()
            .zip(msg.likelihoods)
            .zip(msg.boxes)
            .map(|((name, likelihood), [x0, y0, x1, y1])| DetectedObject {
                name,
                likelihood,
                bbox: BoundingBox::from_corners(x0, y0, x1, y1),
            })
            .collect();
        Ok(Self::new(objects, msg.labels))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn center_rounds_toward_top_left() {
        let b = BoundingBox::from_corners(10, 20, 15, 27);
        assert_eq!(b.center(), Pixel::new(12, 23));
        let point = BoundingBox::from_corners(4, 4, 4, 4);
        assert_eq!(point.center(), Pixel::new(4, 4));
    }

    #[test]
    fn box_bounds_are_checked() {
        assert!(BoundingBox::from_corners(0, 0, 8, 6).check_within(8, 6).is_ok());
        assert!(BoundingBox::from_corners(0, 0, 9, 6).check_within(8, 6).is_err());
        assert!(BoundingBox::from_corners(8, 0, 8, 6).check_within(8, 6).is_err());
        assert!(BoundingBox::from_corners(5, 5, 2, 6).check_within(8, 6).is_err());
    }

    #[test]
    fn message_with_ragged_arrays_is_malformed() {
        let msg = DetectionMessage {
            names: vec!["cup".into(), "box".into()],
            likelihoods: vec![0.9],
            boxes: vec![[0, 0, 1, 1], [1, 1, 2, 2]],
            labels: vec![],
        };
        let err = DetectionBatch::try_from(msg).unwrap_err();
        assert!(matches!(err, PipelineError::MalformedBatch(_)));
    }

    #[test]
    fn message_parses_from_json() {
        let json = r#"{
            "names": ["cup"],
            "likelihoods": [0.75],
            "boxes": [[1, 1, 3, 3]],
            "labels": [0, 0, 0, 0, 1, 1, 0, 1, 1]
        }"#;
        let msg: DetectionMessage = serde_json::from_str(json).unwrap();
        let batch = DetectionBatch::try_from(msg).unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch.objects[0].name, "cup");
        assert_eq!(batch.objects[0].bbox.center(), Pixel::new(2, 2));
    }
}
