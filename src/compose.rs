//! Masked-result compositing.
//!
//! Renders one detection cycle onto its snapshot color frame: translucent
//! per-object fill, bounding box, center marker and a text label.

use std::collections::HashSet;

use image::Rgb;
use imageproc::drawing::{draw_hollow_rect_mut, draw_line_segment_mut};
use imageproc::rect::Rect;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::detect::{DetectedObject, ObjectMask};
use crate::font;
use crate::frame::{BgrImage, ColorFrame};

/// Weight of the object color in a blended member pixel.
pub const MASK_OPACITY: f32 = 0.5;

/// Gap between the label's bottom edge and the box's top edge.
pub const LABEL_OFFSET_Y: i64 = 8;

pub const MARKER_SIZE: u32 = 8;

const LABEL_SCALE: u32 = 2;
const MARKER_COLOR: [u8; 3] = [0, 0, 0];
const LABEL_COLOR: [u8; 3] = [255, 255, 255];

/// One distinct BGR color per object of a cycle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Palette {
    colors: Vec<[u8; 3]>,
}

impl Palette {
    pub fn from_colors(colors: Vec<[u8; 3]>) -> Self {
        Self { colors }
    }

    /// `count` pairwise-distinct random colors.
    pub fn random<R: Rng + ?Sized>(count: usize, rng: &mut R) -> Self {
        let mut seen = HashSet::with_capacity(count);
        let mut colors = Vec::with_capacity(count);
        while colors.len() < count {
            let color: [u8; 3] = rng.gen();
            if seen.insert(color) {
                colors.push(color);
            }
        }
        Self { colors }
    }

    pub fn len(&self) -> usize {
        self.colors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.colors.is_empty()
    }

    /// Color for object index `i`; wraps if the palette is short.
    pub fn color(&self, i: usize) -> [u8; 3] {
        if self.colors.is_empty() {
            return LABEL_COLOR;
        }
        self.colors[i % self.colors.len()]
    }
}

/// Where per-cycle palettes come from.
#[derive(Clone, Copy, Debug, Default)]
pub enum PaletteSource {
    /// Fresh random colors every cycle.
    #[default]
    Random,
    /// Same colors every cycle for a given object count.
    Seeded(u64),
}

impl PaletteSource {
    pub fn from_seed(seed: Option<u64>) -> Self {
        seed.map_or(Self::Random, Self::Seeded)
    }

    pub fn palette(&self, count: usize) -> Palette {
        match *self {
            Self::Random => Palette::random(count, &mut rand::thread_rng()),
            Self::Seeded(seed) => Palette::random(count, &mut StdRng::seed_from_u64(seed)),
        }
    }
}

/// Label text for object index `i`: `#<id> <name> (<likelihood>)`.
pub fn label_text(i: usize, object: &DetectedObject) -> String {
    format!("#{} {} ({:.3})", i + 1, object.name, object.likelihood)
}

/// Render masks and metadata over `color`, in ascending object order.
///
/// `masks` and `objects` are index-aligned. With no objects the result is a
/// plain copy of `color`.
pub fn composite(
    color: &ColorFrame,
    masks: &[ObjectMask<'_>],
    objects: &[DetectedObject],
    palette: &Palette,
) -> ColorFrame {
    let mut canvas = color.image().clone();

    for (i, (mask, object)) in masks.iter().zip(objects).enumerate() {
        let tint = palette.color(i);
        blend_mask(&mut canvas, mask, tint);

        let bbox = object.bbox;
        let rect = Rect::at(bbox.tl.x as i32, bbox.tl.y as i32)
            .of_size(bbox.width().max(1), bbox.height().max(1));
        draw_hollow_rect_mut(&mut canvas, rect, Rgb(tint));

        let center = bbox.center();
        draw_marker(&mut canvas, center.x as f32, center.y as f32, MARKER_COLOR);

        let text = label_text(i, object);
        let text_height = (font::GLYPH_HEIGHT * LABEL_SCALE) as i64;
        let top = (bbox.tl.y as i64 - LABEL_OFFSET_Y - text_height).max(0);
        font::draw_text(
            &mut canvas,
            bbox.tl.x as i64,
            top,
            &text,
            LABEL_COLOR,
            LABEL_SCALE,
        );
    }

    ColorFrame::from_image(canvas)
}

fn blend_mask(canvas: &mut BgrImage, mask: &ObjectMask<'_>, tint: [u8; 3]) {
    for (x, y) in mask.members() {
        let Some(px) = canvas.get_pixel_mut_checked(x, y) else {
            continue;
        };
        for (channel, &c) in px.0.iter_mut().zip(tint.iter()) {
            *channel = blend(*channel, c);
        }
    }
}

fn blend(original: u8, tint: u8) -> u8 {
    let value = original as f32 * (1.0 - MASK_OPACITY) + tint as f32 * MASK_OPACITY;
    value.round().clamp(0.0, 255.0) as u8
}

/// Cross-shaped marker centered on `(x, y)`.
pub(crate) fn draw_marker(canvas: &mut BgrImage, x: f32, y: f32, color: [u8; 3]) {
    let half = MARKER_SIZE as f32 / 2.0;
    draw_line_segment_mut(canvas, (x - half, y), (x + half, y), Rgb(color));
    draw_line_segment_mut(canvas, (x, y - half), (x, y + half), Rgb(color));
}

/// Centered text banner, used when there is nothing to draw.
pub(crate) fn draw_banner(canvas: &mut BgrImage, text: &str, color: [u8; 3]) {
    let width = font::measure_text_width(text, LABEL_SCALE) as i64;
    let height = (font::GLYPH_HEIGHT * LABEL_SCALE) as i64;
    let x = (canvas.width() as i64 - width) / 2;
    let y = (canvas.height() as i64 - height) / 2;
    font::draw_text(canvas, x, y, text, color, LABEL_SCALE);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{reconstruct, BoundingBox, DetectionBatch};

    fn one_object_batch(width: u32, height: u32) -> DetectionBatch {
        let bbox = BoundingBox::from_corners(20, 30, 60, 70);
        let mut labels = vec![0i16; (width * height) as usize];
        for y in 30..70 {
            for x in 20..60 {
                labels[(y * width + x) as usize] = 1;
            }
        }
        DetectionBatch::new(
            vec![DetectedObject {
                name: "cup".to_string(),
                likelihood: 0.91234,
                bbox,
            }],
            labels,
        )
    }

    #[test]
    fn empty_cycle_returns_unmodified_frame() {
        let frame = ColorFrame::filled(32, 24, [10, 20, 30]);
        let out = composite(&frame, &[], &[], &Palette::from_colors(vec![]));
        assert_eq!(out.as_bytes(), frame.as_bytes());
    }

    #[test]
    fn member_pixels_are_blended_half_and_half() {
        let (w, h) = (100, 100);
        let frame = ColorFrame::filled(w, h, [100, 100, 100]);
        let batch = one_object_batch(w, h);
        let masks = reconstruct(&batch, w, h).unwrap();
        let palette = Palette::from_colors(vec![[200, 0, 50]]);

        let out = composite(&frame, &masks, &batch.objects, &palette);

        // Inside the mask, away from border, marker and label.
        assert_eq!(out.bgr_at(25, 60), Some([150, 50, 75]));
        // Outside the mask and the box.
        assert_eq!(out.bgr_at(90, 90), Some([100, 100, 100]));
        // Box border takes the object color.
        assert_eq!(out.bgr_at(20, 50), Some([200, 0, 50]));
        assert_eq!(out.bgr_at(59, 69), Some([200, 0, 50]));
        // Marker at the box center.
        assert_eq!(out.bgr_at(40, 50), Some(MARKER_COLOR));
        // Label sits above the box.
        let label_rows = (30 - LABEL_OFFSET_Y as u32 - 10)..(30 - LABEL_OFFSET_Y as u32);
        let lit = label_rows
            .flat_map(|y| (20..100).map(move |x| (x, y)))
            .filter(|&(x, y)| out.bgr_at(x, y) == Some(LABEL_COLOR))
            .count();
        assert!(lit > 0);
        // Source frame is untouched.
        assert_eq!(frame.bgr_at(25, 60), Some([100, 100, 100]));
    }

    #[test]
    fn label_formats_likelihood_to_three_places() {
        let batch = one_object_batch(100, 100);
        assert_eq!(label_text(0, &batch.objects[0]), "#1 cup (0.912)");
    }

    #[test]
    fn random_palette_colors_are_distinct() {
        let palette = PaletteSource::Random.palette(64);
        let unique: HashSet<_> = (0..64).map(|i| palette.color(i)).collect();
        assert_eq!(unique.len(), 64);
    }

    #[test]
    fn seeded_palette_is_repeatable() {
        let source = PaletteSource::from_seed(Some(7));
        assert_eq!(source.palette(5), source.palette(5));
    }
}
