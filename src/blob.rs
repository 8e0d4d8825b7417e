//! Connected-component labelling over binary masks.
//!
//! Shared by the auxiliary circle detector and the stub detector backend.

use image::{GrayImage, Luma};
use imageproc::region_labelling::{self, Connectivity};

use crate::detect::BoundingBox;

/// One 4-connected region of set pixels.
#[derive(Clone, Debug)]
pub struct Component {
    /// Row-major indices into the source mask.
    pub pixels: Vec<usize>,
    pub bbox: BoundingBox,
    /// Pixel edges shared with an unset pixel or the frame border.
    pub crack_length: usize,
    pub centroid: (f32, f32),
}

impl Component {
    pub fn area(&self) -> usize {
        self.pixels.len()
    }

    /// `4 * pi * area / perimeter^2`, using the crack length scaled by pi/4
    /// as the perimeter estimate. Clamped to 1.0.
    pub fn circularity(&self) -> f32 {
        if self.crack_length == 0 {
            return 0.0;
        }
        let perimeter = self.crack_length as f32 * std::f32::consts::FRAC_PI_4;
        let value = 4.0 * std::f32::consts::PI * self.area() as f32 / (perimeter * perimeter);
        value.min(1.0)
    }
}

/// Label all 4-connected components of `mask` (`width` x `height`, row-major).
///
/// Components are ordered by their first pixel in row-major order.
pub fn connected_components(mask: &[bool], width: u32, height: u32) -> Vec<Component> {
    let w = width as usize;
    let h = height as usize;
    if w.checked_mul(h) != Some(mask.len()) {
        return Vec::new();
    }
    let binary: Vec<u8> = mask.iter().map(|&set| u8::from(set)).collect();
    let Some(image) = GrayImage::from_raw(width, height, binary) else {
        return Vec::new();
    };
    let labels = region_labelling::connected_components(&image, Connectivity::Four, Luma([0u8]));

    let mut regions: Vec<Region> = Vec::new();
    for (idx, label) in labels.as_raw().iter().enumerate() {
        let Some(slot) = (*label as usize).checked_sub(1) else {
            continue;
        };
        if regions.len() <= slot {
            regions.resize_with(slot + 1, Region::default);
        }
        let (x, y) = (idx % w, idx / w);
        let open_edges = [
            x > 0 && mask[idx - 1],
            x + 1 < w && mask[idx + 1],
            y > 0 && mask[idx - w],
            y + 1 < h && mask[idx + w],
        ]
        .iter()
        .filter(|&&inside| !inside)
        .count();
        regions[slot].add(idx, x, y, open_edges);
    }

    let mut components: Vec<Component> = regions
        .into_iter()
        .filter(|region| !region.pixels.is_empty())
        .map(Region::into_component)
        .collect();
    components.sort_by_key(|c| c.pixels[0]);
    components
}

struct Region {
    pixels: Vec<usize>,
    min: (usize, usize),
    max: (usize, usize),
    sum: (f64, f64),
    crack_length: usize,
}

impl Default for Region {
    fn default() -> Self {
        Self {
            pixels: Vec::new(),
            min: (usize::MAX, usize::MAX),
            max: (0, 0),
            sum: (0.0, 0.0),
            crack_length: 0,
        }
    }
}

impl Region {
    fn add(&mut self, idx: usize, x: usize, y: usize, open_edges: usize) {
        self.pixels.push(idx);
        self.min = (self.min.0.min(x), self.min.1.min(y));
        self.max = (self.max.0.max(x), self.max.1.max(y));
        self.sum = (self.sum.0 + x as f64, self.sum.1 + y as f64);
        self.crack_length += open_edges;
    }

    fn into_component(self) -> Component {
        let count = self.pixels.len() as f64;
        Component {
            bbox: BoundingBox::from_corners(
                self.min.0 as u32,
                self.min.1 as u32,
                self.max.0 as u32 + 1,
                self.max.1 as u32 + 1,
            ),
            crack_length: self.crack_length,
            centroid: ((self.sum.0 / count) as f32, (self.sum.1 / count) as f32),
            pixels: self.pixels,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn disc_mask(width: u32, height: u32, cx: f32, cy: f32, r: f32) -> Vec<bool> {
        (0..height)
            .flat_map(|y| (0..width).map(move |x| (x, y)))
            .map(|(x, y)| {
                let dx = x as f32 - cx;
                let dy = y as f32 - cy;
                dx * dx + dy * dy <= r * r
            })
            .collect()
    }

    #[test]
    fn separates_disjoint_regions() {
        #[rustfmt::skip]
        let mask = vec![
            true,  true,  false, false,
            false, false, false, true,
            false, false, false, true,
        ];
        let comps = connected_components(&mask, 4, 3);
        assert_eq!(comps.len(), 2);
        assert_eq!(comps[0].area(), 2);
        assert_eq!(comps[0].bbox, BoundingBox::from_corners(0, 0, 2, 1));
        assert_eq!(comps[1].area(), 2);
        assert_eq!(comps[1].bbox, BoundingBox::from_corners(3, 1, 4, 3));
        assert_eq!(comps[1].centroid, (3.0, 1.5));
    }

    #[test]
    fn disc_is_nearly_circular_and_line_is_not() {
        let disc = connected_components(&disc_mask(60, 60, 30.0, 30.0, 20.0), 60, 60);
        assert_eq!(disc.len(), 1);
        assert!(disc[0].circularity() > 0.8, "{}", disc[0].circularity());

        let mut line = vec![false; 100 * 5];
        for x in 0..100 {
            line[2 * 100 + x] = true;
        }
        let comps = connected_components(&line, 100, 5);
        assert_eq!(comps.len(), 1);
        assert!(comps[0].circularity() < 0.1);
    }

    #[test]
    fn diagonal_neighbours_are_separate() {
        #[rustfmt::skip]
        let mask = vec![
            true,  false,
            false, true,
        ];
        let comps = connected_components(&mask, 2, 2);
        assert_eq!(comps.len(), 2);
        assert_eq!(comps[0].pixels, vec![0]);
        assert_eq!(comps[1].pixels, vec![3]);
        assert_eq!(comps[0].crack_length, 4);
    }

    #[test]
    fn mismatched_mask_yields_nothing() {
        assert!(connected_components(&[true; 5], 2, 2).is_empty());
    }
}
