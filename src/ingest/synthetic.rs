//! Synthetic `stub://` camera.
//!
//! Produces matched color and depth frames of a flat background with a few
//! rectangular objects standing in front of it. Objects drift slowly so
//! consecutive snapshots differ.

use anyhow::{anyhow, Result};

use crate::frame::{ColorFrame, DepthFrame};
use crate::ingest::RawImage;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SyntheticObject {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub bgr: [u8; 3],
    pub depth: f32,
}

#[derive(Clone, Debug)]
pub struct SyntheticCameraConfig {
    /// Source URL, must use the `stub://` scheme.
    pub url: String,
    pub width: u32,
    pub height: u32,
    pub background_bgr: [u8; 3],
    pub background_depth: f32,
    pub objects: Vec<SyntheticObject>,
}

impl Default for SyntheticCameraConfig {
    fn default() -> Self {
        Self {
            url: "stub://camera".to_string(),
            width: 640,
            height: 480,
            background_bgr: [40, 40, 40],
            background_depth: 3.0,
            objects: vec![
                SyntheticObject {
                    x: 80,
                    y: 120,
                    width: 120,
                    height: 160,
                    bgr: [30, 60, 220],
                    depth: 1.2,
                },
                SyntheticObject {
                    x: 360,
                    y: 200,
                    width: 140,
                    height: 120,
                    bgr: [210, 140, 20],
                    depth: 0.8,
                },
            ],
        }
    }
}

/// Synthetic camera state.
pub struct SyntheticCamera {
    config: SyntheticCameraConfig,
    frame_count: u64,
}

impl SyntheticCamera {
    pub fn new(config: SyntheticCameraConfig) -> Result<Self> {
        if !config.url.starts_with("stub://") {
            return Err(anyhow!(
                "camera url '{}' is not supported (only stub:// sources are built in)",
                config.url
            ));
        }
        if config.width == 0 || config.height == 0 {
            return Err(anyhow!("synthetic camera needs a non-empty frame size"));
        }
        log::info!(
            "SyntheticCamera: {} at {}x{} with {} objects",
            config.url,
            config.width,
            config.height,
            config.objects.len()
        );
        Ok(Self {
            config,
            frame_count: 0,
        })
    }

    pub fn frames_captured(&self) -> u64 {
        self.frame_count
    }

    /// Render the next color + depth pair as feed messages.
    pub fn next_images(&mut self) -> (RawImage, RawImage) {
        let (color, depth) = self.next_frames();
        let color_msg =
            RawImage::packed(color.width(), color.height(), "bgr8", color.as_bytes().to_vec());
        let depth_msg =
            RawImage::from_depth_samples(depth.width(), depth.height(), depth.image().as_raw());
        (color_msg, depth_msg)
    }

    /// Render the next color + depth pair.
    pub fn next_frames(&mut self) -> (ColorFrame, DepthFrame) {
        self.frame_count += 1;
        let cfg = &self.config;
        let (w, h) = (cfg.width, cfg.height);

        let mut color = ColorFrame::filled(w, h, cfg.background_bgr).into_image();
        let mut depth = DepthFrame::filled(w, h, cfg.background_depth).image().clone();

        // Horizontal drift of a few pixels, back and forth.
        let phase = (self.frame_count / 5) % 16;
        let drift = (if phase < 8 { phase } else { 16 - phase }) as u32;

        for object in &cfg.objects {
            let x0 = (object.x + drift).min(w);
            let y0 = object.y.min(h);
            let x1 = (x0 + object.width).min(w);
            let y1 = (y0 + object.height).min(h);
            for y in y0..y1 {
                for x in x0..x1 {
                    color.put_pixel(x, y, image::Rgb(object.bgr));
                    depth.put_pixel(x, y, image::Luma([object.depth]));
                }
            }
        }

        (ColorFrame::from_image(color), DepthFrame::from_image(depth))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::{decode_color, decode_depth};

    #[test]
    fn rejects_non_stub_urls() {
        let cfg = SyntheticCameraConfig {
            url: "rtsp://camera".into(),
            ..SyntheticCameraConfig::default()
        };
        assert!(SyntheticCamera::new(cfg).is_err());
    }

    #[test]
    fn objects_appear_in_color_and_depth() {
        let mut camera = SyntheticCamera::new(SyntheticCameraConfig::default()).unwrap();
        let (color, depth) = camera.next_images();
        let color = decode_color(&color).unwrap();
        let depth = decode_depth(&depth).unwrap();

        assert_eq!(color.bgr_at(0, 0), Some([40, 40, 40]));
        assert_eq!(depth.depth_at(0, 0), Some(3.0));
        assert_eq!(color.bgr_at(140, 200), Some([30, 60, 220]));
        assert_eq!(depth.depth_at(140, 200), Some(1.2));
        assert_eq!(depth.depth_at(430, 260), Some(0.8));
        assert_eq!(camera.frames_captured(), 1);
    }
}
