//! Frame types and the latest-frame buffer.
//!
//! - `ColorFrame`: BGR8 image, replaced wholesale on every arrival.
//! - `DepthFrame`: one `f32` distance per pixel.
//! - `FrameBuffer`: latest color + depth handles behind a single lock.
//! - `Snapshot`: the frozen pair a detection cycle runs against.
//!
//! Frames are immutable once built and shared through `Arc`, so swapping the
//! latest handle never exposes a half-written frame to a reader.

use std::sync::{Arc, Mutex, PoisonError};

use image::{ImageBuffer, Luma, Rgb};
use serde::Serialize;

use crate::error::{PipelineError, Result};

/// Three-channel 8-bit image whose channels are stored B, G, R.
///
/// `Rgb<u8>` is only the container type here; nothing reorders channels.
pub type BgrImage = ImageBuffer<Rgb<u8>, Vec<u8>>;

/// Single-channel depth image.
pub type DepthImage = ImageBuffer<Luma<f32>, Vec<f32>>;

/// Canonical "no return" value written by depth sensors.
pub const NO_DEPTH: f32 = 0.0;

/// A depth sample is usable when it is finite and strictly positive.
pub fn is_valid_depth(value: f32) -> bool {
    value.is_finite() && value > NO_DEPTH
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelFormat {
    Bgr8,
    Depth32F,
}

/// Integer pixel coordinate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
pub struct Pixel {
    pub x: u32,
    pub y: u32,
}

impl Pixel {
    pub fn new(x: u32, y: u32) -> Self {
        Self { x, y }
    }
}

// ----------------------------------------------------------------------------
// Frames
// ----------------------------------------------------------------------------

#[derive(Clone, Debug)]
pub struct ColorFrame {
    image: BgrImage,
}

impl ColorFrame {
    pub fn from_image(image: BgrImage) -> Self {
        Self { image }
    }

    /// Build from packed BGR bytes. Returns `None` on a length mismatch.
    pub fn from_bgr(width: u32, height: u32, data: Vec<u8>) -> Option<Self> {
        ImageBuffer::from_raw(width, height, data).map(Self::from_image)
    }

    /// Solid-color frame, mostly useful for tests and synthetic feeds.
    pub fn filled(width: u32, height: u32, bgr: [u8; 3]) -> Self {
        Self::from_image(ImageBuffer::from_pixel(width, height, Rgb(bgr)))
    }

    pub fn format(&self) -> PixelFormat {
        PixelFormat::Bgr8
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn bgr_at(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        self.image.get_pixel_checked(x, y).map(|px| px.0)
    }

    pub fn image(&self) -> &BgrImage {
        &self.image
    }

    pub fn into_image(self) -> BgrImage {
        self.image
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.image.as_raw()
    }
}

#[derive(Clone, Debug)]
pub struct DepthFrame {
    image: DepthImage,
}

impl DepthFrame {
    pub fn from_image(image: DepthImage) -> Self {
        Self { image }
    }

    /// Build from row-major samples. Returns `None` on a length mismatch.
    pub fn from_samples(width: u32, height: u32, samples: Vec<f32>) -> Option<Self> {
        ImageBuffer::from_raw(width, height, samples).map(Self::from_image)
    }

    pub fn filled(width: u32, height: u32, depth: f32) -> Self {
        Self::from_image(ImageBuffer::from_pixel(width, height, Luma([depth])))
    }

    pub fn format(&self) -> PixelFormat {
        PixelFormat::Depth32F
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Raw sample at `(x, y)`, or `None` outside the frame.
    pub fn depth_at(&self, x: u32, y: u32) -> Option<f32> {
        self.image.get_pixel_checked(x, y).map(|px| px.0[0])
    }

    pub fn image(&self) -> &DepthImage {
        &self.image
    }
}

// ----------------------------------------------------------------------------
// Snapshot
// ----------------------------------------------------------------------------

/// Color/depth pair frozen at trigger time. Cheap to clone.
#[derive(Clone, Debug)]
pub struct Snapshot {
    color: Arc<ColorFrame>,
    depth: Arc<DepthFrame>,
}

impl Snapshot {
    pub fn new(color: Arc<ColorFrame>, depth: Arc<DepthFrame>) -> Self {
        Self { color, depth }
    }

    pub fn color(&self) -> &ColorFrame {
        &self.color
    }

    pub fn depth(&self) -> &DepthFrame {
        &self.depth
    }

    pub fn color_handle(&self) -> Arc<ColorFrame> {
        Arc::clone(&self.color)
    }

    /// Dimensions the detector's label masks are matched against.
    pub fn dimensions(&self) -> (u32, u32) {
        (self.color.width(), self.color.height())
    }
}

// ----------------------------------------------------------------------------
// FrameBuffer
// ----------------------------------------------------------------------------

#[derive(Default)]
struct Latest {
    color: Option<Arc<ColorFrame>>,
    depth: Option<Arc<DepthFrame>>,
}

/// Latest color and depth frames.
///
/// Both handles live behind one mutex so `snapshot` observes a pair that was
/// simultaneously current at some instant.
#[derive(Default)]
pub struct FrameBuffer {
    latest: Mutex<Latest>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update_color(&self, frame: ColorFrame) {
        let frame = Arc::new(frame);
        self.lock().color = Some(frame);
    }

    pub fn update_depth(&self, frame: DepthFrame) {
        let frame = Arc::new(frame);
        self.lock().depth = Some(frame);
    }

    pub fn latest_color(&self) -> Option<Arc<ColorFrame>> {
        self.lock().color.clone()
    }

    pub fn latest_depth(&self) -> Option<Arc<DepthFrame>> {
        self.lock().depth.clone()
    }

    pub fn has_both(&self) -> bool {
        let latest = self.lock();
        latest.color.is_some() && latest.depth.is_some()
    }

    /// Freeze the current pair. Fails with `NotReady` until both feeds delivered.
    pub fn snapshot(&self) -> Result<Snapshot> {
        let latest = self.lock();
        let color = latest
            .color
            .clone()
            .ok_or(PipelineError::NotReady { missing: "color" })?;
        let depth = latest
            .depth
            .clone()
            .ok_or(PipelineError::NotReady { missing: "depth" })?;
        Ok(Snapshot::new(color, depth))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Latest> {
        // Frame handles are swapped atomically, a poisoned guard still holds whole frames.
        self.latest.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
