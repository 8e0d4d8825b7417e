//! Frame ingestion.
//!
//! Camera feeds deliver `RawImage` messages; this module decodes them into
//! `ColorFrame` (BGR8) and `DepthFrame` (f32) values for the frame buffer.
//! A decode failure concerns only that one message: callers drop it and keep
//! the previous latest frame.
//!
//! - `normalize`: encoding conversion with row-stride handling
//! - `synthetic`: `stub://` camera producing matched color + depth frames

mod normalize;
pub mod synthetic;

use anyhow::{anyhow, Result};

use crate::frame::{ColorFrame, DepthFrame};

pub use normalize::Encoding;
pub use synthetic::{SyntheticCamera, SyntheticCameraConfig, SyntheticObject};

/// Image message as published by a camera driver.
#[derive(Clone, Debug)]
pub struct RawImage {
    pub width: u32,
    pub height: u32,
    /// Encoding name, e.g. `bgr8`, `rgb8`, `32FC1`, `16UC1`.
    pub encoding: String,
    /// Bytes per row; zero means tightly packed.
    pub step: usize,
    pub big_endian: bool,
    pub data: Vec<u8>,
}

impl RawImage {
    pub fn packed(width: u32, height: u32, encoding: &str, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            encoding: encoding.to_string(),
            step: 0,
            big_endian: false,
            data,
        }
    }

    /// Tightly packed little-endian `32FC1` message.
    pub fn from_depth_samples(width: u32, height: u32, samples: &[f32]) -> Self {
        let data = samples.iter().flat_map(|v| v.to_le_bytes()).collect();
        Self::packed(width, height, "32FC1", data)
    }
}

/// Decode a color message to BGR8.
pub fn decode_color(msg: &RawImage) -> Result<ColorFrame> {
    check_dimensions(msg)?;
    let encoding = Encoding::parse(&msg.encoding)?;
    let bgr = normalize::normalize_to_bgr(&msg.data, msg.width, msg.height, msg.step, encoding)?;
    ColorFrame::from_bgr(msg.width, msg.height, bgr)
        .ok_or_else(|| anyhow!("color frame {}x{} size mismatch", msg.width, msg.height))
}

/// Decode a depth message to one `f32` per pixel.
pub fn decode_depth(msg: &RawImage) -> Result<DepthFrame> {
    check_dimensions(msg)?;
    let encoding = Encoding::parse(&msg.encoding)?;
    let samples = normalize::normalize_to_depth(
        &msg.data,
        msg.width,
        msg.height,
        msg.step,
        encoding,
        msg.big_endian,
    )?;
    DepthFrame::from_samples(msg.width, msg.height, samples)
        .ok_or_else(|| anyhow!("depth frame {}x{} size mismatch", msg.width, msg.height))
}

fn check_dimensions(msg: &RawImage) -> Result<()> {
    if msg.width == 0 || msg.height == 0 {
        return Err(anyhow!("empty {}x{} frame", msg.width, msg.height));
    }
    Ok(())
}
