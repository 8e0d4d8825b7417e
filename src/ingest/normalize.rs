use anyhow::{anyhow, Result};

/// Encodings accepted on the color and depth feeds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Encoding {
    Bgr8,
    Rgb8,
    Bgra8,
    Rgba8,
    Mono8,
    /// 32-bit float depth, one channel.
    Depth32F,
    /// 16-bit unsigned depth, one channel.
    Depth16U,
}

impl Encoding {
    pub fn parse(name: &str) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "bgr8" => Ok(Self::Bgr8),
            "rgb8" => Ok(Self::Rgb8),
            "bgra8" => Ok(Self::Bgra8),
            "rgba8" => Ok(Self::Rgba8),
            "mono8" | "8uc1" => Ok(Self::Mono8),
            "32fc1" => Ok(Self::Depth32F),
            "16uc1" | "mono16" => Ok(Self::Depth16U),
            other => Err(anyhow!("unsupported image encoding '{}'", other)),
        }
    }

    pub fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Bgr8 | Self::Rgb8 => 3,
            Self::Bgra8 | Self::Rgba8 | Self::Depth32F => 4,
            Self::Mono8 => 1,
            Self::Depth16U => 2,
        }
    }

    pub fn is_depth(self) -> bool {
        matches!(self, Self::Depth32F | Self::Depth16U)
    }
}

/// Strip row padding: returns `height` rows of `width * bpp` bytes each.
fn packed_rows<'a>(
    data: &'a [u8],
    width: u32,
    height: u32,
    step: usize,
    bpp: usize,
) -> Result<impl Iterator<Item = &'a [u8]>> {
    let row_len = (width as usize)
        .checked_mul(bpp)
        .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
    let step = if step == 0 { row_len } else { step };
    if step < row_len {
        return Err(anyhow!("row step {} shorter than row length {}", step, row_len));
    }
    let expected = match height as usize {
        0 => 0,
        h => step
            .checked_mul(h - 1)
            .and_then(|v| v.checked_add(row_len))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?,
    };
    if data.len() < expected {
        return Err(anyhow!(
            "frame length mismatch: expected at least {}, got {}",
            expected,
            data.len()
        ));
    }
    Ok((0..height as usize).map(move |row| &data[row * step..row * step + row_len]))
}

/// Convert any color encoding to packed BGR8.
pub(crate) fn normalize_to_bgr(
    data: &[u8],
    width: u32,
    height: u32,
    step: usize,
    encoding: Encoding,
) -> Result<Vec<u8>> {
    if encoding.is_depth() {
        return Err(anyhow!("{:?} is not a color encoding", encoding));
    }
    let bpp = encoding.bytes_per_pixel();
    let rows = packed_rows(data, width, height, step, bpp)?;
    let mut bgr = Vec::with_capacity(data.len() / bpp * 3);
    for row in rows {
        for px in row.chunks_exact(bpp) {
            match encoding {
                Encoding::Bgr8 | Encoding::Bgra8 => bgr.extend_from_slice(&px[..3]),
                Encoding::Rgb8 | Encoding::Rgba8 => bgr.extend_from_slice(&[px[2], px[1], px[0]]),
                // mono8; depth encodings were rejected above
                _ => bgr.extend_from_slice(&[px[0], px[0], px[0]]),
            }
        }
    }
    Ok(bgr)
}

/// Convert a depth encoding to `f32` samples. 16-bit values are cast as-is.
pub(crate) fn normalize_to_depth(
    data: &[u8],
    width: u32,
    height: u32,
    step: usize,
    encoding: Encoding,
    big_endian: bool,
) -> Result<Vec<f32>> {
    if !encoding.is_depth() {
        return Err(anyhow!("{:?} is not a depth encoding", encoding));
    }
    let bpp = encoding.bytes_per_pixel();
    let rows = packed_rows(data, width, height, step, bpp)?;
    let mut samples = Vec::with_capacity(data.len() / bpp);
    for row in rows {
        for px in row.chunks_exact(bpp) {
            let value = match (encoding, big_endian) {
                (Encoding::Depth32F, false) => f32::from_le_bytes([px[0], px[1], px[2], px[3]]),
                (Encoding::Depth32F, true) => f32::from_be_bytes([px[0], px[1], px[2], px[3]]),
                (_, false) => u16::from_le_bytes([px[0], px[1]]) as f32,
                (_, true) => u16::from_be_bytes([px[0], px[1]]) as f32,
            };
            samples.push(value);
        }
    }
    Ok(samples)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rgb_is_swapped_to_bgr() -> Result<()> {
        let rgb = vec![1u8, 2, 3, 4, 5, 6];
        let bgr = normalize_to_bgr(&rgb, 2, 1, 0, Encoding::Rgb8)?;
        assert_eq!(bgr, vec![3, 2, 1, 6, 5, 4]);
        Ok(())
    }

    #[test]
    fn row_padding_is_dropped() -> Result<()> {
        // 1x2 mono image with a 4-byte step.
        let data = vec![10u8, 0, 0, 0, 20];
        let bgr = normalize_to_bgr(&data, 1, 2, 4, Encoding::Mono8)?;
        assert_eq!(bgr, vec![10, 10, 10, 20, 20, 20]);
        Ok(())
    }

    #[test]
    fn bgr_pass_through_validates_length() {
        let pixels = vec![1u8; 8];
        assert!(normalize_to_bgr(&pixels, 1, 3, 0, Encoding::Bgr8).is_err());
        let pixels = vec![1u8; 9];
        assert_eq!(
            normalize_to_bgr(&pixels, 1, 3, 0, Encoding::Bgr8).unwrap(),
            pixels
        );
    }

    #[test]
    fn depth_encodings_decode() -> Result<()> {
        let mut data = Vec::new();
        data.extend_from_slice(&1.5f32.to_le_bytes());
        data.extend_from_slice(&0.25f32.to_le_bytes());
        assert_eq!(
            normalize_to_depth(&data, 2, 1, 0, Encoding::Depth32F, false)?,
            vec![1.5, 0.25]
        );

        let data = [0xE8u8, 0x03, 0x00, 0x00];
        assert_eq!(
            normalize_to_depth(&data, 2, 1, 0, Encoding::Depth16U, false)?,
            vec![1000.0, 0.0]
        );
        Ok(())
    }

    #[test]
    fn oversized_dimensions_are_rejected_before_allocating() {
        let data = vec![0u8; 12];
        assert!(normalize_to_bgr(&data, u32::MAX, u32::MAX, 0, Encoding::Bgr8).is_err());
        assert!(normalize_to_bgr(&data, 100_000, 100_000, 0, Encoding::Bgr8).is_err());
        assert!(normalize_to_depth(&data, u32::MAX, u32::MAX, 0, Encoding::Depth32F, false).is_err());
        assert!(normalize_to_depth(&data, 100_000, 100_000, 0, Encoding::Depth16U, false).is_err());
    }

    #[test]
    fn encodings_are_not_interchangeable() {
        assert!(normalize_to_bgr(&[0; 4], 1, 1, 0, Encoding::Depth32F).is_err());
        assert!(normalize_to_depth(&[0; 3], 1, 1, 0, Encoding::Bgr8, false).is_err());
        assert!(Encoding::parse("yuv422").is_err());
        assert_eq!(Encoding::parse("32FC1").unwrap(), Encoding::Depth32F);
    }
}
