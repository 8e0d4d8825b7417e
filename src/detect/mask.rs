//! Per-object label masks sliced out of a detection batch.

use crate::detect::batch::DetectionBatch;
use crate::error::{PipelineError, Result};

/// Borrowed `width` x `height` view into one object's block of labels.
///
/// Construction validates offset and length, so indexing inside the view
/// never leaves the owning batch's buffer.
#[derive(Clone, Copy, Debug)]
pub struct ObjectMask<'a> {
    labels: &'a [i16],
    width: u32,
    height: u32,
}

impl<'a> ObjectMask<'a> {
    fn new(labels: &'a [i16], width: u32, height: u32) -> Self {
        debug_assert_eq!(labels.len(), width as usize * height as usize);
        Self {
            labels,
            width,
            height,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Raw label at `(x, y)`, `None` outside the mask.
    pub fn label(&self, x: u32, y: u32) -> Option<i16> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.labels
            .get(y as usize * self.width as usize + x as usize)
            .copied()
    }

    pub fn is_member(&self, x: u32, y: u32) -> bool {
        self.label(x, y).is_some_and(|label| label != 0)
    }

    pub fn member_count(&self) -> usize {
        self.labels.iter().filter(|&&label| label != 0).count()
    }

    /// Row-major iterator over `(x, y)` of member pixels.
    pub fn members(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        let width = self.width as usize;
        self.labels
            .iter()
            .enumerate()
            .filter(|(_, &label)| label != 0)
            .map(move |(idx, _)| ((idx % width) as u32, (idx / width) as u32))
    }
}

/// Split `batch.labels` into one mask per object for a `width` x `height` frame.
///
/// Fails with `MalformedBatch` when the label array is not exactly
/// `objects * width * height` long or any box leaves the frame.
pub fn reconstruct(batch: &DetectionBatch, width: u32, height: u32) -> Result<Vec<ObjectMask<'_>>> {
    let count = batch.objects.len();
    let plane = (width as usize)
        .checked_mul(height as usize)
        .ok_or_else(|| PipelineError::malformed("frame dimensions overflow"))?;
    let expected = plane
        .checked_mul(count)
        .ok_or_else(|| PipelineError::malformed("label array size overflows"))?;

    if batch.labels.len() != expected {
        return Err(PipelineError::malformed(format!(
            "expected {} labels for {} objects at {}x{}, got {}",
            expected,
            count,
            width,
            height,
            batch.labels.len()
        )));
    }
    if count == 0 {
        return Ok(Vec::new());
    }
    if plane == 0 {
        return Err(PipelineError::malformed("objects reported on an empty frame"));
    }

    for (i, object) in batch.objects.iter().enumerate() {
        object.bbox.check_within(width, height).map_err(|err| match err {
            PipelineError::MalformedBatch(msg) => {
                PipelineError::MalformedBatch(format!("object #{}: {}", i + 1, msg))
            }
            other => other,
        })?;
    }

    Ok(batch
        .labels
        .chunks_exact(plane)
        .map(|block| ObjectMask::new(block, width, height))
        .collect())
}
