use anyhow::Result;

use crate::detect::batch::DetectionBatch;
use crate::frame::ColorFrame;

/// Object detector that turns a snapshot color frame into a detection batch.
///
/// The real detector runs out of process and answers on the detection feed;
/// in-process backends exist so the daemon and tests can close the loop.
/// Implementations must return labels sized for the frame they were given.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on one snapshot color frame.
    fn detect(&mut self, frame: &ColorFrame) -> Result<DetectionBatch>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
