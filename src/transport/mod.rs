//! Output side of the pipeline.
//!
//! `PipelineSink` is the boundary to whatever carries results onward
//! (topics, windows, recorders). Every method defaults to a no-op so a sink
//! only implements the outputs it cares about.
//!
//! - `NullSink`: drops everything
//! - `ChannelSink`: forwards `PipelineOutput` values over an `mpsc` channel

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;

use crate::frame::ColorFrame;
use crate::select::DepthPose;

/// Progress of a detection cycle, for status displays.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CycleStatus {
    /// Snapshot published, waiting for the detector.
    Searching,
    /// Cycle completed with this many objects.
    Found(usize),
    /// Cycle completed with zero objects.
    NoResult,
    /// Batch rejected; the cycle is still waiting.
    Rejected,
}

pub trait PipelineSink: Send + Sync {
    /// Snapshot color frame for the external detector, once per trigger.
    /// `generation` identifies the cycle; hand it back with the batch.
    fn detector_input(&self, _generation: u64, _frame: Arc<ColorFrame>) {}

    /// Composited result image, once per completed cycle.
    fn masked_result(&self, _frame: Arc<ColorFrame>) {}

    /// Pose of an object picked from the current result set.
    fn object_pose(&self, _pose: DepthPose) {}

    /// Pose of the strongest blob on the circle path.
    fn circle_pose(&self, _pose: DepthPose) {}

    /// Rendered circle-path view for the latest color frame.
    fn circle_result(&self, _frame: Arc<ColorFrame>) {}

    fn cycle_status(&self, _status: CycleStatus) {}
}

/// Sink that discards every output.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSink;

impl PipelineSink for NullSink {}

/// Everything a `ChannelSink` forwards.
#[derive(Clone, Debug)]
pub enum PipelineOutput {
    DetectorInput(u64, Arc<ColorFrame>),
    MaskedResult(Arc<ColorFrame>),
    ObjectPose(DepthPose),
    CirclePose(DepthPose),
    CircleResult(Arc<ColorFrame>),
    CycleStatus(CycleStatus),
}

/// Sink that forwards outputs to a receiver.
///
/// A dropped receiver is not an error: outputs are simply lost.
pub struct ChannelSink {
    tx: Sender<PipelineOutput>,
}

impl ChannelSink {
    pub fn new() -> (Self, Receiver<PipelineOutput>) {
        let (tx, rx) = mpsc::channel();
        (Self { tx }, rx)
    }

    fn send(&self, output: PipelineOutput) {
        if self.tx.send(output).is_err() {
            log::debug!("pipeline output dropped: receiver gone");
        }
    }
}

impl PipelineSink for ChannelSink {
    fn detector_input(&self, generation: u64, frame: Arc<ColorFrame>) {
        self.send(PipelineOutput::DetectorInput(generation, frame));
    }

    fn masked_result(&self, frame: Arc<ColorFrame>) {
        self.send(PipelineOutput::MaskedResult(frame));
    }

    fn object_pose(&self, pose: DepthPose) {
        self.send(PipelineOutput::ObjectPose(pose));
    }

    fn circle_pose(&self, pose: DepthPose) {
        self.send(PipelineOutput::CirclePose(pose));
    }

    fn circle_result(&self, frame: Arc<ColorFrame>) {
        self.send(PipelineOutput::CircleResult(frame));
    }

    fn cycle_status(&self, status: CycleStatus) {
        self.send(PipelineOutput::CycleStatus(status));
    }
}
