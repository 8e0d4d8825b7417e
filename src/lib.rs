//! Depth-anchored object masking.
//!
//! This crate correlates three asynchronous streams (color frames, depth
//! frames and object-detector output) into a single masking result: a
//! composited image plus a list of detected objects, each annotated with its
//! pixel center and depth.
//!
//! # Cycle
//!
//! 1. Camera feeds keep the [`FrameBuffer`] current.
//! 2. [`DetectionPipeline::trigger`] freezes a color/depth [`Snapshot`] and
//!    hands its color frame to the detector.
//! 3. The detector's [`DetectionBatch`] is reconstructed into per-object
//!    masks, composited and summarized once.
//! 4. [`DetectionPipeline::query`] returns the closest object, blocking up to
//!    a timeout while the cycle is pending.
//!
//! # Module Structure
//!
//! - `frame`: frames, snapshots and the frame buffer
//! - `detect`: detection batches, mask reconstruction, detector backends
//! - `compose`: overlay rendering
//! - `select`: object summaries and closest-object selection
//! - `pipeline`: the trigger/detect/query state machine
//! - `service`: request/response facade
//! - `circle`: auxiliary dark-blob path
//! - `ingest`: message decoding and the synthetic camera
//! - `transport`: output sinks

pub mod blob;
pub mod circle;
pub mod compose;
pub mod config;
pub mod detect;
pub mod error;
pub mod font;
pub mod frame;
pub mod ingest;
pub mod pipeline;
pub mod select;
pub mod service;
pub mod transport;
pub mod ui;

pub use compose::{composite, label_text, Palette, PaletteSource};
pub use detect::{
    reconstruct, BoundingBox, DetectedObject, DetectionBatch, DetectionMessage, DetectorBackend,
    ObjectMask, StubBackend,
};
pub use error::{PipelineError, Result};
pub use frame::{
    is_valid_depth, ColorFrame, DepthFrame, FrameBuffer, Pixel, PixelFormat, Snapshot, NO_DEPTH,
};
pub use pipeline::{CompletedCycle, DetectionPipeline, PipelineSettings, PipelineState};
pub use select::{
    build_results, select_closest, DepthPolicy, DepthPose, DetectionResult, ObjectSummary,
};
pub use service::{DepthPoseResponse, DepthPoseService};
pub use transport::{ChannelSink, CycleStatus, NullSink, PipelineOutput, PipelineSink};
