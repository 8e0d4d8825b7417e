//! Request/response facade over the pipeline: one call triggers a cycle and
//! waits for its closest object.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::error::{PipelineError, Result};
use crate::pipeline::DetectionPipeline;
use crate::select::DepthPose;

#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct DepthPoseResponse {
    pub success: bool,
    pub pose: Option<DepthPose>,
}

impl DepthPoseResponse {
    fn found(pose: DepthPose) -> Self {
        Self {
            success: true,
            pose: Some(pose),
        }
    }

    fn not_found() -> Self {
        Self {
            success: false,
            pose: None,
        }
    }
}

#[derive(Clone)]
pub struct DepthPoseService {
    pipeline: Arc<DetectionPipeline>,
}

impl DepthPoseService {
    pub fn new(pipeline: Arc<DetectionPipeline>) -> Self {
        Self { pipeline }
    }

    /// Trigger a cycle and wait up to `timeout` for the closest object.
    ///
    /// A cycle with no objects is an unsuccessful response, not an error.
    pub fn call(&self, timeout: Duration) -> Result<DepthPoseResponse> {
        let generation = self.pipeline.trigger()?;
        log::debug!("depth pose request: cycle #{}", generation);
        match self.pipeline.query(timeout) {
            Ok(closest) => Ok(DepthPoseResponse::found(closest.pose())),
            Err(PipelineError::Empty) => Ok(DepthPoseResponse::not_found()),
            Err(err) => Err(err),
        }
    }
}
