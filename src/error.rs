use std::time::Duration;

use thiserror::Error;

/// Failures surfaced by the masking pipeline to its immediate caller.
///
/// None of these are fatal to the pipeline: the state machine keeps running
/// and the caller decides whether to retry.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    /// No color or no depth frame has arrived yet.
    #[error("no {missing} frame available yet")]
    NotReady { missing: &'static str },

    /// Detector payload disagrees with the declared dimensions.
    #[error("malformed detection batch: {0}")]
    MalformedBatch(String),

    /// The detection cycle completed with zero objects.
    #[error("no object found")]
    Empty,

    /// A blocking query exceeded its wait budget.
    #[error("detection did not complete within {0:?}")]
    Timeout(Duration),

    /// Query issued before any trigger.
    #[error("query before any trigger")]
    NotTriggered,

    /// Object id does not exist in the current result set.
    #[error("object #{id} does not exist (max {max})")]
    UnknownObject { id: usize, max: usize },
}

impl PipelineError {
    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedBatch(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
