mod backend;
mod batch;
mod mask;
mod stub;

pub use backend::DetectorBackend;
pub use batch::{BoundingBox, DetectedObject, DetectionBatch, DetectionMessage};
pub use mask::{reconstruct, ObjectMask};
pub use stub::StubBackend;
