pub mod onnx;
pub mod ssd;

use crate::camera::Frame;
use crate::error::Result;
use crate::landmarks::Landmarks;

// define the LandmarkDetector trait
pub trait LandmarkDetector: Send {
    /// Runs the model on `frame`. Returns zero or more detections, each with
    /// points normalized to the full (unmirrored) frame.
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Landmarks>>;
}

impl<D: LandmarkDetector + ?Sized> LandmarkDetector for Box<D> {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Landmarks>> {
        (**self).detect(frame)
    }
}
