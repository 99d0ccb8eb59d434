//! Face extraction capability boundary.

use image::RgbImage;
use thiserror::Error;

use crate::types::{FaceRegion, FeatureVector};

#[derive(Error, Debug)]
pub enum ExtractorError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// One located face: where it is in the input frame, and its feature vector.
#[derive(Debug, Clone)]
pub struct DetectedFace {
    pub region: FaceRegion,
    pub vector: FeatureVector,
}

/// Locates face regions in a frame and computes one feature vector per region.
///
/// The extraction algorithm itself is opaque to the rest of the system; the
/// production implementation is [`crate::OnnxFaceExtractor`], tests substitute
/// doubles.
pub trait FeatureExtractor {
    fn extract(&mut self, frame: &RgbImage) -> Result<Vec<DetectedFace>, ExtractorError>;
}
