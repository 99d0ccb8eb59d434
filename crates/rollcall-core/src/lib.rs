//! rollcall-core — Face detection, encoding and gallery matching.
//!
//! Face location and feature extraction run via ONNX Runtime behind the
//! [`FeatureExtractor`] trait; matching is a nearest-neighbour search over an
//! in-memory gallery snapshot rebuilt from the attendance store.

pub mod extractor;
pub mod gallery;
pub mod matcher;
pub mod onnx;
pub mod pipeline;
pub mod types;

pub use extractor::{DetectedFace, ExtractorError, FeatureExtractor};
pub use gallery::{Gallery, GalleryError, GallerySnapshot};
pub use matcher::{GalleryHit, Matcher, NearestMatcher, DEFAULT_TOLERANCE};
pub use onnx::OnnxFaceExtractor;
pub use pipeline::{FrameAnalysis, PipelineError, DEFAULT_DOWNSCALE_DIVISOR};
pub use types::{FaceMatch, FaceRegion, FeatureVector, GalleryEntry};

use std::path::PathBuf;

/// Default directory for the ONNX model files.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("rollcall/models")
}
