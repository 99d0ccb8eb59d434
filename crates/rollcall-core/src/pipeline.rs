//! Frame-to-decision pipeline: decode, downscale, extract, match, rescale.

use image::imageops::{self, FilterType};
use image::RgbImage;
use serde::Serialize;
use thiserror::Error;

use crate::extractor::{ExtractorError, FeatureExtractor};
use crate::gallery::GallerySnapshot;
use crate::matcher::{Matcher, NearestMatcher};
use crate::types::{FaceMatch, FeatureVector};

/// Frames are shrunk by this divisor (0.25x per dimension) before face
/// location to bound per-frame cost; accepted regions are scaled back up.
pub const DEFAULT_DOWNSCALE_DIVISOR: u32 = 4;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),
    #[error(transparent)]
    Extractor(#[from] ExtractorError),
    #[error("no face found in image")]
    NoFaceFound,
    #[error("expected exactly one face, found {0}")]
    MultipleFacesFound(usize),
}

/// Result of evaluating one frame against the gallery.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FrameAnalysis {
    /// Accepted matches, regions in original-frame coordinates.
    pub matches: Vec<FaceMatch>,
    /// Faces located, matched or not.
    pub faces_detected: usize,
}

/// Decode a transport-encoded image (PNG/JPEG/...) into an RGB raster frame.
pub fn decode_frame(bytes: &[u8]) -> Result<RgbImage, PipelineError> {
    Ok(image::load_from_memory(bytes)?.to_rgb8())
}

/// Locate and match every face in `frame` against `gallery`.
///
/// The frame is downscaled by `divisor` before extraction; accepted match
/// regions are rescaled back to original-frame coordinates. Unmatched faces
/// are counted but not reported.
pub fn analyze_frame(
    extractor: &mut dyn FeatureExtractor,
    frame: &RgbImage,
    gallery: &GallerySnapshot,
    tolerance: f32,
    divisor: u32,
) -> Result<FrameAnalysis, PipelineError> {
    let divisor = divisor.max(1);
    let small;
    let scan: &RgbImage = if divisor == 1 {
        frame
    } else {
        small = imageops::resize(
            frame,
            (frame.width() / divisor).max(1),
            (frame.height() / divisor).max(1),
            FilterType::Triangle,
        );
        &small
    };

    let faces = extractor.extract(scan)?;
    let matcher = NearestMatcher;

    let mut matches = Vec::new();
    for face in &faces {
        let Some(hit) = matcher.best_match(&face.vector, gallery, tolerance) else {
            continue;
        };
        // Index is in-bounds by the snapshot's parallel-length invariant.
        let Some(entry) = gallery.entry(hit.index) else {
            continue;
        };
        matches.push(FaceMatch {
            student_id: entry.student_id,
            name: entry.name.clone(),
            region: face.region.scaled(divisor),
            distance: hit.distance,
            confidence: hit.confidence,
        });
    }

    Ok(FrameAnalysis {
        matches,
        faces_detected: faces.len(),
    })
}

/// Extract the feature vector of the single face in an enrollment photo.
///
/// Runs at full resolution; zero or multiple faces reject the enrollment.
pub fn encode_single_face(
    extractor: &mut dyn FeatureExtractor,
    frame: &RgbImage,
) -> Result<FeatureVector, PipelineError> {
    let mut faces = extractor.extract(frame)?;
    match faces.len() {
        0 => Err(PipelineError::NoFaceFound),
        1 => Ok(faces.remove(0).vector),
        n => Err(PipelineError::MultipleFacesFound(n)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractor::DetectedFace;
    use crate::types::{FaceRegion, GalleryEntry};

    struct StubExtractor {
        faces: Vec<DetectedFace>,
    }

    impl FeatureExtractor for StubExtractor {
        fn extract(&mut self, _frame: &RgbImage) -> Result<Vec<DetectedFace>, ExtractorError> {
            Ok(self.faces.clone())
        }
    }

    fn gallery_of(vectors: Vec<Vec<f32>>) -> GallerySnapshot {
        let entries = vectors
            .iter()
            .enumerate()
            .map(|(i, _)| GalleryEntry {
                student_id: i as i64 + 1,
                name: format!("student-{}", i + 1),
            })
            .collect();
        GallerySnapshot::new(vectors.into_iter().map(FeatureVector::new).collect(), entries)
            .unwrap()
    }

    fn face(region: FaceRegion, values: Vec<f32>) -> DetectedFace {
        DetectedFace {
            region,
            vector: FeatureVector::new(values),
        }
    }

    fn blank_frame() -> RgbImage {
        RgbImage::from_pixel(64, 64, image::Rgb([128, 128, 128]))
    }

    #[test]
    fn test_decode_frame_rejects_garbage() {
        assert!(matches!(
            decode_frame(b"definitely not an image"),
            Err(PipelineError::Decode(_))
        ));
    }

    #[test]
    fn test_decode_frame_roundtrip() {
        let img = RgbImage::from_pixel(8, 8, image::Rgb([10, 200, 30]));
        let mut bytes = Vec::new();
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();

        let decoded = decode_frame(&bytes).unwrap();
        assert_eq!(decoded.dimensions(), (8, 8));
        assert_eq!(decoded.get_pixel(3, 3).0, [10, 200, 30]);
    }

    #[test]
    fn test_analyze_rescales_regions_to_original_coordinates() {
        let mut extractor = StubExtractor {
            faces: vec![face(FaceRegion::new(5, 20, 15, 10), vec![0.0, 0.0])],
        };
        let gallery = gallery_of(vec![vec![0.1, 0.0]]);

        let analysis = analyze_frame(
            &mut extractor,
            &blank_frame(),
            &gallery,
            0.5,
            DEFAULT_DOWNSCALE_DIVISOR,
        )
        .unwrap();

        assert_eq!(analysis.matches.len(), 1);
        // Downscaled (5,20,15,10) reports at (20,80,60,40).
        assert_eq!(analysis.matches[0].region, FaceRegion::new(20, 80, 60, 40));
    }

    #[test]
    fn test_analyze_counts_unmatched_faces() {
        let mut extractor = StubExtractor {
            faces: vec![
                face(FaceRegion::new(0, 10, 10, 0), vec![0.0, 0.0]),
                face(FaceRegion::new(0, 30, 10, 20), vec![9.0, 9.0]),
            ],
        };
        let gallery = gallery_of(vec![vec![0.1, 0.0]]);

        let analysis = analyze_frame(&mut extractor, &blank_frame(), &gallery, 0.5, 4).unwrap();
        assert_eq!(analysis.faces_detected, 2);
        assert_eq!(analysis.matches.len(), 1);
        assert_eq!(analysis.matches[0].student_id, 1);
    }

    #[test]
    fn test_analyze_empty_gallery_is_no_match() {
        let mut extractor = StubExtractor {
            faces: vec![face(FaceRegion::new(0, 10, 10, 0), vec![0.0, 0.0])],
        };

        let analysis =
            analyze_frame(&mut extractor, &blank_frame(), &GallerySnapshot::empty(), 0.5, 4)
                .unwrap();
        assert_eq!(analysis.faces_detected, 1);
        assert!(analysis.matches.is_empty());
    }

    #[test]
    fn test_encode_single_face_rejects_none() {
        let mut extractor = StubExtractor { faces: vec![] };
        assert!(matches!(
            encode_single_face(&mut extractor, &blank_frame()),
            Err(PipelineError::NoFaceFound)
        ));
    }

    #[test]
    fn test_encode_single_face_rejects_multiple() {
        let mut extractor = StubExtractor {
            faces: vec![
                face(FaceRegion::new(0, 10, 10, 0), vec![1.0]),
                face(FaceRegion::new(0, 30, 10, 20), vec![2.0]),
            ],
        };
        assert!(matches!(
            encode_single_face(&mut extractor, &blank_frame()),
            Err(PipelineError::MultipleFacesFound(2))
        ));
    }

    #[test]
    fn test_encode_single_face_returns_vector() {
        let mut extractor = StubExtractor {
            faces: vec![face(FaceRegion::new(0, 10, 10, 0), vec![0.25, 0.75])],
        };
        let vector = encode_single_face(&mut extractor, &blank_frame()).unwrap();
        assert_eq!(vector.values, vec![0.25, 0.75]);
    }
}
