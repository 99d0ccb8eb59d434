//! ONNX-backed face extractor.
//!
//! Wraps two ONNX Runtime sessions: an SCRFD-family detection model locating
//! face boxes, and an ArcFace-family embedding model turning a face crop into
//! a fixed-length feature vector. Both models are consumed as-is; this module
//! only does tensor plumbing and coordinate mapping.

use std::path::Path;

use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;

use crate::extractor::{DetectedFace, ExtractorError, FeatureExtractor};
use crate::types::{FaceRegion, FeatureVector};

// --- Detection model constants ---
const DET_INPUT_SIZE: u32 = 640;
const DET_MEAN: f32 = 127.5;
const DET_STD: f32 = 128.0;
const DET_SCORE_THRESHOLD: f32 = 0.5;
const DET_NMS_IOU: f32 = 0.4;
const DET_STRIDES: [usize; 3] = [8, 16, 32];
const DET_ANCHORS_PER_CELL: usize = 2;

// --- Embedding model constants (symmetric normalization) ---
const EMBED_INPUT_SIZE: u32 = 112;
const EMBED_MEAN: f32 = 127.5;
const EMBED_STD: f32 = 127.5;
const EMBED_DIM: usize = 512;

/// A raw detection in detector-input coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
struct RawDetection {
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
    score: f32,
}

/// Face extractor backed by ONNX Runtime sessions.
pub struct OnnxFaceExtractor {
    detector: Session,
    embedder: Session,
}

impl OnnxFaceExtractor {
    /// Load both models. Fails fast when either file is missing.
    pub fn load(detector_path: &Path, embedder_path: &Path) -> Result<Self, ExtractorError> {
        let detector = load_session(detector_path)?;
        let embedder = load_session(embedder_path)?;

        let det_outputs = detector.outputs().len();
        if det_outputs < 6 {
            return Err(ExtractorError::InferenceFailed(format!(
                "detection model must expose score and bbox tensors for strides {DET_STRIDES:?}, got {det_outputs} outputs"
            )));
        }

        tracing::info!(
            detector = %detector_path.display(),
            embedder = %embedder_path.display(),
            "face extractor models loaded"
        );

        Ok(Self { detector, embedder })
    }

    /// Locate faces, returning regions in frame coordinates.
    fn detect_regions(&mut self, frame: &RgbImage) -> Result<Vec<FaceRegion>, ExtractorError> {
        let input = det_preprocess(frame);
        let outputs = self
            .detector
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let mut detections = Vec::new();
        // Output layout: [0-2] = scores for strides 8/16/32, [3-5] = bboxes.
        for (pos, &stride) in DET_STRIDES.iter().enumerate() {
            let (_, scores) = outputs[pos]
                .try_extract_tensor::<f32>()
                .map_err(|e| ExtractorError::InferenceFailed(format!("scores stride {stride}: {e}")))?;
            let (_, bboxes) = outputs[pos + DET_STRIDES.len()]
                .try_extract_tensor::<f32>()
                .map_err(|e| ExtractorError::InferenceFailed(format!("bboxes stride {stride}: {e}")))?;

            decode_stride(scores, bboxes, stride, DET_SCORE_THRESHOLD, &mut detections);
        }

        let kept = nms(detections, DET_NMS_IOU);

        let sx = frame.width() as f32 / DET_INPUT_SIZE as f32;
        let sy = frame.height() as f32 / DET_INPUT_SIZE as f32;
        Ok(kept
            .iter()
            .filter_map(|det| to_frame_region(det, sx, sy, frame.width(), frame.height()))
            .collect())
    }

    /// Compute the feature vector for one face region.
    fn embed_region(
        &mut self,
        frame: &RgbImage,
        region: &FaceRegion,
    ) -> Result<FeatureVector, ExtractorError> {
        let crop = crop_face(frame, region);
        let input = embed_preprocess(&crop);

        let outputs = self
            .embedder
            .run(ort::inputs![TensorRef::from_array_view(input.view())?])?;
        let (_, raw) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| ExtractorError::InferenceFailed(format!("embedding extraction: {e}")))?;

        if raw.len() != EMBED_DIM {
            return Err(ExtractorError::InferenceFailed(format!(
                "expected {EMBED_DIM}-dim embedding, got {}",
                raw.len()
            )));
        }

        Ok(FeatureVector::new(l2_normalize(raw)))
    }
}

impl FeatureExtractor for OnnxFaceExtractor {
    fn extract(&mut self, frame: &RgbImage) -> Result<Vec<DetectedFace>, ExtractorError> {
        let regions = self.detect_regions(frame)?;
        tracing::debug!(faces = regions.len(), "faces located");

        let mut faces = Vec::with_capacity(regions.len());
        for region in regions {
            let vector = self.embed_region(frame, &region)?;
            faces.push(DetectedFace { region, vector });
        }
        Ok(faces)
    }
}

fn load_session(path: &Path) -> Result<Session, ExtractorError> {
    if !path.exists() {
        return Err(ExtractorError::ModelNotFound(path.display().to_string()));
    }
    Ok(Session::builder()?
        .with_intra_threads(2)?
        .commit_from_file(path)?)
}

/// Resize to the square detector input and build a normalized NCHW tensor.
fn det_preprocess(frame: &RgbImage) -> Array4<f32> {
    let resized = imageops::resize(frame, DET_INPUT_SIZE, DET_INPUT_SIZE, FilterType::Triangle);
    let size = DET_INPUT_SIZE as usize;

    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
    for (x, y, pixel) in resized.enumerate_pixels() {
        for channel in 0..3 {
            tensor[[0, channel, y as usize, x as usize]] =
                (pixel.0[channel] as f32 - DET_MEAN) / DET_STD;
        }
    }
    tensor
}

/// Decode anchor-free score/bbox tensors for one stride level.
fn decode_stride(
    scores: &[f32],
    bboxes: &[f32],
    stride: usize,
    threshold: f32,
    out: &mut Vec<RawDetection>,
) {
    let grid = DET_INPUT_SIZE as usize / stride;
    let num_anchors = grid * grid * DET_ANCHORS_PER_CELL;

    for idx in 0..num_anchors {
        let score = scores.get(idx).copied().unwrap_or(0.0);
        if score <= threshold {
            continue;
        }

        let bbox_off = idx * 4;
        if bbox_off + 3 >= bboxes.len() {
            continue;
        }

        let cell = idx / DET_ANCHORS_PER_CELL;
        let anchor_cx = ((cell % grid) * stride) as f32;
        let anchor_cy = ((cell / grid) * stride) as f32;

        // Offsets are in stride units around the anchor centre.
        out.push(RawDetection {
            x1: anchor_cx - bboxes[bbox_off] * stride as f32,
            y1: anchor_cy - bboxes[bbox_off + 1] * stride as f32,
            x2: anchor_cx + bboxes[bbox_off + 2] * stride as f32,
            y2: anchor_cy + bboxes[bbox_off + 3] * stride as f32,
            score,
        });
    }
}

/// Non-maximum suppression, highest score first.
fn nms(mut detections: Vec<RawDetection>, iou_threshold: f32) -> Vec<RawDetection> {
    detections.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut kept: Vec<RawDetection> = Vec::new();
    for det in detections {
        if kept.iter().all(|k| iou(k, &det) <= iou_threshold) {
            kept.push(det);
        }
    }
    kept
}

fn iou(a: &RawDetection, b: &RawDetection) -> f32 {
    let ix = (a.x2.min(b.x2) - a.x1.max(b.x1)).max(0.0);
    let iy = (a.y2.min(b.y2) - a.y1.max(b.y1)).max(0.0);
    let inter = ix * iy;

    let area_a = (a.x2 - a.x1).max(0.0) * (a.y2 - a.y1).max(0.0);
    let area_b = (b.x2 - b.x1).max(0.0) * (b.y2 - b.y1).max(0.0);
    let union = area_a + area_b - inter;

    if union > 0.0 {
        inter / union
    } else {
        0.0
    }
}

/// Map a detection from detector-input space to a clamped frame region.
///
/// Returns `None` for degenerate boxes that collapse after clamping.
fn to_frame_region(
    det: &RawDetection,
    sx: f32,
    sy: f32,
    frame_w: u32,
    frame_h: u32,
) -> Option<FaceRegion> {
    let left = (det.x1 * sx).round().clamp(0.0, frame_w as f32) as u32;
    let right = (det.x2 * sx).round().clamp(0.0, frame_w as f32) as u32;
    let top = (det.y1 * sy).round().clamp(0.0, frame_h as f32) as u32;
    let bottom = (det.y2 * sy).round().clamp(0.0, frame_h as f32) as u32;

    if right <= left || bottom <= top {
        return None;
    }
    Some(FaceRegion::new(top, right, bottom, left))
}

/// Crop the face region and resize to the embedding input size.
fn crop_face(frame: &RgbImage, region: &FaceRegion) -> RgbImage {
    let crop = imageops::crop_imm(frame, region.left, region.top, region.width(), region.height())
        .to_image();
    imageops::resize(&crop, EMBED_INPUT_SIZE, EMBED_INPUT_SIZE, FilterType::Triangle)
}

/// Build a normalized NCHW tensor from a 112x112 face crop.
fn embed_preprocess(crop: &RgbImage) -> Array4<f32> {
    let size = EMBED_INPUT_SIZE as usize;
    let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
    for (x, y, pixel) in crop.enumerate_pixels() {
        for channel in 0..3 {
            tensor[[0, channel, y as usize, x as usize]] =
                (pixel.0[channel] as f32 - EMBED_MEAN) / EMBED_STD;
        }
    }
    tensor
}

fn l2_normalize(raw: &[f32]) -> Vec<f32> {
    let norm: f32 = raw.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        raw.iter().map(|x| x / norm).collect()
    } else {
        raw.to_vec()
    }
}
