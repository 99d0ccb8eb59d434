use serde::{Deserialize, Serialize};

/// Face region in frame coordinates, `(top, right, bottom, left)`.
///
/// The tuple ordering follows the detector's row/column convention; all four
/// values are pixel offsets into the frame the region was located in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaceRegion {
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
    pub left: u32,
}

impl FaceRegion {
    pub fn new(top: u32, right: u32, bottom: u32, left: u32) -> Self {
        Self {
            top,
            right,
            bottom,
            left,
        }
    }

    /// Scale every coordinate by `factor`, mapping a region located in a
    /// downscaled frame back to original-frame coordinates.
    pub fn scaled(self, factor: u32) -> Self {
        Self {
            top: self.top * factor,
            right: self.right * factor,
            bottom: self.bottom * factor,
            left: self.left * factor,
        }
    }

    pub fn width(&self) -> u32 {
        self.right.saturating_sub(self.left)
    }

    pub fn height(&self) -> u32 {
        self.bottom.saturating_sub(self.top)
    }
}

/// Fixed-length face feature vector.
///
/// The dimension is set by whichever model produced the vector; distances are
/// only meaningful between vectors of the same dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub values: Vec<f32>,
}

impl FeatureVector {
    pub fn new(values: Vec<f32>) -> Self {
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Euclidean distance to another vector.
    pub fn distance(&self, other: &FeatureVector) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }
}

/// One enrolled student as seen by the matcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GalleryEntry {
    pub student_id: i64,
    pub name: String,
}

/// An accepted match for one located face, in original-frame coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceMatch {
    pub student_id: i64,
    pub name: String,
    pub region: FaceRegion,
    pub distance: f32,
    pub confidence: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_scaled() {
        let region = FaceRegion::new(10, 40, 30, 20);
        assert_eq!(region.scaled(4), FaceRegion::new(40, 160, 120, 80));
    }

    #[test]
    fn test_region_dimensions() {
        let region = FaceRegion::new(10, 40, 30, 20);
        assert_eq!(region.width(), 20);
        assert_eq!(region.height(), 20);
    }

    #[test]
    fn test_distance_identical() {
        let a = FeatureVector::new(vec![1.0, 2.0, 3.0]);
        assert_eq!(a.distance(&a), 0.0);
    }

    #[test]
    fn test_distance_unit_axes() {
        let a = FeatureVector::new(vec![1.0, 0.0]);
        let b = FeatureVector::new(vec![0.0, 1.0]);
        assert!((a.distance(&b) - std::f32::consts::SQRT_2).abs() < 1e-6);
    }

    #[test]
    fn test_distance_symmetric() {
        let a = FeatureVector::new(vec![0.5, -1.5, 2.0]);
        let b = FeatureVector::new(vec![-0.5, 0.5, 1.0]);
        assert!((a.distance(&b) - b.distance(&a)).abs() < 1e-6);
    }
}
