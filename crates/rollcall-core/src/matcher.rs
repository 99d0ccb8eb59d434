//! Nearest-neighbour matching of a probe vector against the gallery.

use crate::gallery::GallerySnapshot;
use crate::types::FeatureVector;

/// Default distance tolerance; lower is stricter.
pub const DEFAULT_TOLERANCE: f32 = 0.5;

/// An accepted hit against the gallery.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GalleryHit {
    /// Index into the gallery snapshot.
    pub index: usize,
    pub distance: f32,
    /// `(1 - distance) * 100`.
    pub confidence: f32,
}

/// Strategy for attributing a probe vector to an enrolled student.
pub trait Matcher {
    fn best_match(
        &self,
        probe: &FeatureVector,
        gallery: &GallerySnapshot,
        tolerance: f32,
    ) -> Option<GalleryHit>;
}

/// Euclidean nearest-neighbour matcher.
///
/// Ties resolve to the lowest index, i.e. gallery insertion order.
pub struct NearestMatcher;

impl Matcher for NearestMatcher {
    fn best_match(
        &self,
        probe: &FeatureVector,
        gallery: &GallerySnapshot,
        tolerance: f32,
    ) -> Option<GalleryHit> {
        let mut best: Option<(usize, f32)> = None;

        for (index, vector) in gallery.vectors().iter().enumerate() {
            let distance = probe.distance(vector);
            // Strict improvement keeps the first occurrence on ties.
            if best.map_or(true, |(_, d)| distance < d) {
                best = Some((index, distance));
            }
        }

        let (index, distance) = best?;
        if distance < tolerance {
            Some(GalleryHit {
                index,
                distance,
                confidence: (1.0 - distance) * 100.0,
            })
        } else {
            None
        }
    }
}
