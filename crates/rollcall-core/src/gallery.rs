//! In-memory gallery of enrolled feature vectors.
//!
//! A snapshot is an immutable pair of parallel collections built by scanning
//! the store; refreshing swaps the whole snapshot atomically, so concurrent
//! readers always see either the old or the new gallery, never a partial one.

use std::sync::{Arc, RwLock};

use thiserror::Error;

use crate::types::{FeatureVector, GalleryEntry};

#[derive(Error, Debug)]
pub enum GalleryError {
    #[error("gallery snapshot mismatch: {vectors} vectors for {entries} entries")]
    LengthMismatch { vectors: usize, entries: usize },
}

/// An immutable gallery snapshot; `vectors[i]` belongs to `entries[i]`.
#[derive(Debug, Clone, Default)]
pub struct GallerySnapshot {
    vectors: Vec<FeatureVector>,
    entries: Vec<GalleryEntry>,
}

impl GallerySnapshot {
    pub fn new(
        vectors: Vec<FeatureVector>,
        entries: Vec<GalleryEntry>,
    ) -> Result<Self, GalleryError> {
        if vectors.len() != entries.len() {
            return Err(GalleryError::LengthMismatch {
                vectors: vectors.len(),
                entries: entries.len(),
            });
        }
        Ok(Self { vectors, entries })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn vectors(&self) -> &[FeatureVector] {
        &self.vectors
    }

    pub fn entries(&self) -> &[GalleryEntry] {
        &self.entries
    }

    pub fn entry(&self, index: usize) -> Option<&GalleryEntry> {
        self.entries.get(index)
    }
}

/// Shared handle to the current snapshot.
///
/// Readers grab an `Arc` and keep matching against it even while a refresh
/// replaces the current snapshot underneath them.
#[derive(Debug, Default)]
pub struct Gallery {
    current: RwLock<Arc<GallerySnapshot>>,
}

impl Gallery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Arc<GallerySnapshot> {
        self.current.read().expect("gallery lock poisoned").clone()
    }

    pub fn replace(&self, snapshot: GallerySnapshot) {
        *self.current.write().expect("gallery lock poisoned") = Arc::new(snapshot);
    }
}
