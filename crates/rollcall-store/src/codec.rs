//! Binary encoding of feature vectors.
//!
//! Layout: a u32 little-endian element count followed by that many f32
//! little-endian values. Length-prefixed and endian-fixed so the persisted
//! form stays portable across languages and architectures.

use rollcall_core::FeatureVector;
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum CodecError {
    #[error("feature blob too short for header")]
    MissingHeader,
    #[error("feature blob truncated: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },
}

pub fn encode_vector(vector: &FeatureVector) -> Vec<u8> {
    let mut blob = Vec::with_capacity(4 + vector.len() * 4);
    blob.extend_from_slice(&(vector.len() as u32).to_le_bytes());
    for value in &vector.values {
        blob.extend_from_slice(&value.to_le_bytes());
    }
    blob
}

pub fn decode_vector(blob: &[u8]) -> Result<FeatureVector, CodecError> {
    let Some(header) = blob.get(..4) else {
        return Err(CodecError::MissingHeader);
    };
    let count = u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as usize;

    let expected = 4 + count * 4;
    if blob.len() != expected {
        return Err(CodecError::Truncated {
            expected,
            actual: blob.len(),
        });
    }

    let values = blob[4..]
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    Ok(FeatureVector::new(values))
}
