use std::sync::Arc;

use crate::error::{Error, Result};

/// Fixed-length image embedding.
///
/// Cheap to clone: the values are shared. Persisted as a little-endian
/// `f32` array, four bytes per element.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding(Arc<[f32]>);

impl Embedding {
    pub fn new(values: Vec<f32>) -> Self {
        Self(values.into())
    }

    pub fn dimension(&self) -> usize {
        self.0.len()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }

    /// Convert to bytes for storage
    pub fn to_le_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.0.len() * 4);
        for &val in self.0.iter() {
            bytes.extend_from_slice(&val.to_le_bytes());
        }
        bytes
    }

    /// Decode a stored blob, which must hold exactly `dimension` values.
    pub fn from_le_bytes(bytes: &[u8], dimension: usize) -> Result<Self> {
        if bytes.len() != dimension * 4 {
            return Err(Error::Decode {
                len: bytes.len(),
                expected: dimension,
            });
        }

        let values = bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();
        Ok(Self::new(values))
    }
}
