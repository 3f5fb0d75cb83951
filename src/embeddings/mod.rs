//! Per-image embeddings: the vector type, the model seam and the caching store.

mod store;
mod vector;

use std::path::Path;

pub use store::EmbeddingStore;
pub use vector::Embedding;

/// A pretrained model mapping an image file to a fixed-length vector.
///
/// Implementations are blocking; callers run them on the blocking pool.
pub trait ImageEmbedder: Send + Sync {
    /// Length of every vector `embed` returns.
    fn dimension(&self) -> usize;

    fn embed(&self, path: &Path) -> anyhow::Result<Vec<f32>>;
}
