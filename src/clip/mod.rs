//! CLIP (Contrastive Language-Image Pre-training) image embeddings.
//!
//! The default [`ImageEmbedder`](crate::embeddings::ImageEmbedder): a
//! 512-dimensional, L2-normalized vector per image from the ViT-B/32
//! visual encoder.

mod model;

pub use model::ClipEmbedder;
