//! Active-learning labeler for pairwise image similarity.
//!
//! Images in a directory are embedded once and stored in SQLite. A small
//! classifier scores unlabeled pairs, the best one is offered to a human,
//! and every submitted label retrains the classifier in the background.
//! [`labeler::Labeler`] ties the pieces together.

pub mod annotations;
pub mod classifier;
pub mod clip;
pub mod config;
pub mod db;
pub mod embeddings;
pub mod error;
pub mod labeler;
pub mod logging;
pub mod scanner;
pub mod selection;
pub mod training;

#[cfg(test)]
mod testing;

pub use error::{Error, Result};
