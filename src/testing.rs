//! Test fixtures: tiny PNG files and a model that embeds them by pixel content.

use anyhow::Context;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::embeddings::ImageEmbedder;

pub const TEST_DIMENSION: usize = 4;

/// Write a 4x4 single-color PNG and return its path.
pub fn write_png(dir: &Path, name: &str, rgb: [u8; 3]) -> PathBuf {
    let path = dir.join(name);
    let img = image::RgbImage::from_pixel(4, 4, image::Rgb(rgb));
    img.save_with_format(&path, image::ImageFormat::Png).unwrap();
    path
}

/// Embeds an image as its mean RGB plus a constant term, counting invocations.
pub struct PixelEmbedder {
    calls: AtomicUsize,
}

impl PixelEmbedder {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl ImageEmbedder for PixelEmbedder {
    fn dimension(&self) -> usize {
        TEST_DIMENSION
    }

    fn embed(&self, path: &Path) -> anyhow::Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let img = image::open(path)
            .with_context(|| format!("Failed to load image {}", path.display()))?
            .to_rgb8();
        let count = (img.width() * img.height()).max(1) as f32;
        let mut sums = [0.0f32; 3];
        for pixel in img.pixels() {
            for (sum, channel) in sums.iter_mut().zip(pixel.0) {
                *sum += channel as f32 / 255.0;
            }
        }

        Ok(vec![sums[0] / count, sums[1] / count, sums[2] / count, 1.0])
    }
}
