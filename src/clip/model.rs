//! CLIP visual encoder using ONNX Runtime

use anyhow::{anyhow, Context, Result};
use image::DynamicImage;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

use crate::config::EmbeddingConfig;
use crate::embeddings::ImageEmbedder;

const INPUT_SIZE: u32 = 224;

// CLIP normalization constants
const MEAN: [f32; 3] = [0.48145466, 0.4578275, 0.40821073];
const STD: [f32; 3] = [0.26862954, 0.26130258, 0.27577711];

/// CLIP ViT-B/32 visual encoder. The session loads lazily on first use.
pub struct ClipEmbedder {
    model_file: PathBuf,
    model_url: String,
    dimension: usize,
    intra_threads: usize,
    session: OnceLock<Mutex<Session>>,
}

impl ClipEmbedder {
    pub fn new(config: &EmbeddingConfig) -> Self {
        Self {
            model_file: config.model_file.clone(),
            model_url: config.model_url.clone(),
            dimension: config.dimension,
            intra_threads: config.intra_threads,
            session: OnceLock::new(),
        }
    }

    fn session(&self) -> Result<&Mutex<Session>> {
        if let Some(session) = self.session.get() {
            return Ok(session);
        }

        ensure_model(&self.model_file, &self.model_url)?;
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(self.intra_threads)?
            .commit_from_file(&self.model_file)?;

        // Another thread may have won the race; either session is equivalent.
        let _ = self.session.set(Mutex::new(session));
        self.session
            .get()
            .ok_or_else(|| anyhow!("Visual model not initialized"))
    }
}

impl ImageEmbedder for ClipEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, path: &Path) -> Result<Vec<f32>> {
        let img = image::open(path)
            .with_context(|| format!("Failed to load image {}", path.display()))?;
        let input = preprocess(&img);

        let mut model = self
            .session()?
            .lock()
            .map_err(|e| anyhow!("Failed to lock model: {}", e))?;

        let input_tensor = Tensor::from_array((
            [1usize, 3, INPUT_SIZE as usize, INPUT_SIZE as usize],
            input.into_boxed_slice(),
        ))?;

        let outputs = model.run(ort::inputs!["pixel_values" => input_tensor])?;

        let embedding_output = outputs
            .iter()
            .next()
            .ok_or_else(|| anyhow!("No embedding output"))?;

        let (_shape, embedding_data) = embedding_output.1.try_extract_tensor::<f32>()?;

        Ok(l2_normalize(embedding_data.to_vec()))
    }
}

/// Download the model file if it doesn't exist
fn ensure_model(model_path: &Path, url: &str) -> Result<()> {
    if model_path.exists() {
        return Ok(());
    }

    if let Some(parent) = model_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    tracing::info!(url = %url, "Downloading CLIP model...");
    let response = ureq::get(url)
        .call()
        .map_err(|e| anyhow!("Failed to download model: {}", e))?;

    // Partial downloads land beside the model and are renamed once complete.
    let partial = model_path.with_extension("onnx.part");
    let mut file = std::fs::File::create(&partial)?;
    std::io::copy(&mut response.into_reader(), &mut file)?;
    std::fs::rename(&partial, model_path)?;

    tracing::info!(path = ?model_path, "CLIP model downloaded");
    Ok(())
}

/// Resize to 224x224 and lay out as normalized NCHW floats.
fn preprocess(img: &DynamicImage) -> Vec<f32> {
    let resized = img.resize_exact(INPUT_SIZE, INPUT_SIZE, image::imageops::FilterType::Triangle);
    let rgb = resized.to_rgb8();

    let plane = (INPUT_SIZE * INPUT_SIZE) as usize;
    let mut input_data = vec![0.0f32; 3 * plane];

    for (x, y, pixel) in rgb.enumerate_pixels() {
        let idx = y as usize * INPUT_SIZE as usize + x as usize;
        for channel in 0..3 {
            input_data[channel * plane + idx] =
                ((pixel[channel] as f32 / 255.0) - MEAN[channel]) / STD[channel];
        }
    }

    input_data
}

fn l2_normalize(embedding: Vec<f32>) -> Vec<f32> {
    let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm > 0.0 {
        embedding.iter().map(|x| x / norm).collect()
    } else {
        embedding
    }
}
