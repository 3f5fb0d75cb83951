use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    #[serde(default)]
    pub scanner: ScannerConfig,

    #[serde(default)]
    pub selection: SelectionConfig,

    #[serde(default)]
    pub training: TrainingConfig,

    #[serde(default)]
    pub embedding: EmbeddingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerConfig {
    /// Extensions (without the dot) eligible for labeling. Matched case-insensitively.
    #[serde(default = "default_image_extensions")]
    pub image_extensions: Vec<String>,
}

fn default_image_extensions() -> Vec<String> {
    vec!["jpg".to_string(), "jpeg".to_string(), "png".to_string()]
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            image_extensions: default_image_extensions(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionConfig {
    /// Wall-clock budget for one pair-selection scan.
    #[serde(default = "default_time_budget_ms")]
    pub time_budget_ms: u64,
}

fn default_time_budget_ms() -> u64 {
    1000
}

impl SelectionConfig {
    pub fn time_budget(&self) -> Duration {
        Duration::from_millis(self.time_budget_ms)
    }
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            time_budget_ms: default_time_budget_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    #[serde(default = "default_epochs")]
    pub epochs: usize,

    #[serde(default = "default_learning_rate")]
    pub learning_rate: f32,

    /// Widths of the two hidden layers.
    #[serde(default = "default_hidden_units")]
    pub hidden_units: [usize; 2],

    /// Fixed seed for weight initialization. Unset means fresh entropy per retrain.
    #[serde(default)]
    pub seed: Option<u64>,
}

fn default_epochs() -> usize {
    5
}

fn default_learning_rate() -> f32 {
    0.01
}

fn default_hidden_units() -> [usize; 2] {
    [64, 16]
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: default_epochs(),
            learning_rate: default_learning_rate(),
            hidden_units: default_hidden_units(),
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Output length of the embedding model. Stored blobs must match it.
    #[serde(default = "default_dimension")]
    pub dimension: usize,

    #[serde(default = "default_model_file")]
    pub model_file: PathBuf,

    #[serde(default = "default_model_url")]
    pub model_url: String,

    #[serde(default = "default_intra_threads")]
    pub intra_threads: usize,
}

fn default_dimension() -> usize {
    512 // CLIP ViT-B/32
}

fn default_model_file() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from(".local/share"))
        .join("simpair")
        .join("models")
        .join("clip-vit-b32-vision.onnx")
}

fn default_model_url() -> String {
    // Qdrant's CLIP ViT-B/32 visual encoder (ONNX)
    "https://huggingface.co/Qdrant/clip-ViT-B-32-vision/resolve/main/model.onnx".to_string()
}

fn default_intra_threads() -> usize {
    4
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            dimension: default_dimension(),
            model_file: default_model_file(),
            model_url: default_model_url(),
            intra_threads: default_intra_threads(),
        }
    }
}

fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("simpair")
        .join("simpair.db")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            scanner: ScannerConfig::default(),
            selection: SelectionConfig::default(),
            training: TrainingConfig::default(),
            embedding: EmbeddingConfig::default(),
        }
    }
}

impl Config {
    /// Load from `SIMPAIR_CONFIG` or the default location, writing defaults on first run.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            let config = Config::default();
            config.save_to(&config_path)?;
            Ok(config)
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        Ok(config)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        Ok(())
    }

    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("simpair")
    }

    fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("SIMPAIR_CONFIG") {
            return PathBuf::from(path);
        }
        Self::config_dir().join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            db_path = "/tmp/labels.db"

            [selection]
            time_budget_ms = 250
            "#,
        )
        .unwrap();

        assert_eq!(config.db_path, PathBuf::from("/tmp/labels.db"));
        assert_eq!(config.selection.time_budget(), Duration::from_millis(250));
        assert_eq!(config.training.epochs, 5);
        assert_eq!(config.training.hidden_units, [64, 16]);
        assert_eq!(config.scanner.image_extensions, vec!["jpg", "jpeg", "png"]);
        assert_eq!(config.embedding.dimension, 512);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.training.seed = Some(7);
        config.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.training.seed, Some(7));
        assert_eq!(loaded.selection.time_budget_ms, 1000);
    }
}
