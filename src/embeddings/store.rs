use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use super::{Embedding, ImageEmbedder};
use crate::db::images::file_key;
use crate::db::{Database, Image};
use crate::error::{Error, Result};

#[derive(Default)]
struct ImageCache {
    by_file: HashMap<PathBuf, Image>,
    by_id: HashMap<i64, PathBuf>,
}

/// Resolves image files to stored embeddings, computing each at most once.
///
/// The in-memory cache lives as long as the store, is append-only and is
/// never invalidated by changes on disk.
pub struct EmbeddingStore {
    db: Arc<Database>,
    embedder: Arc<dyn ImageEmbedder>,
    cache: Mutex<ImageCache>,
    /// Held from the cache re-check until the new row is cached, so concurrent
    /// requests for one file embed it once. Misses for different files queue
    /// behind each other as well; directory scans resolve files one at a time.
    miss_lock: tokio::sync::Mutex<()>,
}

impl EmbeddingStore {
    pub fn new(db: Arc<Database>, embedder: Arc<dyn ImageEmbedder>) -> Self {
        Self {
            db,
            embedder,
            cache: Mutex::new(ImageCache::default()),
            miss_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn dimension(&self) -> usize {
        self.embedder.dimension()
    }

    /// Return the image row for `file`, embedding and persisting it on first sight.
    ///
    /// Fails with [`Error::MediaRead`] when the file cannot be resolved, read or
    /// decoded; no row is written in that case.
    pub async fn get_embedding(&self, file: &Path) -> Result<Image> {
        let file = tokio::fs::canonicalize(file)
            .await
            .map_err(|e| Error::media_read(file, e))?;

        if let Some(image) = self.cached(&file) {
            return Ok(image);
        }
        file_key(&file)?;

        let _guard = self.miss_lock.lock().await;
        if let Some(image) = self.cached(&file) {
            return Ok(image);
        }

        let dimension = self.dimension();
        if let Some(image) = self.db.find_image_by_file(&file, dimension)? {
            self.remember(&image);
            return Ok(image);
        }

        let embedder = Arc::clone(&self.embedder);
        let path = file.clone();
        let values = tokio::task::spawn_blocking(move || embedder.embed(&path))
            .await?
            .map_err(|e| Error::media_read(&file, format!("{:#}", e)))?;

        if values.len() != dimension {
            return Err(Error::media_read(
                &file,
                format!("model returned {} values, expected {}", values.len(), dimension),
            ));
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(Error::media_read(&file, "model returned non-finite values"));
        }

        let image = self.db.insert_image(&file, &Embedding::new(values))?;
        tracing::info!(image_id = image.id, path = %file.display(), "Computed new embedding");

        self.remember(&image);
        Ok(image)
    }

    /// Look up a known image by id. Never computes an embedding.
    pub fn get_by_id(&self, id: i64) -> Result<Option<Image>> {
        {
            let cache = self.lock_cache();
            if let Some(image) = cache.by_id.get(&id).and_then(|f| cache.by_file.get(f)) {
                return Ok(Some(image.clone()));
            }
        }

        let image = self.db.find_image(id, self.dimension())?;
        if let Some(ref image) = image {
            self.remember(image);
        }
        Ok(image)
    }

    pub fn cached_len(&self) -> usize {
        self.lock_cache().by_file.len()
    }

    fn cached(&self, file: &Path) -> Option<Image> {
        self.lock_cache().by_file.get(file).cloned()
    }

    fn remember(&self, image: &Image) {
        let mut cache = self.lock_cache();
        cache.by_id.insert(image.id, image.file.clone());
        cache.by_file.insert(image.file.clone(), image.clone());
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, ImageCache> {
        self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
