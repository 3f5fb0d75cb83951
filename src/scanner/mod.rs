pub mod discovery;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::db::Image;
use crate::embeddings::EmbeddingStore;
use crate::error::{Error, Result};

pub use discovery::discover_images;

/// Per-directory image lists, resolved to embeddings and ordered by id.
///
/// The id order is what makes pair selection deterministic and resumable.
/// Cached lists are dropped only by [`DirectoryIndex::invalidate_all`],
/// which the trainer calls after installing a new classifier; changes on
/// disk are not tracked.
pub struct DirectoryIndex {
    store: Arc<EmbeddingStore>,
    extensions: Vec<String>,
    cache: Mutex<HashMap<PathBuf, Arc<Vec<Image>>>>,
}

impl DirectoryIndex {
    pub fn new(store: Arc<EmbeddingStore>, extensions: &[String]) -> Self {
        Self {
            store,
            extensions: extensions.to_vec(),
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Every eligible image directly inside `dir`, ascending by id.
    ///
    /// One unreadable image fails the whole listing.
    pub async fn list_images(&self, dir: &Path) -> Result<Arc<Vec<Image>>> {
        let dir = tokio::fs::canonicalize(dir)
            .await
            .map_err(|source| Error::DirectoryAccess {
                path: dir.to_path_buf(),
                source,
            })?;

        if let Some(images) = self.lock_cache().get(&dir) {
            return Ok(Arc::clone(images));
        }

        let files = {
            let dir = dir.clone();
            let extensions = self.extensions.clone();
            tokio::task::spawn_blocking(move || discover_images(&dir, &extensions)).await??
        };

        // Resolve in path order so first-time id assignment is reproducible.
        let mut images = Vec::with_capacity(files.len());
        for file in &files {
            images.push(self.store.get_embedding(file).await?);
        }
        images.sort_by_key(|image| image.id);
        // A symlink and its target in the same directory resolve to one row.
        images.dedup_by_key(|image| image.id);

        tracing::debug!(path = %dir.display(), images = images.len(), "Indexed directory");

        let images = Arc::new(images);
        self.lock_cache().insert(dir, Arc::clone(&images));
        Ok(images)
    }

    pub fn invalidate_all(&self) {
        let mut cache = self.lock_cache();
        if !cache.is_empty() {
            tracing::debug!(directories = cache.len(), "Cleared directory index cache");
        }
        cache.clear();
    }

    pub fn cached_dirs(&self) -> usize {
        self.lock_cache().len()
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, HashMap<PathBuf, Arc<Vec<Image>>>> {
        self.cache.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
