use std::sync::{Arc, RwLock};

use crate::classifier::Classifier;

struct Installed {
    classifier: Arc<Classifier>,
    generation: u64,
}

/// Holds the active classifier.
///
/// Replacement swaps the whole `Arc`, so a reader sees either the old or the
/// new model in full, and a scan that already took its `Arc` keeps scoring
/// with it until it finishes.
pub struct ClassifierSlot {
    inner: RwLock<Installed>,
}

impl ClassifierSlot {
    /// Start at generation 0 with an untrained or restored model.
    pub fn new(initial: Classifier) -> Self {
        Self {
            inner: RwLock::new(Installed {
                classifier: Arc::new(initial),
                generation: 0,
            }),
        }
    }

    pub fn current(&self) -> Arc<Classifier> {
        Arc::clone(&self.read().classifier)
    }

    pub fn generation(&self) -> u64 {
        self.read().generation
    }

    /// Replace the active model, returning its generation number.
    pub fn install(&self, classifier: Arc<Classifier>) -> u64 {
        let mut inner = self
            .inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        inner.generation += 1;
        inner.classifier = classifier;
        inner.generation
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Installed> {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
