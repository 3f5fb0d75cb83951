//! The operations a front end drives: scan, offer a pair, record a label.

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::annotations::{AnnotationStore, Submission};
use crate::clip::ClipEmbedder;
use crate::config::Config;
use crate::db::{Database, Image};
use crate::embeddings::{EmbeddingStore, ImageEmbedder};
use crate::error::{Error, Result};
use crate::scanner::DirectoryIndex;
use crate::selection::{select_next_pair, ClassifierScorer, PairCandidate};
use crate::training::{restore, ClassifierSlot, RetrainOutcome, Trainer};

/// Counters for status output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Stats {
    pub images: i64,
    pub annotations: i64,
    /// Number of classifiers installed since startup.
    pub generation: u64,
}

/// Wires the stores, the trainer and the active classifier together.
pub struct Labeler {
    db: Arc<Database>,
    store: Arc<EmbeddingStore>,
    index: Arc<DirectoryIndex>,
    slot: Arc<ClassifierSlot>,
    trainer: Arc<Trainer>,
    annotations: AnnotationStore,
    time_budget: Duration,
}

impl Labeler {
    /// Open the configured database with the CLIP embedder.
    ///
    /// The classifier is restored from the database when one of the
    /// configured shape is stored; [`Labeler::refresh`] brings it up to date
    /// with labels recorded since.
    pub fn open(config: &Config) -> Result<Self> {
        let db = Arc::new(Database::open(&config.db_path)?);
        let embedder = Arc::new(ClipEmbedder::new(&config.embedding));
        Self::with_parts(db, embedder, config)
    }

    pub fn with_parts(
        db: Arc<Database>,
        embedder: Arc<dyn ImageEmbedder>,
        config: &Config,
    ) -> Result<Self> {
        db.initialize()?;

        let dimension = embedder.dimension();
        let store = Arc::new(EmbeddingStore::new(Arc::clone(&db), embedder));
        let index = Arc::new(DirectoryIndex::new(
            Arc::clone(&store),
            &config.scanner.image_extensions,
        ));
        let slot = Arc::new(ClassifierSlot::new(restore(&db, dimension, &config.training)?));
        let trainer = Arc::new(Trainer::new(
            Arc::clone(&db),
            Arc::clone(&slot),
            Arc::clone(&index),
            config.training.clone(),
            dimension,
        ));
        let annotations = AnnotationStore::new(Arc::clone(&db), Arc::clone(&trainer));

        Ok(Self {
            db,
            store,
            index,
            slot,
            trainer,
            annotations,
            time_budget: config.selection.time_budget(),
        })
    }

    /// All eligible images in `dir`, embedding any not seen before.
    pub async fn scan_directory(&self, dir: &Path) -> Result<Arc<Vec<Image>>> {
        self.index.list_images(dir).await
    }

    /// The pair in `dir` the current classifier rates most similar among
    /// those not yet labeled, within the configured time budget.
    pub async fn next_pair(&self, dir: &Path) -> Result<Option<PairCandidate>> {
        self.next_pair_within(dir, self.time_budget).await
    }

    pub async fn next_pair_within(
        &self,
        dir: &Path,
        budget: Duration,
    ) -> Result<Option<PairCandidate>> {
        let images = self.index.list_images(dir).await?;
        let annotated = self.annotations.annotated_pairs()?;
        let classifier = self.slot.current();

        let candidate = tokio::task::spawn_blocking(move || -> Result<Option<PairCandidate>> {
            let scorer = ClassifierScorer::new(classifier, &images)?;
            Ok(select_next_pair(&images, &annotated, &scorer, budget))
        })
        .await??;

        match &candidate {
            Some(pair) => tracing::info!(
                a_image_id = pair.a.id,
                b_image_id = pair.b.id,
                score = pair.score,
                pairs_scored = pair.pairs_scored,
                exhausted = pair.exhausted,
                "Selected next pair"
            ),
            None => tracing::info!(path = %dir.display(), "No unlabeled pair left"),
        }

        Ok(candidate)
    }

    /// Store a label and start a background retrain.
    pub fn record_annotation(
        &self,
        a_image_id: i64,
        b_image_id: i64,
        is_similar: bool,
    ) -> Result<Submission> {
        self.annotations.submit(a_image_id, b_image_id, is_similar)
    }

    /// File on disk for a known image id.
    pub fn resolve_image_file(&self, image_id: i64) -> Result<PathBuf> {
        self.store
            .get_by_id(image_id)?
            .map(|image| image.file)
            .ok_or_else(|| Error::Validation(format!("unknown image id {}", image_id)))
    }

    /// Rebuild the classifier from every stored annotation and wait for it.
    pub async fn retrain_now(&self) -> Result<RetrainOutcome> {
        self.trainer.retrain().await
    }

    /// Retrain only when labels changed since the stored classifier was trained.
    pub async fn refresh(&self) -> Result<Option<RetrainOutcome>> {
        self.trainer.refresh().await
    }

    pub fn stats(&self) -> Result<Stats> {
        Ok(Stats {
            images: self.db.count_images()?,
            annotations: self.annotations.count()?,
            generation: self.slot.generation(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{write_png, PixelEmbedder};

    fn config() -> Config {
        let mut config = Config::default();
        config.training.seed = Some(21);
        config.training.hidden_units = [8, 4];
        config
    }

    fn labeler() -> (Labeler, Arc<PixelEmbedder>) {
        let db = Arc::new(crate::db::test_db());
        let embedder = Arc::new(PixelEmbedder::new());
        let labeler = Labeler::with_parts(db, embedder.clone(), &config()).unwrap();
        (labeler, embedder)
    }

    #[tokio::test]
    async fn test_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        let (labeler, _) = labeler();

        assert!(labeler.scan_directory(dir.path()).await.unwrap().is_empty());
        assert!(labeler.next_pair(dir.path()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_label_loop() {
        let dir = tempfile::tempdir().unwrap();
        write_png(dir.path(), "red.png", [220, 10, 10]);
        write_png(dir.path(), "crimson.png", [200, 20, 30]);
        write_png(dir.path(), "blue.png", [10, 10, 220]);
        let (labeler, embedder) = labeler();

        let images = labeler.scan_directory(dir.path()).await.unwrap();
        assert_eq!(images.len(), 3);
        assert_eq!(embedder.calls(), 3);

        let first = labeler.next_pair(dir.path()).await.unwrap().unwrap();
        assert!(first.a.id < first.b.id);
        assert!((0.0..=1.0).contains(&first.score));
        assert!(first.exhausted);

        let submission = labeler.record_annotation(first.b.id, first.a.id, true).unwrap();
        let outcome = submission.retrain.await.unwrap().unwrap();
        assert_eq!(outcome.generation, 1);

        let second = labeler.next_pair(dir.path()).await.unwrap().unwrap();
        assert_ne!((second.a.id, second.b.id), (first.a.id, first.b.id));
        assert_eq!(embedder.calls(), 3);

        let stats = labeler.stats().unwrap();
        assert_eq!(
            stats,
            Stats {
                images: 3,
                annotations: 1,
                generation: 1,
            }
        );
    }

    #[tokio::test]
    async fn test_resolve_image_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_png(dir.path(), "only.png", [1, 2, 3]);
        let (labeler, _) = labeler();

        let images = labeler.scan_directory(dir.path()).await.unwrap();
        let resolved = labeler.resolve_image_file(images[0].id).unwrap();
        assert_eq!(resolved, std::fs::canonicalize(file).unwrap());

        assert!(matches!(
            labeler.resolve_image_file(images[0].id + 1),
            Err(Error::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_retrain_now_rebuilds_from_history() {
        let dir = tempfile::tempdir().unwrap();
        write_png(dir.path(), "a.png", [0, 0, 0]);
        write_png(dir.path(), "b.png", [255, 255, 255]);
        let (labeler, _) = labeler();

        let images = labeler.scan_directory(dir.path()).await.unwrap();
        let cold = labeler.retrain_now().await.unwrap();
        assert!(cold.report.is_none());

        labeler
            .record_annotation(images[0].id, images[1].id, false)
            .unwrap()
            .retrain
            .await
            .unwrap()
            .unwrap();
        let warm = labeler.retrain_now().await.unwrap();
        assert_eq!(warm.report.unwrap().examples, 1);
        assert_eq!(warm.generation, 3);
        assert!(labeler.next_pair(dir.path()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_reopened_labeler_offers_same_pair() {
        let dir = tempfile::tempdir().unwrap();
        for (name, rgb) in [
            ("a.png", [250, 0, 0]),
            ("b.png", [0, 250, 0]),
            ("c.png", [0, 0, 250]),
            ("d.png", [120, 120, 0]),
            ("e.png", [0, 120, 120]),
        ] {
            write_png(dir.path(), name, rgb);
        }
        let db_path = dir.path().join("state").join("labels.db");

        // Unseeded, as a real install is: agreement must come from the stored weights.
        let mut config = Config::default();
        config.training.hidden_units = [8, 4];
        let open = || {
            let db = Arc::new(Database::open(&db_path).unwrap());
            Labeler::with_parts(db, Arc::new(PixelEmbedder::new()), &config).unwrap()
        };

        let first = open();
        assert!(first.refresh().await.unwrap().is_some());
        let offered = first.next_pair(dir.path()).await.unwrap().unwrap();
        first
            .record_annotation(offered.a.id, offered.b.id, true)
            .unwrap()
            .retrain
            .await
            .unwrap()
            .unwrap();
        let expected = first.next_pair(dir.path()).await.unwrap().unwrap();

        for _ in 0..3 {
            let again = open();
            assert!(again.refresh().await.unwrap().is_none());
            let pair = again.next_pair(dir.path()).await.unwrap().unwrap();
            assert_eq!((pair.a.id, pair.b.id), (expected.a.id, expected.b.id));
            assert_eq!(pair.score.to_bits(), expected.score.to_bits());
        }
    }

    #[tokio::test]
    async fn test_label_without_finished_retrain_is_picked_up() {
        let dir = tempfile::tempdir().unwrap();
        write_png(dir.path(), "a.png", [0, 0, 0]);
        write_png(dir.path(), "b.png", [255, 255, 255]);
        let db = Arc::new(crate::db::test_db());
        let first = Labeler::with_parts(Arc::clone(&db), Arc::new(PixelEmbedder::new()), &config())
            .unwrap();
        let images = first.scan_directory(dir.path()).await.unwrap();
        first.refresh().await.unwrap();

        // Stand-in for a process that exits before its background retrain runs.
        db.upsert_annotation(
            crate::annotations::PairKey::new(images[0].id, images[1].id),
            false,
        )
        .unwrap();

        let second = Labeler::with_parts(db, Arc::new(PixelEmbedder::new()), &config()).unwrap();
        let outcome = second.refresh().await.unwrap().unwrap();
        assert_eq!(outcome.report.unwrap().examples, 1);
    }

    #[tokio::test]
    async fn test_unknown_image_annotation_is_rejected() {
        let (labeler, _) = labeler();
        assert!(matches!(
            labeler.record_annotation(1, 2, true),
            Err(Error::Validation(_))
        ));
        assert_eq!(labeler.stats().unwrap().annotations, 0);
    }
}
