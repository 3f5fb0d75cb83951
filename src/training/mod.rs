//! Background retraining and the hot-swappable active classifier.

mod slot;

use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use std::time::Instant;

use crate::classifier::{fit, Classifier, FitReport};
use crate::config::TrainingConfig;
use crate::db::{Database, TrainingExample};
use crate::error::Result;
use crate::scanner::DirectoryIndex;

pub use slot::ClassifierSlot;

/// What a completed retrain installed.
#[derive(Debug, Clone)]
pub struct RetrainOutcome {
    pub generation: u64,
    /// `None` when there were no annotations and the model is untrained.
    pub report: Option<FitReport>,
}

/// Awaiting is optional; dropping the handle detaches the retrain.
pub type RetrainHandle = tokio::task::JoinHandle<Result<RetrainOutcome>>;

/// Untrained network with weights drawn from `seed`, or from entropy when unset.
pub fn untrained(dimension: usize, config: &TrainingConfig) -> Classifier {
    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    Classifier::new(dimension, config.hidden_units, &mut rng)
}

/// The stored classifier when one of the configured shape exists, else an untrained one.
pub fn restore(db: &Database, dimension: usize, config: &TrainingConfig) -> Result<Classifier> {
    match db.load_classifier(dimension, config.hidden_units)? {
        Some((classifier, trained_on)) => {
            tracing::info!(annotations = trained_on.count, "Restored stored classifier");
            Ok(classifier)
        }
        None => Ok(untrained(dimension, config)),
    }
}

/// Fit a fresh classifier on the full annotation history.
///
/// No examples is not an error: the result is simply untrained.
pub fn train_classifier(
    examples: &[TrainingExample],
    dimension: usize,
    config: &TrainingConfig,
) -> Result<(Classifier, Option<FitReport>)> {
    let initial = untrained(dimension, config);
    if examples.is_empty() {
        return Ok((initial, None));
    }

    let (classifier, report) = fit(initial, examples, config.epochs, config.learning_rate)?;
    Ok((classifier, Some(report)))
}

/// Rebuilds the classifier from the annotation table and installs it.
///
/// Retrains run one at a time and read the table only once they hold the
/// turn, so a retrain triggered later always trains on at least as many
/// annotations as an earlier one and installs after it.
pub struct Trainer {
    db: Arc<Database>,
    slot: Arc<ClassifierSlot>,
    index: Arc<DirectoryIndex>,
    config: TrainingConfig,
    dimension: usize,
    turn: tokio::sync::Mutex<()>,
}

impl Trainer {
    pub fn new(
        db: Arc<Database>,
        slot: Arc<ClassifierSlot>,
        index: Arc<DirectoryIndex>,
        config: TrainingConfig,
        dimension: usize,
    ) -> Self {
        Self {
            db,
            slot,
            index,
            config,
            dimension,
            turn: tokio::sync::Mutex::new(()),
        }
    }

    pub fn slot(&self) -> &Arc<ClassifierSlot> {
        &self.slot
    }

    /// Retrain now and wait for the result.
    ///
    /// The new weights are stored before they are installed. On failure the
    /// active and the stored classifier are both left untouched.
    pub async fn retrain(&self) -> Result<RetrainOutcome> {
        let _turn = self.turn.lock().await;
        let started = Instant::now();

        // Read before the examples: a label landing in between leaves the
        // stored watermark behind the table, so the next refresh retrains.
        let watermark = self.db.annotation_watermark()?;
        let examples = self.db.training_examples(self.dimension)?;
        tracing::info!(examples = examples.len(), "Retraining classifier");

        let config = self.config.clone();
        let dimension = self.dimension;
        let (classifier, report) = tokio::task::spawn_blocking(move || {
            train_classifier(&examples, dimension, &config)
        })
        .await??;

        self.db.save_classifier(&classifier, &watermark)?;
        let generation = self.slot.install(Arc::new(classifier));
        self.index.invalidate_all();

        tracing::info!(
            generation,
            loss = report.as_ref().map(|r| r.final_loss),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Installed retrained classifier"
        );

        Ok(RetrainOutcome { generation, report })
    }

    /// Retrain only if the stored classifier was trained on an older
    /// annotation table, or nothing of the configured shape is stored.
    ///
    /// Returns `None` when the stored weights are current.
    pub async fn refresh(&self) -> Result<Option<RetrainOutcome>> {
        let stored = self
            .db
            .load_classifier(self.dimension, self.config.hidden_units)?
            .map(|(_, trained_on)| trained_on);
        let current = self.db.annotation_watermark()?;

        if stored.as_ref() == Some(&current) {
            tracing::debug!(annotations = current.count, "Stored classifier is current");
            return Ok(None);
        }
        self.retrain().await.map(Some)
    }

    /// Start a retrain in the background. Failures are logged and dropped.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn_retrain(self: &Arc<Self>) -> RetrainHandle {
        let trainer = Arc::clone(self);
        tokio::spawn(async move {
            let result = trainer.retrain().await;
            if let Err(ref e) = result {
                tracing::error!(error = %e, "Retrain failed; keeping previous classifier");
            }
            result
        })
    }
}
