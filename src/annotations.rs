//! Human pair labels: canonical keys, the labeled-pair set and submission.

use std::collections::HashSet;
use std::sync::Arc;

use crate::db::{Annotation, Database};
use crate::error::{Error, Result};
use crate::training::{RetrainHandle, Trainer};

/// An unordered image pair stored as `a < b`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PairKey {
    pub a: i64,
    pub b: i64,
}

impl PairKey {
    /// Order the two ids so that `(x, y)` and `(y, x)` give the same key.
    pub fn new(x: i64, y: i64) -> Self {
        if x <= y {
            Self { a: x, b: y }
        } else {
            Self { a: y, b: x }
        }
    }
}

/// Pairs that already carry a label and must not be offered again.
#[derive(Debug, Clone, Default)]
pub struct AnnotationSet(HashSet<PairKey>);

impl AnnotationSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, x: i64, y: i64) -> bool {
        self.0.contains(&PairKey::new(x, y))
    }

    pub fn insert(&mut self, key: PairKey) -> bool {
        self.0.insert(key)
    }
}

impl FromIterator<PairKey> for AnnotationSet {
    fn from_iter<I: IntoIterator<Item = PairKey>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Result of a stored label.
#[derive(Debug)]
pub struct Submission {
    pub annotation_id: i64,
    /// The retrain this label triggered.
    pub retrain: RetrainHandle,
}

/// Interpret a free-text label.
pub fn parse_label(text: &str) -> Result<bool> {
    match text.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" | "similar" => Ok(true),
        "false" | "0" | "no" | "different" => Ok(false),
        other => Err(Error::Validation(format!("not a similarity label: {:?}", other))),
    }
}

/// Sole writer of annotation rows.
pub struct AnnotationStore {
    db: Arc<Database>,
    trainer: Arc<Trainer>,
}

impl AnnotationStore {
    pub fn new(db: Arc<Database>, trainer: Arc<Trainer>) -> Self {
        Self { db, trainer }
    }

    /// Store a label for the pair and start a retrain in the background.
    ///
    /// Rejected submissions write nothing and start nothing.
    pub fn submit(&self, a_image_id: i64, b_image_id: i64, is_similar: bool) -> Result<Submission> {
        if a_image_id == b_image_id {
            return Err(Error::Validation(format!(
                "cannot pair image {} with itself",
                a_image_id
            )));
        }

        let key = PairKey::new(a_image_id, b_image_id);
        let annotation_id = self.db.upsert_annotation(key, is_similar)?;

        tracing::info!(
            annotation_id,
            a_image_id = key.a,
            b_image_id = key.b,
            is_similar,
            "Recorded annotation"
        );

        Ok(Submission {
            annotation_id,
            retrain: self.trainer.spawn_retrain(),
        })
    }

    pub fn get(&self, a_image_id: i64, b_image_id: i64) -> Result<Option<Annotation>> {
        self.db.get_annotation(PairKey::new(a_image_id, b_image_id))
    }

    pub fn all(&self) -> Result<Vec<Annotation>> {
        self.db.all_annotations()
    }

    pub fn count(&self) -> Result<i64> {
        self.db.count_annotations()
    }

    pub fn annotated_pairs(&self) -> Result<AnnotationSet> {
        Ok(self.db.annotated_pairs()?.into_iter().collect())
    }
}
