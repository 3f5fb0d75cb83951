//! Persisted weights of the installed classifier.
//!
//! Each saved model records the annotation watermark it was trained on, so a
//! new process can tell whether the stored weights still reflect the table.

use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use super::Database;
use crate::classifier::Classifier;
use crate::error::Result;

/// How far the annotation table had got: row count plus the newest `updated_at`.
///
/// Any insert changes the count and any relabel moves the timestamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationWatermark {
    pub count: i64,
    /// Raw column text, compared as stored.
    pub latest: Option<String>,
}

impl Database {
    pub fn annotation_watermark(&self) -> Result<AnnotationWatermark> {
        let watermark = self.conn().query_row(
            "SELECT COUNT(*), MAX(updated_at) FROM annotation",
            [],
            |row| {
                Ok(AnnotationWatermark {
                    count: row.get(0)?,
                    latest: row.get(1)?,
                })
            },
        )?;
        Ok(watermark)
    }

    /// Replace the stored classifier.
    pub fn save_classifier(
        &self,
        classifier: &Classifier,
        trained_on: &AnnotationWatermark,
    ) -> Result<()> {
        let [hidden1, hidden2] = classifier.hidden_units();
        self.conn().execute(
            r#"
            INSERT INTO classifier (id, dimension, hidden1, hidden2, weights,
                                    annotation_count, latest_annotation, trained_at)
            VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT(id) DO UPDATE SET
                dimension = excluded.dimension,
                hidden1 = excluded.hidden1,
                hidden2 = excluded.hidden2,
                weights = excluded.weights,
                annotation_count = excluded.annotation_count,
                latest_annotation = excluded.latest_annotation,
                trained_at = excluded.trained_at
            "#,
            params![
                classifier.dimension() as i64,
                hidden1 as i64,
                hidden2 as i64,
                classifier.to_le_bytes(),
                trained_on.count,
                trained_on.latest,
                Utc::now(),
            ],
        )?;
        Ok(())
    }

    /// The stored classifier and its watermark, if one of this shape exists.
    pub fn load_classifier(
        &self,
        dimension: usize,
        hidden: [usize; 2],
    ) -> Result<Option<(Classifier, AnnotationWatermark)>> {
        let row: Option<(Vec<u8>, AnnotationWatermark)> = self
            .conn()
            .query_row(
                r#"
                SELECT weights, annotation_count, latest_annotation
                FROM classifier
                WHERE id = 1 AND dimension = ?1 AND hidden1 = ?2 AND hidden2 = ?3
                "#,
                params![dimension as i64, hidden[0] as i64, hidden[1] as i64],
                |row| {
                    Ok((
                        row.get(0)?,
                        AnnotationWatermark {
                            count: row.get(1)?,
                            latest: row.get(2)?,
                        },
                    ))
                },
            )
            .optional()?;

        row.map(|(weights, watermark)| {
            Ok((Classifier::from_le_bytes(dimension, hidden, &weights)?, watermark))
        })
        .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotations::PairKey;
    use crate::db::test_db;
    use crate::embeddings::Embedding;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::path::Path;

    fn classifier() -> Classifier {
        Classifier::new(2, [4, 3], &mut StdRng::seed_from_u64(17))
    }

    #[test]
    fn test_watermark_tracks_annotations() {
        let db = test_db();
        let empty = db.annotation_watermark().unwrap();
        assert_eq!(empty, AnnotationWatermark { count: 0, latest: None });

        let a = db.insert_image(Path::new("/a.png"), &Embedding::new(vec![1.0, 0.0])).unwrap();
        let b = db.insert_image(Path::new("/b.png"), &Embedding::new(vec![0.0, 1.0])).unwrap();
        db.upsert_annotation(PairKey::new(a.id, b.id), true).unwrap();

        let after = db.annotation_watermark().unwrap();
        assert_eq!(after.count, 1);
        assert!(after.latest.is_some());
        assert_ne!(after, empty);
    }

    #[test]
    fn test_save_and_load_classifier() {
        let db = test_db();
        assert!(db.load_classifier(2, [4, 3]).unwrap().is_none());

        let model = classifier();
        let watermark = AnnotationWatermark {
            count: 3,
            latest: Some("2026-01-01 00:00:00+00:00".to_string()),
        };
        db.save_classifier(&model, &watermark).unwrap();
        db.save_classifier(&model, &watermark).unwrap();

        let (loaded, trained_on) = db.load_classifier(2, [4, 3]).unwrap().unwrap();
        assert_eq!(trained_on, watermark);
        assert_eq!(loaded.to_le_bytes(), model.to_le_bytes());
    }

    #[test]
    fn test_other_shape_is_not_loaded() {
        let db = test_db();
        db.save_classifier(&classifier(), &AnnotationWatermark { count: 0, latest: None })
            .unwrap();

        assert!(db.load_classifier(2, [8, 3]).unwrap().is_none());
        assert!(db.load_classifier(3, [4, 3]).unwrap().is_none());
    }
}
