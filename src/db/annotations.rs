//! Annotation rows and the training join over them.

use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension};

use super::images::image_exists;
use super::Database;
use crate::annotations::PairKey;
use crate::embeddings::Embedding;
use crate::error::{Error, Result};

/// A human label for one unordered image pair. `a_image_id < b_image_id` always holds.
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    pub id: i64,
    pub a_image_id: i64,
    pub b_image_id: i64,
    pub is_similar: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Annotation {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            a_image_id: row.get(1)?,
            b_image_id: row.get(2)?,
            is_similar: row.get(3)?,
            created_at: row.get(4)?,
            updated_at: row.get(5)?,
        })
    }
}

/// One supervised example: both embeddings in canonical order plus the label.
#[derive(Debug, Clone)]
pub struct TrainingExample {
    pub a: Embedding,
    pub b: Embedding,
    pub is_similar: bool,
}

impl Database {
    /// Insert or update the label for `pair`.
    ///
    /// Both images must exist; the check and the write share one transaction,
    /// so a rejected submission leaves the table untouched.
    pub fn upsert_annotation(&self, pair: PairKey, is_similar: bool) -> Result<i64> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        for image_id in [pair.a, pair.b] {
            if !image_exists(&tx, image_id)? {
                return Err(Error::Validation(format!("image {} does not exist", image_id)));
            }
        }

        let now = Utc::now();
        let id: i64 = tx.query_row(
            r#"
            INSERT INTO annotation (a_image_id, b_image_id, is_similar, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?4)
            ON CONFLICT(a_image_id, b_image_id)
            DO UPDATE SET is_similar = excluded.is_similar, updated_at = excluded.updated_at
            RETURNING id
            "#,
            params![pair.a, pair.b, is_similar, now],
            |row| row.get(0),
        )?;

        tx.commit()?;
        Ok(id)
    }

    pub fn get_annotation(&self, pair: PairKey) -> Result<Option<Annotation>> {
        let annotation = self
            .conn()
            .query_row(
                r#"
                SELECT id, a_image_id, b_image_id, is_similar, created_at, updated_at
                FROM annotation
                WHERE a_image_id = ? AND b_image_id = ?
                "#,
                params![pair.a, pair.b],
                Annotation::from_row,
            )
            .optional()?;
        Ok(annotation)
    }

    pub fn all_annotations(&self) -> Result<Vec<Annotation>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            r#"
            SELECT id, a_image_id, b_image_id, is_similar, created_at, updated_at
            FROM annotation
            ORDER BY id
            "#,
        )?;
        let annotations = stmt
            .query_map([], Annotation::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(annotations)
    }

    pub fn annotated_pairs(&self) -> Result<Vec<PairKey>> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT a_image_id, b_image_id FROM annotation")?;
        let pairs = stmt
            .query_map([], |row| Ok(PairKey::new(row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(pairs)
    }

    pub fn count_annotations(&self) -> Result<i64> {
        let count: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM annotation", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Every annotation joined with both embeddings, in annotation id order.
    pub fn training_examples(&self, dimension: usize) -> Result<Vec<TrainingExample>> {
        let rows: Vec<(Vec<u8>, Vec<u8>, bool)> = {
            let conn = self.conn();
            let mut stmt = conn.prepare(
                r#"
                SELECT ia.embedding, ib.embedding, an.is_similar
                FROM annotation an
                JOIN image ia ON ia.id = an.a_image_id
                JOIN image ib ON ib.id = an.b_image_id
                ORDER BY an.id
                "#,
            )?;
            let rows = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            rows
        };

        rows.into_iter()
            .map(|(a, b, is_similar)| {
                Ok(TrainingExample {
                    a: Embedding::from_le_bytes(&a, dimension)?,
                    b: Embedding::from_le_bytes(&b, dimension)?,
                    is_similar,
                })
            })
            .collect()
    }
}
