//! Image rows: canonical file path plus its stored embedding.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};

use super::Database;
use crate::embeddings::Embedding;
use crate::error::{Error, Result};

/// An image known to the labeler.
#[derive(Debug, Clone)]
pub struct Image {
    pub id: i64,
    pub file: PathBuf,
    pub embedding: Embedding,
    pub created_at: DateTime<Utc>,
}

struct ImageRow {
    id: i64,
    file: String,
    embedding: Vec<u8>,
    created_at: DateTime<Utc>,
}

impl ImageRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            file: row.get(1)?,
            embedding: row.get(2)?,
            created_at: row.get(3)?,
        })
    }

    fn decode(self, dimension: usize) -> Result<Image> {
        Ok(Image {
            id: self.id,
            file: PathBuf::from(self.file),
            embedding: Embedding::from_le_bytes(&self.embedding, dimension)?,
            created_at: self.created_at,
        })
    }
}

/// The `file` column value for `path`.
///
/// The column is TEXT, so only UTF-8 paths have a key; anything else would
/// collide with other names after a lossy conversion.
pub(crate) fn file_key(path: &Path) -> Result<&str> {
    path.to_str()
        .ok_or_else(|| Error::media_read(path, "file name is not valid UTF-8"))
}

/// Whether an image row with `id` exists, on any connection or transaction.
pub(super) fn image_exists(conn: &Connection, id: i64) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM image WHERE id = ?)",
        [id],
        |row| row.get(0),
    )
}

impl Database {
    pub fn find_image_by_file(&self, file: &Path, dimension: usize) -> Result<Option<Image>> {
        let key = file_key(file)?;
        let row = self
            .conn()
            .query_row(
                "SELECT id, file, embedding, created_at FROM image WHERE file = ?",
                [key],
                ImageRow::from_row,
            )
            .optional()?;

        row.map(|r| r.decode(dimension)).transpose()
    }

    pub fn find_image(&self, id: i64, dimension: usize) -> Result<Option<Image>> {
        let row = self
            .conn()
            .query_row(
                "SELECT id, file, embedding, created_at FROM image WHERE id = ?",
                [id],
                ImageRow::from_row,
            )
            .optional()?;

        row.map(|r| r.decode(dimension)).transpose()
    }

    /// Insert an image row unless one already exists for `file`, returning the stored row.
    ///
    /// An existing row wins: its embedding is never overwritten.
    pub fn insert_image(&self, file: &Path, embedding: &Embedding) -> Result<Image> {
        let key = file_key(file)?;
        let now = Utc::now();
        self.conn().execute(
            r#"
            INSERT INTO image (file, embedding, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?3)
            ON CONFLICT(file) DO NOTHING
            "#,
            params![key, embedding.to_le_bytes(), now],
        )?;

        self.find_image_by_file(file, embedding.dimension())?
            .ok_or(Error::Storage(rusqlite::Error::QueryReturnedNoRows))
    }

    pub fn count_images(&self) -> Result<i64> {
        let count: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM image", [], |row| row.get(0))?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_db;

    #[test]
    fn test_insert_and_find() {
        let db = test_db();
        let embedding = Embedding::new(vec![0.25, -1.5, 3.0]);

        let image = db.insert_image(Path::new("/photos/a.jpg"), &embedding).unwrap();
        assert!(image.id > 0);
        assert_eq!(image.embedding, embedding);

        let by_file = db
            .find_image_by_file(Path::new("/photos/a.jpg"), 3)
            .unwrap()
            .unwrap();
        assert_eq!(by_file.id, image.id);

        let by_id = db.find_image(image.id, 3).unwrap().unwrap();
        assert_eq!(by_id.file, PathBuf::from("/photos/a.jpg"));
        assert!(image_exists(&db.conn(), image.id).unwrap());
        assert!(!image_exists(&db.conn(), image.id + 1).unwrap());
    }

    #[test]
    fn test_insert_keeps_existing_row() {
        let db = test_db();
        let first = db
            .insert_image(Path::new("/photos/a.jpg"), &Embedding::new(vec![1.0, 2.0]))
            .unwrap();
        let second = db
            .insert_image(Path::new("/photos/a.jpg"), &Embedding::new(vec![9.0, 9.0]))
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.embedding.as_slice(), &[1.0, 2.0]);
        assert_eq!(db.count_images().unwrap(), 1);
    }

    #[test]
    fn test_wrong_dimension_is_decode_error() {
        let db = test_db();
        db.insert_image(Path::new("/photos/a.jpg"), &Embedding::new(vec![1.0, 2.0]))
            .unwrap();

        let result = db.find_image_by_file(Path::new("/photos/a.jpg"), 3);
        assert!(matches!(result, Err(crate::Error::Decode { len: 8, expected: 3 })));
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_path_has_no_key() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let db = test_db();
        let first = Path::new("/photos").join(OsStr::from_bytes(b"x\xff.png"));
        let second = Path::new("/photos").join(OsStr::from_bytes(b"x\xfe.png"));

        for file in [&first, &second] {
            let inserted = db.insert_image(file, &Embedding::new(vec![1.0]));
            assert!(matches!(inserted, Err(Error::MediaRead { .. })));
            assert!(matches!(
                db.find_image_by_file(file, 1),
                Err(Error::MediaRead { .. })
            ));
        }
        assert_eq!(db.count_images().unwrap(), 0);
    }
}
