pub const SCHEMA: &str = r#"
-- Images: one row per distinct canonical file path, created on first embedding
CREATE TABLE IF NOT EXISTS image (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    file TEXT NOT NULL UNIQUE,
    embedding BLOB NOT NULL,  -- little-endian float32 array
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
);

-- Annotations: labeled edges between two images, smaller id first
CREATE TABLE IF NOT EXISTS annotation (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    a_image_id INTEGER NOT NULL,
    b_image_id INTEGER NOT NULL,
    is_similar BOOLEAN NOT NULL,
    created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    updated_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    CHECK (a_image_id < b_image_id),
    FOREIGN KEY (a_image_id) REFERENCES image(id),
    FOREIGN KEY (b_image_id) REFERENCES image(id)
);

-- The installed classifier: a single row replaced on every successful retrain
CREATE TABLE IF NOT EXISTS classifier (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    dimension INTEGER NOT NULL,
    hidden1 INTEGER NOT NULL,
    hidden2 INTEGER NOT NULL,
    weights BLOB NOT NULL,  -- little-endian float32, layer by layer
    annotation_count INTEGER NOT NULL,
    latest_annotation TEXT,  -- MAX(annotation.updated_at) at training time
    trained_at TEXT NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_annotation_pair ON annotation(a_image_id, b_image_id);
CREATE INDEX IF NOT EXISTS idx_annotation_b ON annotation(b_image_id);
"#;
