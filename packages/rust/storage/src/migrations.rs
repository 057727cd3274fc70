//! SQL migration definitions for the ProfileSynth document store.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: collections, documents",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version   INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Named document collections, enumerated in creation order
CREATE TABLE IF NOT EXISTS collections (
    id         INTEGER PRIMARY KEY AUTOINCREMENT,
    name       TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL
);

-- Documents; rowid order is insertion order
CREATE TABLE IF NOT EXISTS documents (
    collection_id INTEGER NOT NULL REFERENCES collections(id) ON DELETE CASCADE,
    doc_id        TEXT NOT NULL,
    content       TEXT,
    metadata_json TEXT,
    updated_at    TEXT NOT NULL,
    UNIQUE(collection_id, doc_id)
);

CREATE INDEX IF NOT EXISTS idx_documents_collection ON documents(collection_id);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
