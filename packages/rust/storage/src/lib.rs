//! Embedded libSQL document store.
//!
//! The [`Storage`] struct wraps a libSQL database holding named collections of
//! documents (id, text, JSON metadata). Pipelines reach it through the
//! [`DocumentStore`] capability so they never depend on the SQL layout.
//!
//! **Access rules:**
//! - `ingest`: read-write via [`Storage::open`]
//! - `generate` / `export` / `list`: read-only via [`Storage::open_readonly`]

mod migrations;

use std::path::Path;

use chrono::Utc;
use libsql::{Connection, Database, params};
use profilesynth_shared::{CollectionInfo, Metadata, ProfileSynthError, Result, StoredDocument};

// ---------------------------------------------------------------------------
// DocumentStore capability
// ---------------------------------------------------------------------------

/// Equality filter on a metadata field.
#[derive(Debug, Clone, PartialEq)]
pub enum MetadataFilter {
    Eq {
        field: String,
        value: serde_json::Value,
    },
}

impl MetadataFilter {
    /// Shorthand for a string equality filter.
    pub fn eq(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Eq {
            field: field.into(),
            value: serde_json::Value::String(value.into()),
        }
    }
}

/// Read access to a collection-oriented document store.
#[allow(async_fn_in_trait)]
pub trait DocumentStore {
    /// All collections, in creation order.
    async fn list_collections(&self) -> Result<Vec<CollectionInfo>>;

    /// Documents in `collection` matching `filter`, in insertion order.
    async fn get_where(
        &self,
        collection: &str,
        filter: &MetadataFilter,
    ) -> Result<Vec<StoredDocument>>;

    /// Every document in `collection`, in insertion order.
    async fn get_all(&self, collection: &str) -> Result<Vec<StoredDocument>>;
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| ProfileSynthError::io(parent, e))?;
            }
        }

        let (db, conn) = connect(path).await?;
        let storage = Self {
            db,
            conn,
            readonly: false,
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open an existing database at `path` in read-only mode.
    ///
    /// The connection runs with `query_only`, so SQLite itself refuses writes
    /// and no migrations are applied. Unlike [`Storage::open`], a missing file is a connection error rather
    /// than a fresh empty store.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(ProfileSynthError::StoreConnection(format!(
                "no document store at '{}'",
                path.display()
            )));
        }

        let (db, conn) = connect(path).await?;
        conn.execute_batch("PRAGMA query_only = ON")
            .await
            .map_err(|e| ProfileSynthError::StoreConnection(e.to_string()))?;
        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        ProfileSynthError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(ProfileSynthError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Collection operations
    // -----------------------------------------------------------------------

    /// Create a collection if it does not exist yet.
    pub async fn create_collection(&self, name: &str) -> Result<()> {
        self.check_writable()?;
        if name.trim().is_empty() {
            return Err(ProfileSynthError::validation("collection name is empty"));
        }
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT OR IGNORE INTO collections (name, created_at) VALUES (?1, ?2)",
                params![name, now.as_str()],
            )
            .await
            .map_err(|e| ProfileSynthError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Delete a collection and its documents. Returns whether it existed.
    pub async fn delete_collection(&self, name: &str) -> Result<bool> {
        self.check_writable()?;
        let Some(collection_id) = self.collection_id(name).await? else {
            return Ok(false);
        };
        self.conn
            .execute(
                "DELETE FROM documents WHERE collection_id = ?1",
                params![collection_id],
            )
            .await
            .map_err(|e| ProfileSynthError::Storage(e.to_string()))?;
        self.conn
            .execute("DELETE FROM collections WHERE id = ?1", params![collection_id])
            .await
            .map_err(|e| ProfileSynthError::Storage(e.to_string()))?;
        Ok(true)
    }

    /// Look up a collection's row id.
    async fn collection_id(&self, name: &str) -> Result<Option<i64>> {
        let mut rows = self
            .conn
            .query("SELECT id FROM collections WHERE name = ?1", params![name])
            .await
            .map_err(|e| ProfileSynthError::store_query(name, e.to_string()))?;

        match rows.next().await {
            Ok(Some(row)) => Ok(Some(
                row.get::<i64>(0)
                    .map_err(|e| ProfileSynthError::store_query(name, e.to_string()))?,
            )),
            Ok(None) => Ok(None),
            Err(e) => Err(ProfileSynthError::store_query(name, e.to_string())),
        }
    }

    /// Like [`Storage::collection_id`], but a missing collection is an error.
    async fn require_collection(&self, name: &str) -> Result<i64> {
        self.collection_id(name)
            .await?
            .ok_or_else(|| ProfileSynthError::store_query(name, "collection does not exist"))
    }

    // -----------------------------------------------------------------------
    // Document operations
    // -----------------------------------------------------------------------

    /// Upsert a document (insert or update on conflict by `collection + id`).
    ///
    /// An update keeps the document's original position in the collection.
    pub async fn upsert_document(&self, collection: &str, doc: &StoredDocument) -> Result<()> {
        self.check_writable()?;
        let collection_id = self.require_collection(collection).await?;
        let metadata_json = doc
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| ProfileSynthError::validation(format!("metadata not serializable: {e}")))?;
        let now = Utc::now().to_rfc3339();

        self.conn
            .execute(
                "INSERT INTO documents (collection_id, doc_id, content, metadata_json, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(collection_id, doc_id) DO UPDATE SET
                   content = excluded.content,
                   metadata_json = excluded.metadata_json,
                   updated_at = excluded.updated_at",
                params![
                    collection_id,
                    doc.id.as_str(),
                    doc.content.as_deref(),
                    metadata_json.as_deref(),
                    now.as_str(),
                ],
            )
            .await
            .map_err(|e| ProfileSynthError::store_query(collection, e.to_string()))?;
        Ok(())
    }
}

impl DocumentStore for Storage {
    async fn list_collections(&self) -> Result<Vec<CollectionInfo>> {
        let mut rows = self
            .conn
            .query(
                "SELECT c.name, COUNT(d.doc_id)
                 FROM collections c
                 LEFT JOIN documents d ON d.collection_id = c.id
                 GROUP BY c.id
                 ORDER BY c.id",
                params![],
            )
            .await
            .map_err(|e| ProfileSynthError::StoreConnection(e.to_string()))?;

        let mut results = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| ProfileSynthError::StoreConnection(e.to_string()))?
        {
            results.push(CollectionInfo {
                name: row
                    .get::<String>(0)
                    .map_err(|e| ProfileSynthError::StoreConnection(e.to_string()))?,
                document_count: row.get::<i64>(1).unwrap_or(0) as usize,
            });
        }
        Ok(results)
    }

    async fn get_where(
        &self,
        collection: &str,
        filter: &MetadataFilter,
    ) -> Result<Vec<StoredDocument>> {
        let collection_id = self.require_collection(collection).await?;
        let MetadataFilter::Eq { field, value } = filter;
        let json_path = format!("$.\"{}\"", field.replace('"', "\\\""));
        let value = filter_param(collection, value)?;

        let rows = self
            .conn
            .query(
                "SELECT doc_id, content, metadata_json FROM documents
                 WHERE collection_id = ?1 AND json_extract(metadata_json, ?2) = ?3
                 ORDER BY rowid",
                params![collection_id, json_path.as_str(), value],
            )
            .await
            .map_err(|e| ProfileSynthError::store_query(collection, e.to_string()))?;

        collect_documents(collection, rows).await
    }

    async fn get_all(&self, collection: &str) -> Result<Vec<StoredDocument>> {
        let collection_id = self.require_collection(collection).await?;
        let rows = self
            .conn
            .query(
                "SELECT doc_id, content, metadata_json FROM documents
                 WHERE collection_id = ?1 ORDER BY rowid",
                params![collection_id],
            )
            .await
            .map_err(|e| ProfileSynthError::store_query(collection, e.to_string()))?;

        collect_documents(collection, rows).await
    }
}

/// Build a database handle and a connection for `path`.
async fn connect(path: &Path) -> Result<(Database, Connection)> {
    let db = libsql::Builder::new_local(path)
        .build()
        .await
        .map_err(|e| ProfileSynthError::StoreConnection(e.to_string()))?;

    let conn = db
        .connect()
        .map_err(|e| ProfileSynthError::StoreConnection(e.to_string()))?;

    Ok((db, conn))
}

/// Convert a scalar filter value into the SQL value `json_extract` yields for it.
fn filter_param(collection: &str, value: &serde_json::Value) -> Result<libsql::Value> {
    use serde_json::Value;

    match value {
        Value::String(s) => Ok(libsql::Value::Text(s.clone())),
        Value::Bool(b) => Ok(libsql::Value::Integer(i64::from(*b))),
        Value::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => Ok(libsql::Value::Integer(i)),
            (None, Some(f)) => Ok(libsql::Value::Real(f)),
            _ => Err(ProfileSynthError::store_query(
                collection,
                format!("unsupported numeric filter value {n}"),
            )),
        },
        other => Err(ProfileSynthError::store_query(
            collection,
            format!("filter value must be a scalar, got {other}"),
        )),
    }
}

/// Drain `rows` into documents. A failed fetch fails the whole read.
async fn collect_documents(collection: &str, mut rows: libsql::Rows) -> Result<Vec<StoredDocument>> {
    let mut results = Vec::new();
    while let Some(row) = rows
        .next()
        .await
        .map_err(|e| ProfileSynthError::store_query(collection, e.to_string()))?
    {
        results.push(row_to_document(collection, &row)?);
    }
    Ok(results)
}

/// Convert a database row to a [`StoredDocument`].
fn row_to_document(collection: &str, row: &libsql::Row) -> Result<StoredDocument> {
    let metadata = match row.get::<String>(2).ok() {
        Some(json) => {
            let value: Metadata = serde_json::from_str(&json).map_err(|e| {
                ProfileSynthError::store_query(collection, format!("corrupt metadata: {e}"))
            })?;
            Some(value)
        }
        None => None,
    };

    Ok(StoredDocument {
        id: row
            .get::<String>(0)
            .map_err(|e| ProfileSynthError::store_query(collection, e.to_string()))?,
        content: row.get::<String>(1).ok(),
        metadata,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use uuid::Uuid;

    /// Create a temp file storage for testing.
    async fn test_storage() -> Storage {
        let tmp = std::env::temp_dir().join(format!("ps_test_{}.db", Uuid::now_v7()));
        Storage::open(&tmp).await.expect("open test db")
    }

    fn doc(id: &str, content: &str, metadata: serde_json::Value) -> StoredDocument {
        StoredDocument {
            id: id.into(),
            content: Some(content.into()),
            metadata: metadata.as_object().cloned(),
        }
    }

    #[tokio::test]
    async fn open_and_migrate() {
        let storage = test_storage().await;
        assert_eq!(storage.get_schema_version().await, 1);
    }

    #[tokio::test]
    async fn idempotent_migration() {
        let tmp = std::env::temp_dir().join(format!("ps_test_{}.db", Uuid::now_v7()));
        let s1 = Storage::open(&tmp).await.expect("first open");
        drop(s1);
        let s2 = Storage::open(&tmp).await.expect("second open");
        assert_eq!(s2.get_schema_version().await, 1);
    }

    #[tokio::test]
    async fn collections_list_in_creation_order_with_counts() {
        let storage = test_storage().await;
        storage.create_collection("students_info").await.unwrap();
        storage.create_collection("faculty").await.unwrap();
        storage.create_collection("students_info").await.unwrap();

        storage
            .upsert_document("students_info", &doc("a", "alpha", json!({})))
            .await
            .unwrap();
        storage
            .upsert_document("students_info", &doc("b", "beta", json!({})))
            .await
            .unwrap();

        let collections = storage.list_collections().await.expect("list");
        assert_eq!(collections.len(), 2);
        assert_eq!(collections[0].name, "students_info");
        assert_eq!(collections[0].document_count, 2);
        assert_eq!(collections[1].name, "faculty");
        assert_eq!(collections[1].document_count, 0);
    }

    #[tokio::test]
    async fn get_where_filters_on_metadata_field() {
        let storage = test_storage().await;
        storage.create_collection("students_grades").await.unwrap();
        storage
            .upsert_document(
                "students_grades",
                &doc("g1", "Math: 1.25", json!({"student_id": "PDM-2025-0001"})),
            )
            .await
            .unwrap();
        storage
            .upsert_document(
                "students_grades",
                &doc("g2", "Math: 2.00", json!({"student_id": "PDM-2025-0002"})),
            )
            .await
            .unwrap();
        storage
            .upsert_document(
                "students_grades",
                &doc("g3", "English: 1.50", json!({"student_id": "PDM-2025-0001"})),
            )
            .await
            .unwrap();

        let found = storage
            .get_where(
                "students_grades",
                &MetadataFilter::eq("student_id", "PDM-2025-0001"),
            )
            .await
            .expect("query");
        let ids: Vec<_> = found.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, ["g1", "g3"]);
        assert_eq!(
            found[0].metadata.as_ref().unwrap()["student_id"],
            json!("PDM-2025-0001")
        );
    }

    #[tokio::test]
    async fn get_where_matches_numeric_and_bool_values() {
        let storage = test_storage().await;
        storage.create_collection("students_info").await.unwrap();
        storage
            .upsert_document(
                "students_info",
                &doc("s1", "x", json!({"year": 3, "enrolled": true})),
            )
            .await
            .unwrap();

        let by_year = storage
            .get_where(
                "students_info",
                &MetadataFilter::Eq {
                    field: "year".into(),
                    value: json!(3),
                },
            )
            .await
            .unwrap();
        assert_eq!(by_year.len(), 1);

        let by_flag = storage
            .get_where(
                "students_info",
                &MetadataFilter::Eq {
                    field: "enrolled".into(),
                    value: json!(true),
                },
            )
            .await
            .unwrap();
        assert_eq!(by_flag.len(), 1);
    }

    #[tokio::test]
    async fn upsert_keeps_position_and_replaces_content() {
        let storage = test_storage().await;
        storage.create_collection("notes").await.unwrap();
        storage
            .upsert_document("notes", &doc("first", "v1", json!({})))
            .await
            .unwrap();
        storage
            .upsert_document("notes", &doc("second", "v1", json!({})))
            .await
            .unwrap();
        storage
            .upsert_document("notes", &doc("first", "v2", json!({"edited": true})))
            .await
            .unwrap();

        let all = storage.get_all("notes").await.expect("get all");
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].id, "first");
        assert_eq!(all[0].content.as_deref(), Some("v2"));
        assert_eq!(all[1].id, "second");
    }

    #[tokio::test]
    async fn documents_without_text_or_metadata_round_trip_as_none() {
        let storage = test_storage().await;
        storage.create_collection("bare").await.unwrap();
        storage
            .upsert_document(
                "bare",
                &StoredDocument {
                    id: "empty".into(),
                    content: None,
                    metadata: None,
                },
            )
            .await
            .unwrap();

        let all = storage.get_all("bare").await.unwrap();
        assert_eq!(all[0].content, None);
        assert_eq!(all[0].metadata, None);
    }

    #[tokio::test]
    async fn missing_collection_is_a_query_error() {
        let storage = test_storage().await;
        let err = storage.get_all("nope").await.unwrap_err();
        assert!(matches!(err, ProfileSynthError::StoreQuery { ref collection, .. } if collection == "nope"));
    }

    #[tokio::test]
    async fn delete_collection_removes_documents() {
        let storage = test_storage().await;
        storage.create_collection("tmp").await.unwrap();
        storage
            .upsert_document("tmp", &doc("x", "y", json!({})))
            .await
            .unwrap();

        assert!(storage.delete_collection("tmp").await.unwrap());
        assert!(!storage.delete_collection("tmp").await.unwrap());
        assert!(storage.list_collections().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn readonly_rejects_writes() {
        let tmp = std::env::temp_dir().join(format!("ps_test_{}.db", Uuid::now_v7()));
        let rw = Storage::open(&tmp).await.unwrap();
        rw.create_collection("students_info").await.unwrap();
        drop(rw);

        let ro = Storage::open_readonly(&tmp).await.unwrap();
        let result = ro.create_collection("other").await;
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("read-only"));
        assert_eq!(ro.list_collections().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn readonly_connection_refuses_raw_sql_writes() {
        let tmp = std::env::temp_dir().join(format!("ps_test_{}.db", Uuid::now_v7()));
        drop(Storage::open(&tmp).await.unwrap());

        let ro = Storage::open_readonly(&tmp).await.unwrap();
        let result = ro
            .conn
            .execute(
                "INSERT INTO collections (name, created_at) VALUES ('sneaky', 'now')",
                params![],
            )
            .await;
        assert!(result.is_err());
        assert!(ro.list_collections().await.unwrap().is_empty());
    }

    /// Insert a row whose metadata column is not valid JSON.
    async fn insert_corrupt_row(storage: &Storage, collection: &str, id: &str) {
        let collection_id = storage.require_collection(collection).await.unwrap();
        storage
            .conn
            .execute(
                "INSERT INTO documents (collection_id, doc_id, content, metadata_json, updated_at)
                 VALUES (?1, ?2, 'broken', '{not json', 'now')",
                params![collection_id, id],
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn mid_stream_fetch_error_fails_the_read() {
        let storage = test_storage().await;
        storage.create_collection("students_info").await.unwrap();
        let profile = json!({"student_id": "PDM-2025-0001"});
        for id in ["s1", "s2"] {
            storage
                .upsert_document("students_info", &doc(id, "ok", profile.clone()))
                .await
                .unwrap();
        }
        insert_corrupt_row(&storage, "students_info", "s3").await;
        for id in ["s4", "s5"] {
            storage
                .upsert_document("students_info", &doc(id, "ok", profile.clone()))
                .await
                .unwrap();
        }

        // json_extract fails while stepping over the third row.
        let err = storage
            .get_where(
                "students_info",
                &MetadataFilter::eq("student_id", "PDM-2025-0001"),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ProfileSynthError::StoreQuery { ref collection, .. } if collection == "students_info"));

        let err = storage.get_all("students_info").await.unwrap_err();
        assert!(matches!(err, ProfileSynthError::StoreQuery { .. }));
    }

    #[tokio::test]
    async fn readonly_open_of_missing_file_is_connection_error() {
        let tmp = std::env::temp_dir().join(format!("ps_missing_{}.db", Uuid::now_v7()));
        let err = Storage::open_readonly(&tmp).await.err().expect("should fail");
        assert!(matches!(err, ProfileSynthError::StoreConnection(_)));
        assert!(!tmp.exists());
    }
}
