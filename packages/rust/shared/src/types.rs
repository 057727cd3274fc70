//! Core domain types shared by the store, the pipelines, and the CLI.

use serde::{Deserialize, Serialize};

/// Document metadata: a flat JSON object of scalar values.
pub type Metadata = serde_json::Map<String, serde_json::Value>;

// ---------------------------------------------------------------------------
// Store-facing types
// ---------------------------------------------------------------------------

/// A document as held by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDocument {
    /// Identifier, unique within its collection.
    pub id: String,
    /// Document text. `None` when the record was stored without text.
    #[serde(default)]
    pub content: Option<String>,
    /// Metadata object. `None` when the record was stored without metadata.
    #[serde(default)]
    pub metadata: Option<Metadata>,
}

/// A collection listing entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionInfo {
    /// Collection name.
    pub name: String,
    /// Number of documents currently stored in it.
    pub document_count: usize,
}

/// Entry of an ingest file. The id is generated when absent.
#[derive(Debug, Clone, Deserialize)]
pub struct IngestDocument {
    #[serde(default)]
    pub id: Option<String>,
    pub content: String,
    #[serde(default)]
    pub metadata: Metadata,
}

// ---------------------------------------------------------------------------
// Pipeline types
// ---------------------------------------------------------------------------

/// One profile document found for a student.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfileRecord {
    /// Name of the collection the record came from.
    pub source_collection: String,
    /// Document text.
    pub content: String,
    /// Document metadata.
    pub metadata: Metadata,
}

/// One generated question/answer pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QaPair {
    pub question: String,
    pub answer: String,
}

/// The document shape the generation service is asked to produce.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QaSet {
    pub qa_pairs: Vec<QaPair>,
}

/// One exported record, rendered straight into the export stream.
#[derive(Debug, Clone)]
pub struct ExportRecord<'a> {
    pub id: &'a str,
    pub metadata: serde_json::Value,
    pub content: &'a str,
}

impl<'a> From<&'a StoredDocument> for ExportRecord<'a> {
    fn from(doc: &'a StoredDocument) -> Self {
        Self {
            id: &doc.id,
            metadata: doc
                .metadata
                .clone()
                .map(serde_json::Value::Object)
                .unwrap_or_else(|| serde_json::Value::Object(Metadata::new())),
            content: doc.content.as_deref().unwrap_or("N/A"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qa_set_deserializes() {
        let json = r#"{"qa_pairs":[{"question":"What is your student ID?","answer":"PDM-2025-0001"}]}"#;
        let set: QaSet = serde_json::from_str(json).expect("deserialize");
        assert_eq!(set.qa_pairs.len(), 1);
        assert_eq!(set.qa_pairs[0].answer, "PDM-2025-0001");
    }

    #[test]
    fn ingest_document_defaults() {
        let json = r#"{"content":"Name: Juan dela Cruz"}"#;
        let doc: IngestDocument = serde_json::from_str(json).expect("deserialize");
        assert!(doc.id.is_none());
        assert!(doc.metadata.is_empty());
    }

    #[test]
    fn export_record_fills_missing_fields() {
        let doc = StoredDocument {
            id: "doc-1".into(),
            content: None,
            metadata: None,
        };
        let record = ExportRecord::from(&doc);
        assert_eq!(record.id, "doc-1");
        assert_eq!(record.content, "N/A");
        assert_eq!(record.metadata, serde_json::json!({}));
    }
}
