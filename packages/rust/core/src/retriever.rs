//! Student profile retrieval.
//!
//! Scans every collection whose name carries the profile marker and pulls the
//! documents tagged with the requested student id.

use tracing::{debug, info, instrument, warn};

use profilesynth_shared::{ProfileRecord, StoreConfig};
use profilesynth_storage::{DocumentStore, MetadataFilter};

/// Which collections to scan and which metadata field holds the student id.
#[derive(Debug, Clone)]
pub struct RetrievalOptions {
    /// Substring a collection name must contain to be scanned.
    pub collection_marker: String,
    /// Metadata field compared against the student id.
    pub id_field: String,
}

impl Default for RetrievalOptions {
    fn default() -> Self {
        Self::from(&StoreConfig::default())
    }
}

impl From<&StoreConfig> for RetrievalOptions {
    fn from(config: &StoreConfig) -> Self {
        Self {
            collection_marker: config.profile_collection_marker.clone(),
            id_field: config.student_id_field.clone(),
        }
    }
}

/// Result of a profile lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum RetrievalOutcome {
    /// At least one record matched, in collection order then store order.
    Found(Vec<ProfileRecord>),
    /// The store answered but held nothing for this student.
    NotFound,
    /// The store could not be reached or enumerated.
    ConnectionFailed(String),
}

impl RetrievalOutcome {
    /// Matched records; empty unless [`RetrievalOutcome::Found`].
    pub fn records(&self) -> &[ProfileRecord] {
        match self {
            Self::Found(records) => records,
            _ => &[],
        }
    }
}

/// Fetch every profile record for `student_id`.
///
/// A failing collection is logged and skipped; the remaining collections
/// still contribute.
#[instrument(skip(store, options), fields(marker = %options.collection_marker))]
pub async fn retrieve_profile<S: DocumentStore>(
    store: &S,
    student_id: &str,
    options: &RetrievalOptions,
) -> RetrievalOutcome {
    let collections = match store.list_collections().await {
        Ok(collections) => collections,
        Err(e) => {
            warn!(error = %e, "could not enumerate collections");
            return RetrievalOutcome::ConnectionFailed(e.to_string());
        }
    };

    let filter = MetadataFilter::eq(&options.id_field, student_id);
    let mut records = Vec::new();

    for collection in collections
        .iter()
        .filter(|c| c.name.contains(&options.collection_marker))
    {
        match store.get_where(&collection.name, &filter).await {
            Ok(docs) => {
                debug!(collection = %collection.name, matched = docs.len(), "queried collection");
                records.extend(docs.into_iter().map(|doc| ProfileRecord {
                    source_collection: collection.name.clone(),
                    content: doc.content.unwrap_or_default(),
                    metadata: doc.metadata.unwrap_or_default(),
                }));
            }
            Err(e) => {
                warn!(collection = %collection.name, error = %e, "skipping collection");
            }
        }
    }

    if records.is_empty() {
        info!("no profile records found");
        RetrievalOutcome::NotFound
    } else {
        info!(records = records.len(), "profile retrieved");
        RetrievalOutcome::Found(records)
    }
}
