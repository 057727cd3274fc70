//! In-memory [`DocumentStore`] used by unit tests.

use std::collections::HashSet;

use profilesynth_shared::{CollectionInfo, ProfileSynthError, Result, StoredDocument};
use profilesynth_storage::{DocumentStore, MetadataFilter};

#[derive(Default)]
pub(crate) struct FakeStore {
    collections: Vec<(String, Vec<StoredDocument>)>,
    failing: HashSet<String>,
    unreachable: bool,
}

impl FakeStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn unreachable() -> Self {
        Self {
            unreachable: true,
            ..Self::default()
        }
    }

    pub(crate) fn with_collection(mut self, name: &str, docs: Vec<StoredDocument>) -> Self {
        self.collections.push((name.to_string(), docs));
        self
    }

    /// Queries on `name` fail; listing still reports it.
    pub(crate) fn failing_collection(mut self, name: &str) -> Self {
        self.failing.insert(name.to_string());
        self
    }

    fn docs(&self, name: &str) -> Result<&[StoredDocument]> {
        if self.failing.contains(name) {
            return Err(ProfileSynthError::store_query(name, "simulated failure"));
        }
        self.collections
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, docs)| docs.as_slice())
            .ok_or_else(|| ProfileSynthError::store_query(name, "collection does not exist"))
    }
}

pub(crate) fn doc(id: &str, content: &str, metadata: serde_json::Value) -> StoredDocument {
    StoredDocument {
        id: id.into(),
        content: Some(content.into()),
        metadata: metadata.as_object().cloned(),
    }
}

impl DocumentStore for FakeStore {
    async fn list_collections(&self) -> Result<Vec<CollectionInfo>> {
        if self.unreachable {
            return Err(ProfileSynthError::StoreConnection("simulated outage".into()));
        }
        Ok(self
            .collections
            .iter()
            .map(|(name, docs)| CollectionInfo {
                name: name.clone(),
                document_count: docs.len(),
            })
            .collect())
    }

    async fn get_where(
        &self,
        collection: &str,
        filter: &MetadataFilter,
    ) -> Result<Vec<StoredDocument>> {
        let MetadataFilter::Eq { field, value } = filter;
        Ok(self
            .docs(collection)?
            .iter()
            .filter(|d| {
                d.metadata
                    .as_ref()
                    .and_then(|m| m.get(field))
                    .is_some_and(|v| v == value)
            })
            .cloned()
            .collect())
    }

    async fn get_all(&self, collection: &str) -> Result<Vec<StoredDocument>> {
        Ok(self.docs(collection)?.to_vec())
    }
}
