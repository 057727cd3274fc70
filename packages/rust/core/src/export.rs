//! Whole-store text export.
//!
//! Dumps every record of every collection into one human-readable stream,
//! framed by per-collection start/end delimiters. The format is meant for
//! reading (by people or models), not for parsing back.

use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use tracing::{info, instrument, warn};

use profilesynth_shared::{CollectionInfo, ExportRecord, ProfileSynthError, Result};
use profilesynth_storage::DocumentStore;

use crate::artifact::{ensure_parent, temp_path};

const COLLECTION_RULE: &str = "###################################";
const DOCUMENT_RULE: &str =
    "================================================================================";
const FIELD_RULE: &str = "--------------------";

/// Counts for a finished export.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportSummary {
    /// Collections framed in the output.
    pub collections: usize,
    /// Document blocks written.
    pub documents: usize,
    /// Collections whose records could not be read.
    pub skipped_collections: Vec<String>,
}

/// Result of [`export_to_file`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportOutcome {
    /// The export file was replaced.
    Written { path: PathBuf, summary: ExportSummary },
    /// The store holds no collections; the target was left untouched.
    NoCollections,
}

/// Export every collection of `store` into `out`.
#[instrument(skip_all)]
pub async fn export_store<S: DocumentStore, W: Write>(
    store: &S,
    out: &mut W,
) -> Result<ExportSummary> {
    let collections = store.list_collections().await?;
    write_export(store, &collections, out, Path::new("<export stream>")).await
}

/// Export every collection of `store` into the file at `path`.
///
/// The dump is built in a temp sibling and renamed over `path` once complete.
#[instrument(skip_all, fields(path = %path.display()))]
pub async fn export_to_file<S: DocumentStore>(store: &S, path: &Path) -> Result<ExportOutcome> {
    let collections = store.list_collections().await?;
    if collections.is_empty() {
        info!("no collections found, nothing to export");
        return Ok(ExportOutcome::NoCollections);
    }

    info!(
        count = collections.len(),
        names = ?collections.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
        "exporting collections"
    );

    ensure_parent(path)?;
    let temp = temp_path(path);
    let file = std::fs::File::create(&temp).map_err(|e| ProfileSynthError::io(&temp, e))?;
    let mut writer = BufWriter::new(file);

    let written = write_export(store, &collections, &mut writer, &temp).await;
    let flushed = written.and_then(|summary| {
        writer
            .flush()
            .map_err(|e| ProfileSynthError::io(&temp, e))
            .map(|()| summary)
    });
    drop(writer);

    let summary = match flushed {
        Ok(summary) => summary,
        Err(e) => {
            let _ = std::fs::remove_file(&temp);
            return Err(e);
        }
    };

    std::fs::rename(&temp, path).map_err(|e| {
        let _ = std::fs::remove_file(&temp);
        ProfileSynthError::io(path, e)
    })?;

    info!(
        collections = summary.collections,
        documents = summary.documents,
        "export complete"
    );

    Ok(ExportOutcome::Written {
        path: path.to_path_buf(),
        summary,
    })
}

/// Write the framed dump for `collections`. `sink` only labels I/O errors.
async fn write_export<S: DocumentStore, W: Write>(
    store: &S,
    collections: &[CollectionInfo],
    out: &mut W,
    sink: &Path,
) -> Result<ExportSummary> {
    let io_err = |e: std::io::Error| ProfileSynthError::io(sink, e);
    let mut summary = ExportSummary::default();

    for collection in collections {
        let name = &collection.name;
        write!(out, "\n{COLLECTION_RULE} START OF COLLECTION: {name} {COLLECTION_RULE}\n\n")
            .map_err(io_err)?;
        summary.collections += 1;

        match store.get_all(name).await {
            Ok(docs) if docs.is_empty() => {
                info!(collection = %name, items = 0, "processing collection");
                writeln!(out, "This collection is empty.").map_err(io_err)?;
            }
            Ok(docs) => {
                info!(collection = %name, items = docs.len(), "processing collection");
                for doc in &docs {
                    write_record(out, &ExportRecord::from(doc)).map_err(io_err)?;
                    summary.documents += 1;
                }
            }
            Err(e) => {
                warn!(collection = %name, error = %e, "could not read collection");
                writeln!(out, "This collection could not be read: {e}").map_err(io_err)?;
                summary.skipped_collections.push(name.clone());
            }
        }

        write!(out, "{COLLECTION_RULE} END OF COLLECTION: {name} {COLLECTION_RULE}\n\n")
            .map_err(io_err)?;
    }

    Ok(summary)
}

/// Write one document block.
fn write_record<W: Write>(out: &mut W, record: &ExportRecord<'_>) -> std::io::Result<()> {
    let metadata = serde_json::to_string_pretty(&record.metadata)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

    writeln!(out, "{DOCUMENT_RULE}")?;
    writeln!(out, "DOCUMENT ID: {}", record.id)?;
    writeln!(out, "{FIELD_RULE}")?;
    writeln!(out, "METADATA: {metadata}")?;
    writeln!(out, "{FIELD_RULE}")?;
    writeln!(out, "CONTENT:")?;
    write!(out, "{}\n\n", record.content)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
