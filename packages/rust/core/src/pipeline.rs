//! End-to-end `generate` pipeline: store → profile → prompt → model → artifact.

use std::path::{Path, PathBuf};
use std::time::Instant;

use tracing::{info, instrument, warn};

use profilesynth_shared::{ProfileSynthError, Result};
use profilesynth_storage::{DocumentStore, Storage};

use crate::artifact::{self, ArtifactWriteResult, OverwritePolicy};
use crate::context::assemble_context;
use crate::generation::{GenerationClient, GenerationOutcome, GenerationRequest};
use crate::retriever::{self, RetrievalOptions, RetrievalOutcome};

/// Run parameters for [`generate_qa`].
#[derive(Debug, Clone)]
pub struct QaRunOptions {
    /// Student whose profile is used.
    pub student_id: String,
    /// Number of Q&A pairs to request.
    pub question_count: u32,
    /// Where the JSON artifact is written.
    pub output_path: PathBuf,
    /// How an existing artifact is treated.
    pub overwrite: OverwritePolicy,
    /// Collection selection for retrieval.
    pub retrieval: RetrievalOptions,
}

/// How a `generate` run ended.
#[derive(Debug, Clone)]
pub enum QaRunOutcome {
    /// The artifact was written.
    Written {
        artifact: ArtifactWriteResult,
        records_used: usize,
        elapsed: std::time::Duration,
    },
    /// The store was reachable but held no profile for the student.
    ProfileNotFound,
    /// The store could not be opened or enumerated.
    StoreUnavailable(String),
    /// The generation service never produced a usable answer.
    GenerationFailed { attempts: u32, last_error: String },
    /// The service answered with text that is not JSON.
    ResponseNotJson { message: String, raw: String },
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called once the run has an outcome.
    fn done(&self, outcome: &QaRunOutcome);
    /// Called instead of [`done`](Self::done) when the run stops with an error.
    fn failed(&self, _error: &ProfileSynthError) {}
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn done(&self, _outcome: &QaRunOutcome) {}
}

/// Open the store at `db_path` read-only and run [`generate_qa`] on it.
pub async fn generate_qa_at(
    db_path: &Path,
    client: &GenerationClient,
    options: &QaRunOptions,
    progress: &dyn ProgressReporter,
) -> Result<QaRunOutcome> {
    match Storage::open_readonly(db_path).await {
        Ok(store) => generate_qa(&store, client, options, progress).await,
        Err(e) => {
            warn!(path = %db_path.display(), error = %e, "could not open document store");
            let outcome = QaRunOutcome::StoreUnavailable(e.to_string());
            progress.done(&outcome);
            Ok(outcome)
        }
    }
}

/// Run the full `generate` pipeline.
///
/// 1. Retrieve the student's profile records
/// 2. Assemble them into one labeled context
/// 3. Ask the generation service for Q&A pairs
/// 4. Write the JSON artifact
///
/// Only artifact I/O failures are returned as errors; every other way a run
/// can stop early is a [`QaRunOutcome`].
#[instrument(skip_all, fields(student_id = %options.student_id, count = options.question_count))]
pub async fn generate_qa<S: DocumentStore>(
    store: &S,
    client: &GenerationClient,
    options: &QaRunOptions,
    progress: &dyn ProgressReporter,
) -> Result<QaRunOutcome> {
    let start = Instant::now();
    info!("starting Q&A generation");

    match run_stages(store, client, options, progress, start).await {
        Ok(outcome) => {
            progress.done(&outcome);
            Ok(outcome)
        }
        Err(e) => {
            progress.failed(&e);
            Err(e)
        }
    }
}

async fn run_stages<S: DocumentStore>(
    store: &S,
    client: &GenerationClient,
    options: &QaRunOptions,
    progress: &dyn ProgressReporter,
    start: Instant,
) -> Result<QaRunOutcome> {
    // --- Phase 1: Retrieve profile ---
    progress.phase("Retrieving profile");
    let records = match retriever::retrieve_profile(store, &options.student_id, &options.retrieval).await
    {
        RetrievalOutcome::Found(records) => records,
        RetrievalOutcome::NotFound => return Ok(QaRunOutcome::ProfileNotFound),
        RetrievalOutcome::ConnectionFailed(reason) => {
            return Ok(QaRunOutcome::StoreUnavailable(reason));
        }
    };
    let context = assemble_context(&records);

    // --- Phase 2: Generate ---
    progress.phase("Requesting Q&A pairs");
    let request = GenerationRequest::for_profile(&context, options.question_count);
    let (text, attempts) = match client.execute(&request).await {
        GenerationOutcome::Completed { text, attempts } => (text, attempts),
        GenerationOutcome::Exhausted {
            attempts,
            last_error,
        } => {
            return Ok(QaRunOutcome::GenerationFailed {
                attempts,
                last_error,
            });
        }
    };

    if let Some(reason) = service_error(&text) {
        warn!(%reason, "generation service answered with an error object");
        return Ok(QaRunOutcome::GenerationFailed {
            attempts,
            last_error: reason,
        });
    }

    // --- Phase 3: Write artifact ---
    progress.phase("Saving artifact");
    match artifact::write_json_artifact(&options.output_path, &text, options.overwrite) {
        Ok(artifact) => Ok(QaRunOutcome::Written {
            artifact,
            records_used: records.len(),
            elapsed: start.elapsed(),
        }),
        Err(ProfileSynthError::ResponseParse { message, raw }) => {
            Ok(QaRunOutcome::ResponseNotJson { message, raw })
        }
        Err(e) => Err(e),
    }
}

/// The `error` value of a top-level error object without `qa_pairs`.
fn service_error(text: &str) -> Option<String> {
    let serde_json::Value::Object(map) = serde_json::from_str::<serde_json::Value>(text).ok()? else {
        return None;
    };
    if map.contains_key("qa_pairs") {
        return None;
    }
    map.get("error").map(|v| match v.as_str() {
        Some(s) => s.to_string(),
        None => v.to_string(),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
