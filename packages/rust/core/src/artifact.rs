//! JSON artifact writer.
//!
//! Parses a generation response and persists it pretty-printed at a fixed
//! path, replacing whatever was there. The file itself is always swapped in
//! with a rename, so a reader never sees a half-written artifact.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument, warn};

use profilesynth_shared::{ProfileSynthError, Result};

/// What happens to an existing artifact when the new response is unusable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OverwritePolicy {
    /// Delete the old artifact before parsing. A parse failure leaves no file.
    #[default]
    RemoveFirst,
    /// Parse first and only replace the old artifact on success.
    PreserveOnFailure,
}

/// Metadata about a written artifact.
#[derive(Debug, Clone)]
pub struct ArtifactWriteResult {
    pub path: PathBuf,
    pub size_bytes: usize,
    pub sha256: String,
    /// Length of the top-level `qa_pairs` array, when present.
    pub qa_pair_count: Option<usize>,
    /// The parsed document as written.
    pub document: serde_json::Value,
}

/// Parse `raw` as JSON and write it pretty-printed to `path`.
///
/// On a parse failure this returns [`ProfileSynthError::ResponseParse`]
/// carrying the raw text.
#[instrument(skip_all, fields(path = %path.display(), ?policy))]
pub fn write_json_artifact(
    path: &Path,
    raw: &str,
    policy: OverwritePolicy,
) -> Result<ArtifactWriteResult> {
    if policy == OverwritePolicy::RemoveFirst {
        remove_existing(path)?;
    }

    let document: serde_json::Value = serde_json::from_str(raw).map_err(|e| {
        warn!(error = %e, "response is not valid JSON");
        ProfileSynthError::ResponseParse {
            message: e.to_string(),
            raw: raw.to_string(),
        }
    })?;

    let pretty = serde_json::to_string_pretty(&document).map_err(|e| {
        ProfileSynthError::validation(format!("JSON serialization failed: {e}"))
    })?;
    write_atomic(path, pretty.as_bytes())?;

    let mut hasher = Sha256::new();
    hasher.update(pretty.as_bytes());
    let sha256 = format!("{:x}", hasher.finalize());

    let qa_pair_count = document
        .get("qa_pairs")
        .and_then(|v| v.as_array())
        .map(Vec::len);

    info!(size = pretty.len(), ?qa_pair_count, "artifact written");

    Ok(ArtifactWriteResult {
        path: path.to_path_buf(),
        size_bytes: pretty.len(),
        sha256,
        qa_pair_count,
        document,
    })
}

/// Delete `path` if it exists.
fn remove_existing(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            debug!("removed previous artifact");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(ProfileSynthError::io(path, e)),
    }
}

/// Temp sibling used while writing `path`.
pub(crate) fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "artifact".into());
    path.with_file_name(format!(".{name}.tmp"))
}

/// Ensure the parent directory of `path` exists.
pub(crate) fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).map_err(|e| ProfileSynthError::io(parent, e))?;
        }
    }
    Ok(())
}

/// Write to a temp sibling, then rename over `path`.
fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
    ensure_parent(path)?;
    let temp = temp_path(path);

    std::fs::write(&temp, content).map_err(|e| ProfileSynthError::io(&temp, e))?;
    std::fs::rename(&temp, path).map_err(|e| {
        let _ = std::fs::remove_file(&temp);
        ProfileSynthError::io(path, e)
    })?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
