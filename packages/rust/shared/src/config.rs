//! Application configuration for ProfileSynth.
//!
//! User config lives at `~/.profilesynth/profilesynth.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ProfileSynthError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "profilesynth.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".profilesynth";

// ---------------------------------------------------------------------------
// Config structs (matching profilesynth.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Run parameters used when no CLI flag is given.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Generation endpoint settings.
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Document store settings.
    #[serde(default)]
    pub store: StoreConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Student identifier to generate Q&A pairs for.
    #[serde(default = "default_student_id")]
    pub student_id: String,

    /// Number of question/answer pairs to request.
    #[serde(default = "default_question_count")]
    pub question_count: u32,

    /// Path of the generated Q&A JSON artifact.
    #[serde(default = "default_qa_output")]
    pub qa_output: String,

    /// Path of the bulk export text file.
    #[serde(default = "default_export_output")]
    pub export_output: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            student_id: default_student_id(),
            question_count: default_question_count(),
            qa_output: default_qa_output(),
            export_output: default_export_output(),
        }
    }
}

fn default_student_id() -> String {
    "PDM-2025-0001".into()
}
fn default_question_count() -> u32 {
    5
}
fn default_qa_output() -> String {
    "generated_qa.json".into()
}
fn default_export_output() -> String {
    "store_export_ALL.txt".into()
}

/// `[generation]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Chat-completions endpoint URL.
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Model name sent with every request.
    #[serde(default = "default_model")]
    pub model: String,

    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Per-attempt request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Total attempts per request, including the first.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            model: default_model(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_timeout_secs(),
            max_attempts: default_max_attempts(),
        }
    }
}

fn default_api_url() -> String {
    "https://api.mistral.ai/v1/chat/completions".into()
}
fn default_model() -> String {
    "mistral-small-latest".into()
}
fn default_api_key_env() -> String {
    "MISTRAL_API_KEY".into()
}
fn default_timeout_secs() -> u64 {
    120
}
fn default_max_attempts() -> u32 {
    3
}

/// `[store]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Path of the embedded document store database.
    #[serde(default = "default_store_path")]
    pub path: String,

    /// Substring identifying student-profile collections.
    #[serde(default = "default_collection_marker")]
    pub profile_collection_marker: String,

    /// Metadata field holding the student identifier.
    #[serde(default = "default_student_id_field")]
    pub student_id_field: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
            profile_collection_marker: default_collection_marker(),
            student_id_field: default_student_id_field(),
        }
    }
}

fn default_store_path() -> String {
    "./profile_store/store.db".into()
}
fn default_collection_marker() -> String {
    "students".into()
}
fn default_student_id_field() -> String {
    "student_id".into()
}

// ---------------------------------------------------------------------------
// Generation settings (runtime, resolved from config + environment)
// ---------------------------------------------------------------------------

/// Everything the generation client needs, with the API key resolved.
#[derive(Clone)]
pub struct GenerationSettings {
    pub api_key: String,
    pub api_url: String,
    pub model: String,
    pub timeout: Duration,
    pub max_attempts: u32,
}

impl std::fmt::Debug for GenerationSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationSettings")
            .field("api_key", &"<redacted>")
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .field("max_attempts", &self.max_attempts)
            .finish()
    }
}

impl GenerationSettings {
    /// Resolve settings from config, reading the key from the configured env var.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let api_key = resolve_api_key(config)?;
        url::Url::parse(&config.generation.api_url).map_err(|e| {
            ProfileSynthError::config(format!(
                "invalid generation api_url '{}': {e}",
                config.generation.api_url
            ))
        })?;

        Ok(Self {
            api_key,
            api_url: config.generation.api_url.clone(),
            model: config.generation.model.clone(),
            timeout: Duration::from_secs(config.generation.timeout_secs),
            max_attempts: config.generation.max_attempts.max(1),
        })
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.profilesynth/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| ProfileSynthError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.profilesynth/profilesynth.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| ProfileSynthError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        ProfileSynthError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| ProfileSynthError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| ProfileSynthError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| ProfileSynthError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Read the generation API key from the env var named in the config.
pub fn resolve_api_key(config: &AppConfig) -> Result<String> {
    let var_name = &config.generation.api_key_env;
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(ProfileSynthError::config(format!(
            "generation API key not found. Set the {var_name} environment variable."
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("api_url"));
        assert!(toml_str.contains("MISTRAL_API_KEY"));
        assert!(toml_str.contains("PDM-2025-0001"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.generation.timeout_secs, 120);
        assert_eq!(parsed.generation.max_attempts, 3);
        assert_eq!(parsed.store.profile_collection_marker, "students");
        assert_eq!(parsed.defaults.question_count, 5);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r#"
[generation]
model = "mistral-large-latest"

[defaults]
student_id = "PDM-2025-0042"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.generation.model, "mistral-large-latest");
        assert_eq!(config.generation.api_key_env, "MISTRAL_API_KEY");
        assert_eq!(config.defaults.student_id, "PDM-2025-0042");
        assert_eq!(config.defaults.qa_output, "generated_qa.json");
        assert_eq!(config.store.student_id_field, "student_id");
    }

    #[test]
    fn api_key_resolution_fails_without_env() {
        let mut config = AppConfig::default();
        // Use a unique env var name to avoid interfering with other tests
        config.generation.api_key_env = "PS_TEST_NONEXISTENT_KEY_12345".into();
        let result = resolve_api_key(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("API key not found"));
    }

    #[test]
    fn settings_debug_redacts_key() {
        let settings = GenerationSettings {
            api_key: "sk-very-secret".into(),
            api_url: default_api_url(),
            model: default_model(),
            timeout: Duration::from_secs(120),
            max_attempts: 3,
        };
        let shown = format!("{settings:?}");
        assert!(!shown.contains("sk-very-secret"));
        assert!(shown.contains("redacted"));
    }
}
