//! Shared types, error model, and configuration for ProfileSynth.
//!
//! This crate is the foundation depended on by all other ProfileSynth crates.
//! It provides:
//! - [`ProfileSynthError`]: the unified error type
//! - Domain types ([`ProfileRecord`], [`StoredDocument`], [`QaSet`], [`ExportRecord`])
//! - Configuration ([`AppConfig`], [`GenerationSettings`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DefaultsConfig, GenerationConfig, GenerationSettings, StoreConfig, config_dir,
    config_file_path, init_config, load_config, load_config_from, resolve_api_key,
};
pub use error::{ProfileSynthError, Result};
pub use types::{
    CollectionInfo, ExportRecord, IngestDocument, Metadata, ProfileRecord, QaPair, QaSet,
    StoredDocument,
};
