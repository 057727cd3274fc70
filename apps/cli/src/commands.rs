//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use profilesynth_core::artifact::OverwritePolicy;
use profilesynth_core::export::{self, ExportOutcome};
use profilesynth_core::generation::GenerationClient;
use profilesynth_core::pipeline::{self, ProgressReporter, QaRunOptions, QaRunOutcome};
use profilesynth_core::retriever::RetrievalOptions;
use profilesynth_shared::{
    AppConfig, GenerationSettings, IngestDocument, ProfileSynthError, StoredDocument, init_config,
    load_config, load_config_from,
};
use profilesynth_storage::{DocumentStore, Storage};
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// ProfileSynth: generate Q&A training data from student profiles.
#[derive(Parser)]
#[command(
    name = "profilesynth",
    version,
    about = "Generate question/answer pairs from stored student profiles and export the profile store.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file to use instead of ~/.profilesynth/profilesynth.toml.
    #[arg(long, global = true, env = "PROFILESYNTH_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Generate Q&A pairs for one student and save them as JSON.
    Generate {
        /// Student identifier (defaults to `defaults.student_id`).
        #[arg(short, long)]
        student_id: Option<String>,

        /// Number of Q&A pairs to request.
        #[arg(short = 'n', long)]
        count: Option<u32>,

        /// Output JSON path.
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Document store path.
        #[arg(long)]
        db: Option<PathBuf>,

        /// Keep the previous artifact if the new response is not valid JSON.
        #[arg(long)]
        preserve_on_failure: bool,
    },

    /// Dump every collection of the store to a text file.
    Export {
        /// Output text path.
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Document store path.
        #[arg(long)]
        db: Option<PathBuf>,
    },

    /// Load documents from a JSON array file into a collection.
    Ingest {
        /// Target collection (created if missing).
        #[arg(short, long)]
        collection: String,

        /// JSON file holding `[{"id"?, "content", "metadata"?}, ...]`.
        #[arg(short, long)]
        file: PathBuf,

        /// Document store path.
        #[arg(long)]
        db: Option<PathBuf>,
    },

    /// List collections and their document counts.
    List {
        /// Document store path.
        #[arg(long)]
        db: Option<PathBuf>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = format!(
        "profilesynth={level},profilesynth_core={level},profilesynth_storage={level},profilesynth_shared={level}"
    );

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.clone();
    match cli.command {
        Command::Generate {
            student_id,
            count,
            out,
            db,
            preserve_on_failure,
        } => {
            let config = resolve_config(config_path.as_deref())?;
            cmd_generate(&config, student_id, count, out, db, preserve_on_failure).await
        }
        Command::Export { out, db } => {
            let config = resolve_config(config_path.as_deref())?;
            cmd_export(&config, out, db).await
        }
        Command::Ingest {
            collection,
            file,
            db,
        } => {
            let config = resolve_config(config_path.as_deref())?;
            cmd_ingest(&config, &collection, &file, db).await
        }
        Command::List { db } => {
            let config = resolve_config(config_path.as_deref())?;
            cmd_list(&config, db).await
        }
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => {
                let config = resolve_config(config_path.as_deref())?;
                cmd_config_show(&config).await
            }
        },
    }
}

/// Load the config from `--config` if given, else from the default location.
fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        Some(p) => load_config_from(p)?,
        None => load_config()?,
    };
    Ok(config)
}

fn store_path(config: &AppConfig, db: Option<PathBuf>) -> PathBuf {
    db.unwrap_or_else(|| PathBuf::from(&config.store.path))
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_generate(
    config: &AppConfig,
    student_id: Option<String>,
    count: Option<u32>,
    out: Option<PathBuf>,
    db: Option<PathBuf>,
    preserve_on_failure: bool,
) -> Result<()> {
    // Resolve the API key before touching the store
    let settings = GenerationSettings::from_config(config)?;
    let client = GenerationClient::new(settings)?;

    let options = QaRunOptions {
        student_id: student_id.unwrap_or_else(|| config.defaults.student_id.clone()),
        question_count: count.unwrap_or(config.defaults.question_count),
        output_path: out.unwrap_or_else(|| PathBuf::from(&config.defaults.qa_output)),
        overwrite: if preserve_on_failure {
            OverwritePolicy::PreserveOnFailure
        } else {
            OverwritePolicy::RemoveFirst
        },
        retrieval: RetrievalOptions::from(&config.store),
    };
    if options.question_count == 0 {
        return Err(eyre!("--count must be at least 1"));
    }
    let db_path = store_path(config, db);

    info!(
        student_id = %options.student_id,
        count = options.question_count,
        db = %db_path.display(),
        "generating Q&A pairs"
    );

    let reporter = CliProgress::new();
    let outcome = pipeline::generate_qa_at(&db_path, &client, &options, &reporter).await?;

    println!();
    match outcome {
        QaRunOutcome::Written {
            artifact,
            records_used,
            elapsed,
        } => {
            println!("  Q&A pairs saved!");
            println!("  Student: {}", options.student_id);
            println!("  Records: {records_used}");
            match artifact.qa_pair_count {
                Some(n) => println!("  Pairs:   {n}"),
                None => println!("  Pairs:   (response has no qa_pairs list)"),
            }
            println!("  Path:    {}", artifact.path.display());
            println!("  Time:    {:.1}s", elapsed.as_secs_f64());
            println!();
            println!("--- FILE CONTENT ---");
            println!("{}", serde_json::to_string_pretty(&artifact.document)?);
            println!("--------------------");
        }
        QaRunOutcome::ProfileNotFound => {
            println!(
                "  No profile found for {} in collections matching '{}'. Aborting.",
                options.student_id, options.retrieval.collection_marker
            );
        }
        QaRunOutcome::StoreUnavailable(reason) => {
            println!(
                "  Could not read the document store at '{}': {reason}",
                db_path.display()
            );
        }
        QaRunOutcome::GenerationFailed {
            attempts,
            last_error,
        } => {
            println!(
                "  The generation service did not produce an answer after {attempts} attempt(s): {last_error}"
            );
        }
        QaRunOutcome::ResponseNotJson { message, raw } => {
            println!("  Failed to decode JSON from the generation service ({message}).");
            println!("  The response was: {raw}");
        }
    }
    println!();

    Ok(())
}

async fn cmd_export(config: &AppConfig, out: Option<PathBuf>, db: Option<PathBuf>) -> Result<()> {
    let db_path = store_path(config, db);
    let out_path = out.unwrap_or_else(|| PathBuf::from(&config.defaults.export_output));

    info!(db = %db_path.display(), out = %out_path.display(), "exporting document store");

    let store = match Storage::open_readonly(&db_path).await {
        Ok(store) => store,
        Err(e) => {
            println!("Error connecting to the document store: {e}");
            return Ok(());
        }
    };

    match export::export_to_file(&store, &out_path).await {
        Ok(ExportOutcome::Written { path, summary }) => {
            println!();
            println!("  Export complete!");
            println!("  Collections: {}", summary.collections);
            println!("  Documents:   {}", summary.documents);
            if !summary.skipped_collections.is_empty() {
                println!("  Unreadable:  {}", summary.skipped_collections.join(", "));
            }
            println!("  Path:        {}", path.display());
            println!();
        }
        Ok(ExportOutcome::NoCollections) => {
            println!("No collections found in the document store. Nothing to export.");
        }
        Err(e) => {
            println!("An error occurred during the export: {e}");
        }
    }

    Ok(())
}

async fn cmd_ingest(
    config: &AppConfig,
    collection: &str,
    file: &Path,
    db: Option<PathBuf>,
) -> Result<()> {
    let content = std::fs::read_to_string(file)
        .wrap_err_with(|| format!("cannot read '{}'", file.display()))?;
    let docs: Vec<IngestDocument> = serde_json::from_str(&content)
        .wrap_err_with(|| format!("'{}' is not a JSON array of documents", file.display()))?;

    let db_path = store_path(config, db);
    let store = Storage::open(&db_path).await?;
    store.create_collection(collection).await?;

    for doc in &docs {
        let stored = StoredDocument {
            id: doc
                .id
                .clone()
                .unwrap_or_else(|| uuid::Uuid::now_v7().to_string()),
            content: Some(doc.content.clone()),
            metadata: Some(doc.metadata.clone()),
        };
        store.upsert_document(collection, &stored).await?;
    }

    info!(collection, count = docs.len(), db = %db_path.display(), "ingested documents");
    println!("Ingested {} documents into '{collection}'.", docs.len());
    Ok(())
}

async fn cmd_list(config: &AppConfig, db: Option<PathBuf>) -> Result<()> {
    let db_path = store_path(config, db);
    let store = Storage::open_readonly(&db_path).await?;
    let collections = store.list_collections().await?;

    if collections.is_empty() {
        println!("No collections in '{}'.", db_path.display());
        return Ok(());
    }

    let width = collections.iter().map(|c| c.name.len()).max().unwrap_or(0);
    for c in &collections {
        let marker = if c.name.contains(&config.store.profile_collection_marker) {
            "*"
        } else {
            " "
        };
        println!("{marker} {:<width$}  {}", c.name, c.document_count);
    }
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(config: &AppConfig) -> Result<()> {
    let toml_str = toml::to_string_pretty(config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
            spinner.set_style(
                style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
            );
        }
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn done(&self, _outcome: &QaRunOutcome) {
        self.spinner.finish_and_clear();
    }

    fn failed(&self, _error: &ProfileSynthError) {
        self.spinner.finish_and_clear();
    }
}

impl Drop for CliProgress {
    // Clears the spinner when a run ends in an error instead of an outcome.
    fn drop(&mut self) {
        if !self.spinner.is_finished() {
            self.spinner.finish_and_clear();
        }
    }
}
