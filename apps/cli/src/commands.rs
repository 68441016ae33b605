//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tracing::info;

use payslip_core::{AskSettings, Upload};
use payslip_generation::OpenRouterClient;
use payslip_shared::{AppConfig, StructuredPayslip, expand_home, init_config, load_config};
use payslip_storage::{Embedder, Storage};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// Payslip assistant: index payslips, ask questions, compare months.
#[derive(Parser)]
#[command(
    name = "payslip",
    version,
    about = "Index payslips and answer questions about them with retrieval-augmented generation.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Index database path (overrides `[store] db_path`).
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

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
    /// Index a structured payslip (JSON) into the store.
    Index {
        /// Structured payslip JSON file.
        #[arg(long)]
        data: PathBuf,

        /// Original payslip file; its bytes feed the content hash.
        #[arg(long)]
        file: Option<PathBuf>,

        /// Source label (defaults to the original file's name).
        #[arg(long)]
        source: Option<String>,
    },

    /// Extract a payslip image with the vision model and index it.
    Extract {
        /// Payslip page image (PNG, JPEG or WebP).
        file: PathBuf,

        /// Content type, when the extension is not enough.
        #[arg(long)]
        content_type: Option<String>,
    },

    /// Ask a question about one payslip.
    Ask {
        /// The question.
        #[arg(short, long)]
        question: String,

        /// Structured payslip JSON file.
        #[arg(long, conflicts_with = "file", required_unless_present = "file")]
        data: Option<PathBuf>,

        /// Payslip image to extract and index first.
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Show one indexed chunk by its document id.
    Section {
        /// Document id, as cited in answers.
        doc_id: String,
    },

    /// Compare two structured payslips.
    Compare {
        /// Previous month's payslip JSON.
        #[arg(long)]
        previous: PathBuf,

        /// Current month's payslip JSON.
        #[arg(long)]
        current: PathBuf,

        /// Ask the model to explain the differences.
        #[arg(long, value_name = "QUESTION")]
        explain: Option<String>,
    },

    /// List indexed payslips of an employee.
    Similar {
        /// National id to match.
        #[arg(long)]
        national_id: Option<String>,

        /// Employee name to match.
        #[arg(long)]
        employee_name: Option<String>,

        /// Maximum number of payslips.
        #[arg(long, default_value = "3")]
        limit: usize,
    },

    /// Definition corpus management.
    Definitions {
        #[command(subcommand)]
        action: DefinitionsAction,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Definition corpus subcommands.
#[derive(Subcommand)]
pub(crate) enum DefinitionsAction {
    /// Index every file of a directory as a definition.
    Load {
        /// Directory (defaults to `[definitions] dir`).
        #[arg(long)]
        dir: Option<PathBuf>,
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

    let filter = match cli.verbose {
        0 => "payslip=info",
        1 => "payslip=debug",
        _ => "payslip=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    // Logs go to stderr so stdout stays valid JSON.
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
    let db = cli.db;
    match cli.command {
        Command::Index { data, file, source } => {
            cmd_index(db, &data, file.as_deref(), source.as_deref()).await
        }
        Command::Extract { file, content_type } => {
            cmd_extract(db, &file, content_type.as_deref()).await
        }
        Command::Ask {
            question,
            data,
            file,
        } => cmd_ask(db, &question, data.as_deref(), file.as_deref()).await,
        Command::Section { doc_id } => cmd_section(db, &doc_id).await,
        Command::Compare {
            previous,
            current,
            explain,
        } => cmd_compare(&previous, &current, explain.as_deref()).await,
        Command::Similar {
            national_id,
            employee_name,
            limit,
        } => cmd_similar(db, national_id.as_deref(), employee_name.as_deref(), limit).await,
        Command::Definitions { action } => match action {
            DefinitionsAction::Load { dir } => cmd_definitions_load(db, dir).await,
        },
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_index(
    db: Option<PathBuf>,
    data: &Path,
    file: Option<&Path>,
    source: Option<&str>,
) -> Result<()> {
    let config = load_config()?;
    let client = OpenRouterClient::from_config(&config)?;
    let store = open_store(&config, db, Some(Arc::new(client))).await?;
    let payslip = read_payslip(data)?;

    let bytes = match file {
        Some(path) => read_bytes(path)?,
        None => Vec::new(),
    };
    let source = source.map(String::from).or_else(|| file.and_then(file_name));

    info!(data = %data.display(), source = source.as_deref().unwrap_or(""), "indexing payslip");
    let doc_ids = payslip_core::index(&store, &payslip, source.as_deref(), &bytes).await?;

    print_json(&serde_json::json!({
        "monthKey": payslip.month_key(),
        "docIds": doc_ids,
    }))
}

async fn cmd_extract(db: Option<PathBuf>, file: &Path, content_type: Option<&str>) -> Result<()> {
    let config = load_config()?;
    let client = OpenRouterClient::from_config(&config)?;
    let store = open_store(&config, db, Some(Arc::new(client.clone()))).await?;
    let upload = read_upload(file, content_type)?;

    let spinner = spinner("Extracting payslip...");
    let result = payslip_core::ingest(&store, &client, &upload).await;
    spinner.finish_and_clear();

    print_json(&result?)
}

async fn cmd_ask(
    db: Option<PathBuf>,
    question: &str,
    data: Option<&Path>,
    file: Option<&Path>,
) -> Result<()> {
    let config = load_config()?;
    let client = OpenRouterClient::from_config(&config)?;
    let store = open_store(&config, db, Some(Arc::new(client.clone()))).await?;
    let settings = AskSettings::from(&config);

    let response = match (data, file) {
        (Some(data), _) => {
            let payslip = read_payslip(data)?;
            let spinner = spinner("Thinking...");
            let result = payslip_core::answer(&store, &client, &settings, &payslip, question).await;
            spinner.finish_and_clear();
            result?
        }
        (None, Some(file)) => {
            let upload = read_upload(file, None)?;
            let spinner = spinner("Extracting and thinking...");
            let result =
                payslip_core::ask_upload(&store, &client, &settings, &upload, question).await;
            spinner.finish_and_clear();
            result?
        }
        (None, None) => return Err(eyre!("either --data or --file is required")),
    };

    print_json(&response)
}

async fn cmd_section(db: Option<PathBuf>, doc_id: &str) -> Result<()> {
    let config = load_config()?;
    let store = open_readonly_store(&db_path(&config, db)?).await?;

    match payslip_core::get_chunk(&store, doc_id).await? {
        Some(section) => print_json(&section),
        None => Err(eyre!("no indexed section with docId '{doc_id}'")),
    }
}

async fn cmd_compare(previous: &Path, current: &Path, explain: Option<&str>) -> Result<()> {
    let previous = read_payslip(previous)?;
    let current = read_payslip(current)?;

    let Some(question) = explain else {
        return print_json(&payslip_core::compare(&previous, &current));
    };

    let config = load_config()?;
    let client = OpenRouterClient::from_config(&config)?;

    let spinner = spinner("Explaining differences...");
    let result =
        payslip_core::explain_comparison(&client, &config.prompts, &previous, &current, question)
            .await;
    spinner.finish_and_clear();

    print_json(&result?)
}

async fn cmd_similar(
    db: Option<PathBuf>,
    national_id: Option<&str>,
    employee_name: Option<&str>,
    limit: usize,
) -> Result<()> {
    let config = load_config()?;
    let store = open_readonly_store(&db_path(&config, db)?).await?;
    let matches = payslip_core::find_similar(&store, national_id, employee_name, limit).await?;
    print_json(&matches)
}

async fn cmd_definitions_load(db: Option<PathBuf>, dir: Option<PathBuf>) -> Result<()> {
    let config = load_config()?;
    let dir = match dir {
        Some(dir) => dir,
        None => {
            let configured = config
                .definitions
                .dir
                .as_deref()
                .ok_or_else(|| eyre!("no --dir given and [definitions] dir is not configured"))?;
            expand_home(configured)?
        }
    };

    let client = OpenRouterClient::from_config(&config)?;
    let store = open_store(&config, db, Some(Arc::new(client))).await?;
    let count = payslip_core::preload_definitions(&store, &dir).await?;
    println!("Loaded {count} definition(s) from {}", dir.display());
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// `--db` if given, else the configured store path.
fn db_path(config: &AppConfig, db: Option<PathBuf>) -> Result<PathBuf> {
    match db {
        Some(path) => Ok(path),
        None => Ok(expand_home(&config.store.db_path)?),
    }
}

/// Open the index read-write, creating it if needed. Chunks and queries are
/// embedded with `embedder` when one is given.
async fn open_store(
    config: &AppConfig,
    db: Option<PathBuf>,
    embedder: Option<Arc<dyn Embedder>>,
) -> Result<Storage> {
    let path = db_path(config, db)?;
    let mut store = Storage::open(&path).await?;
    if let Some(embedder) = embedder {
        store = store.with_embedder(embedder);
    }
    info!(db = %path.display(), chunks = store.count_chunks().await?, "opened index store");
    Ok(store)
}

/// Open an existing index for lookups. Never creates or migrates it.
async fn open_readonly_store(path: &Path) -> Result<Storage> {
    if !path.is_file() {
        return Err(eyre!(
            "no index at '{}'; run `payslip index` or `payslip extract` first",
            path.display()
        ));
    }
    let store = Storage::open_readonly(path).await?;
    info!(db = %path.display(), "opened index store read-only");
    Ok(store)
}

fn read_payslip(path: &Path) -> Result<StructuredPayslip> {
    let json = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("cannot read payslip JSON '{}'", path.display()))?;
    serde_json::from_str(&json)
        .wrap_err_with(|| format!("'{}' is not a structured payslip", path.display()))
}

fn read_bytes(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).wrap_err_with(|| format!("cannot read '{}'", path.display()))
}

fn read_upload(path: &Path, content_type: Option<&str>) -> Result<Upload> {
    let name = file_name(path).ok_or_else(|| eyre!("'{}' has no file name", path.display()))?;
    let bytes = read_bytes(path)?;
    Ok(payslip_core::decode_upload(&name, content_type, bytes)?)
}

fn file_name(path: &Path) -> Option<String> {
    path.file_name().map(|n| n.to_string_lossy().into_owned())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Spinner shown while waiting on the model.
fn spinner(message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner:.cyan} {msg}") {
        spinner.set_style(
            style.tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
    }
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(80));
    spinner
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use payslip_storage::IndexStore;
    use uuid::Uuid;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn ask_requires_data_or_file() {
        assert!(Cli::try_parse_from(["payslip", "ask", "-q", "net?"]).is_err());
        assert!(
            Cli::try_parse_from(["payslip", "ask", "-q", "net?", "--data", "a.json"]).is_ok()
        );
        assert!(
            Cli::try_parse_from([
                "payslip", "ask", "-q", "net?", "--data", "a.json", "--file", "a.png"
            ])
            .is_err()
        );
    }

    #[test]
    fn similar_defaults_limit() {
        let cli = Cli::try_parse_from(["payslip", "similar", "--national-id", "85.07.30"])
            .expect("parse");
        match cli.command {
            Command::Similar { limit, .. } => assert_eq!(limit, 3),
            _ => panic!("expected similar"),
        }
    }

    #[tokio::test]
    async fn lookups_do_not_create_an_index() {
        let path = std::env::temp_dir().join(format!("payslip_test_{}.db", Uuid::now_v7()));
        assert!(open_readonly_store(&path).await.is_err());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn lookups_open_existing_index_without_write_access() {
        let path = std::env::temp_dir().join(format!("payslip_test_{}.db", Uuid::now_v7()));
        drop(Storage::open(&path).await.expect("create index"));

        let store = open_readonly_store(&path).await.expect("open read-only");
        let chunk = payslip_shared::Chunk::new("x", "y", payslip_shared::Metadata::new());
        let err = store.add(&[chunk]).await.unwrap_err();
        assert!(err.to_string().contains("read-only"));
    }

    #[test]
    fn db_flag_overrides_configured_path() {
        let config = AppConfig::default();
        let path = db_path(&config, Some(PathBuf::from("/tmp/i.db"))).expect("path");
        assert_eq!(path, PathBuf::from("/tmp/i.db"));
    }

    #[test]
    fn global_db_flag_after_subcommand() {
        let cli = Cli::try_parse_from(["payslip", "section", "payslip:x:0", "--db", "/tmp/i.db"])
            .expect("parse");
        assert_eq!(cli.db, Some(PathBuf::from("/tmp/i.db")));
    }
}
