//! CLI command definitions, routing, and tracing setup.

use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use deepqa_core::{
    Analyzer, Dispatcher, GenerateSummary, Pipeline, PipelinePool, ProgressReporter, Stages,
    generate_search_results,
};
use deepqa_search::build_searchers;
use deepqa_shared::{
    AppConfig, PipelineSettings, ServerConfig, expand_home, init_config, load_config,
    load_config_from,
};
use deepqa_storage::Storage;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Deserialize;
use tracing::{info, warn};

use crate::server;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// deepqa: answer questions from many search backends at once.
#[derive(Parser)]
#[command(
    name = "deepqa",
    version,
    about = "Answer natural-language questions with ranked, scored candidates.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Config file (defaults to ~/.deepqa/deepqa.toml).
    #[arg(long, global = true, env = "DEEPQA_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

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
    /// Serve `ask:<question>` requests over WebSocket.
    Serve {
        /// Address to bind (overrides server.bind).
        #[arg(long)]
        bind: Option<String>,
    },

    /// Answer one question and print the ranked answers as JSON.
    Ask {
        /// Question text.
        text: String,
    },

    /// Run every searcher over stored questions to fill the search cache.
    Generate {
        /// Maximum number of questions.
        #[arg(long, default_value_t = 100)]
        limit: u32,

        /// Questions to skip.
        #[arg(long, default_value_t = 0)]
        offset: u32,

        /// Questions searched at once.
        #[arg(long, default_value_t = 4)]
        concurrency: usize,
    },

    /// Import questions or corpus passages from a JSON Lines file.
    Import {
        #[command(subcommand)]
        what: ImportKind,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Import subcommands.
#[derive(Subcommand)]
pub(crate) enum ImportKind {
    /// Lines of `{"question", "answer", "category"}`.
    Questions { file: PathBuf },
    /// Lines of `{"title", "body", "source"}`.
    Passages { file: PathBuf },
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
        0 => "deepqa=info",
        1 => "deepqa=debug",
        _ => "deepqa=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

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
    let config_path = cli.config.as_deref();
    match cli.command {
        Command::Serve { bind } => cmd_serve(config_path, bind).await,
        Command::Ask { text } => cmd_ask(config_path, &text).await,
        Command::Generate {
            limit,
            offset,
            concurrency,
        } => cmd_generate(config_path, limit, offset, concurrency).await,
        Command::Import { what } => match what {
            ImportKind::Questions { file } => cmd_import_questions(config_path, &file).await,
            ImportKind::Passages { file } => cmd_import_passages(config_path, &file).await,
        },
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(config_path),
        },
    }
}

fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    Ok(match path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    })
}

async fn open_storage(config: &AppConfig) -> Result<Arc<Storage>> {
    let path = expand_home(&config.storage.db_path);
    let storage = Storage::open(&path).await?;
    Ok(Arc::new(storage))
}

/// Stage lists for serving and one-off asks.
fn build_stages(config: &AppConfig, storage: &Arc<Storage>) -> Result<Stages> {
    let settings = PipelineSettings::from(config);
    let searchers = build_searchers(config, storage, false)?;
    Ok(Stages::standard(&settings, searchers, Some(Arc::clone(storage))))
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_serve(config_path: Option<&Path>, bind: Option<String>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let mut server_config = ServerConfig::from(&config);
    if let Some(bind) = bind {
        server_config.bind = bind;
    }
    let settings = PipelineSettings::from(&config);

    let storage = open_storage(&config).await?;
    let stages = Arc::new(build_stages(&config, &storage)?);
    let pool = PipelinePool::build(server_config.pool_size, stages, &settings)?;
    let dispatcher = Dispatcher::new(Arc::new(pool), &server_config);

    let listener = tokio::net::TcpListener::bind(&server_config.bind)
        .await
        .map_err(|e| eyre!("cannot bind {}: {e}", server_config.bind))?;
    info!(
        bind = %server_config.bind,
        pool_size = server_config.pool_size,
        max_pending = server_config.max_pending,
        "deepqa server starting"
    );

    server::serve(listener, dispatcher, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "cannot listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    })
    .await
}

async fn cmd_ask(config_path: Option<&Path>, text: &str) -> Result<()> {
    let config = resolve_config(config_path)?;
    let settings = PipelineSettings::from(&config);
    let storage = open_storage(&config).await?;
    let stages = Arc::new(build_stages(&config, &storage)?);

    let analyzer = Analyzer::new(settings.names_file.as_deref())?;
    let mut pipeline = Pipeline::new(stages, analyzer);
    let question = pipeline.ask_text(text).await?;

    let ranked: serde_json::Value = serde_json::from_str(&question.ranked_json()?)?;
    println!("{}", serde_json::to_string_pretty(&ranked)?);
    Ok(())
}

async fn cmd_generate(
    config_path: Option<&Path>,
    limit: u32,
    offset: u32,
    concurrency: usize,
) -> Result<()> {
    let config = resolve_config(config_path)?;
    let storage = open_storage(&config).await?;
    let searchers = build_searchers(&config, &storage, true)?;
    if searchers.is_empty() {
        return Err(eyre!("no searchers configured; enable search.full_text or [search.web]"));
    }

    let engines: Vec<&str> = searchers.iter().map(|s| s.name()).collect();
    let questions = storage
        .fetch_questions_without_results(&engines, limit, offset)
        .await?;
    if questions.is_empty() {
        println!("Every stored question already has cached results.");
        return Ok(());
    }

    let timeout = PipelineSettings::from(&config).search_timeout;
    let progress = Arc::new(CliProgress::new());
    let summary =
        generate_search_results(questions, searchers, concurrency, timeout, progress).await?;

    println!(
        "Searched {} questions: {} passages, {} failures ({:.1}s)",
        summary.questions,
        summary.passages,
        summary.failures,
        summary.elapsed.as_secs_f64()
    );
    Ok(())
}

/// One line of a question import file.
#[derive(Debug, Deserialize)]
struct QuestionLine {
    question: String,
    #[serde(default)]
    answer: Option<String>,
    #[serde(default)]
    category: String,
}

/// One line of a passage import file.
#[derive(Debug, Deserialize)]
struct PassageLine {
    title: String,
    body: String,
    source: String,
}

async fn cmd_import_questions(config_path: Option<&Path>, file: &Path) -> Result<()> {
    let config = resolve_config(config_path)?;
    let storage = open_storage(&config).await?;

    let rows: Vec<QuestionLine> = read_jsonl(file)?;
    for row in &rows {
        storage
            .insert_question(&row.question, row.answer.as_deref(), &row.category)
            .await?;
    }
    println!(
        "Imported {} questions ({} stored)",
        rows.len(),
        storage.count_questions().await?
    );
    Ok(())
}

async fn cmd_import_passages(config_path: Option<&Path>, file: &Path) -> Result<()> {
    let config = resolve_config(config_path)?;
    let storage = open_storage(&config).await?;

    let rows: Vec<PassageLine> = read_jsonl(file)?;
    for row in &rows {
        storage.insert_passage(&row.title, &row.body, &row.source).await?;
    }
    println!(
        "Imported {} passages ({} in corpus)",
        rows.len(),
        storage.count_passages().await?
    );
    Ok(())
}

/// Parse a JSON Lines file, skipping blank lines and warning on bad ones.
fn read_jsonl<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let file = std::fs::File::open(path).map_err(|e| eyre!("cannot open {}: {e}", path.display()))?;
    let mut rows = Vec::new();
    for (n, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|e| eyre!("{}: read failed: {e}", path.display()))?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(&line) {
            Ok(row) => rows.push(row),
            Err(e) => warn!(line = n + 1, error = %e, "skipping malformed line"),
        }
    }
    Ok(rows)
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(config_path: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// Progress reporter
// ---------------------------------------------------------------------------

/// Progress bar for `generate`.
struct CliProgress {
    bar: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let bar = ProgressBar::hidden();
        let style = ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        bar.set_style(style);
        Self { bar }
    }
}

impl ProgressReporter for CliProgress {
    fn started(&self, total: usize) {
        self.bar.set_length(total as u64);
        self.bar.set_draw_target(indicatif::ProgressDrawTarget::stderr());
    }

    fn question_done(&self, current: usize, _total: usize) {
        self.bar.set_position(current as u64);
    }

    fn done(&self, summary: &GenerateSummary) {
        self.bar
            .finish_with_message(format!("{} failures", summary.failures));
    }
}
