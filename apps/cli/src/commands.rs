//! CLI command definitions, routing, backend wiring, and tracing setup.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use aulabot_core::Assistant;
use aulabot_fetch::{ApiClient, CachedFetcher, RetryPolicy, RetryingFetcher};
use aulabot_shared::{
    AppConfig, Backend, Fetcher, ResultSet, config_file_path, init_config, init_config_at,
    load_config, load_config_from, validate_api_key,
};
use aulabot_storage::Storage;
use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::task::JoinHandle;
use tracing::{debug, info};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// aulabot: natural-language questions over school records.
#[derive(Parser)]
#[command(
    name = "aulabot",
    version,
    about = "Ask questions in Spanish about students, grades, courses and teachers.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Config file (defaults to ~/.aulabot/aulabot.toml).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Override the configured backend.
    #[arg(long, global = true)]
    pub backend: Option<BackendArg>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Data source selectable from the command line.
#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub(crate) enum BackendArg {
    Rest,
    Sql,
}

impl From<BackendArg> for Backend {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Rest => Backend::Rest,
            BackendArg::Sql => Backend::Sql,
        }
    }
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Answer a question, e.g. "¿Cuántos estudiantes hay en 3° B?".
    Ask {
        /// The question, in Spanish.
        #[arg(required = true, num_args = 1..)]
        question: Vec<String>,

        /// Print the full answer (rows, analysis, entities) as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Probe the backend.
    Health,

    /// Show aggregate counts and cache counters.
    Stats,

    /// List active students.
    Students {
        /// Only students of this course id.
        #[arg(long)]
        course_id: Option<i64>,

        /// Only students whose name contains this text.
        #[arg(long)]
        search: Option<String>,
    },

    /// List courses.
    Courses,

    /// Local database management.
    Db {
        #[command(subcommand)]
        action: DbAction,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Database subcommands.
#[derive(Subcommand)]
pub(crate) enum DbAction {
    /// Create the database and apply migrations.
    Init {
        /// Load demo school data into an empty database.
        #[arg(long)]
        demo: bool,
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
        0 => "aulabot=info",
        1 => "aulabot=debug",
        _ => "aulabot=trace",
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
    if let Command::Config { action } = &cli.command {
        return match action {
            ConfigAction::Init => cmd_config_init(cli.config.as_ref()),
            ConfigAction::Show => cmd_config_show(cli.config.as_ref()),
        };
    }

    let config = resolve_config(cli.config.as_ref())?;
    let backend = cli.backend.map_or(config.backend.kind, Backend::from);

    match cli.command {
        Command::Ask { question, json } => cmd_ask(&config, backend, &question.join(" "), json).await,
        Command::Health => cmd_health(&config, backend).await,
        Command::Stats => cmd_stats(&config, backend).await,
        Command::Students { course_id, search } => {
            cmd_students(&config, backend, course_id, search.as_deref()).await
        }
        Command::Courses => cmd_courses(&config, backend).await,
        Command::Db {
            action: DbAction::Init { demo },
        } => cmd_db_init(&config, demo).await,
        Command::Config { .. } => Ok(()),
    }
}

fn resolve_config(path: Option<&PathBuf>) -> Result<AppConfig> {
    match path {
        Some(path) => Ok(load_config_from(path)?),
        None => Ok(load_config()?),
    }
}

// ---------------------------------------------------------------------------
// Composition root
// ---------------------------------------------------------------------------

/// The assistant plus the cache it reads through.
struct Session {
    assistant: Assistant,
    cache: Arc<CachedFetcher>,
    sweeper: Option<JoinHandle<()>>,
}

impl Session {
    /// Wire `backend -> retries -> cache -> assistant`.
    async fn connect(config: &AppConfig, backend: Backend) -> Result<Self> {
        let source: Arc<dyn Fetcher> = match backend {
            Backend::Rest => {
                let api_key = validate_api_key(config)?;
                Arc::new(ApiClient::new(
                    &config.api.base_url,
                    api_key,
                    Duration::from_secs(config.api.timeout_secs),
                )?)
            }
            Backend::Sql => {
                let path = config.database.resolved_path()?;
                Arc::new(Storage::open_readonly(&path).await?)
            }
        };

        let retrying = Arc::new(RetryingFetcher::new(source, RetryPolicy::from(&config.fetch)));
        let cache = Arc::new(CachedFetcher::new(retrying, &config.cache));
        let sweeper = cache
            .is_enabled()
            .then(|| cache.spawn_sweeper(config.cache.sweep_interval()));

        info!(%backend, cache = cache.is_enabled(), "backend connected");

        Ok(Self {
            assistant: Assistant::new(backend, config.limits, cache.clone()),
            cache,
            sweeper,
        })
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if let Some(sweeper) = self.sweeper.take() {
            sweeper.abort();
        }
    }
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_ask(config: &AppConfig, backend: Backend, question: &str, json: bool) -> Result<()> {
    let session = Session::connect(config, backend).await?;

    let spinner = (!json).then(|| spinner("Pensando...")).transpose()?;
    let answer = session.assistant.answer(question).await;
    if let Some(spinner) = spinner {
        spinner.finish_and_clear();
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&answer)?);
        return Ok(());
    }

    println!("{}", answer.response);
    match answer.error {
        Some(error) if !answer.success => Err(eyre!("question could not be answered: {error}")),
        _ => Ok(()),
    }
}

async fn cmd_health(config: &AppConfig, backend: Backend) -> Result<()> {
    let session = Session::connect(config, backend).await?;
    let report = session.assistant.health().await;
    println!("{}", serde_json::to_string_pretty(&report)?);

    if report.healthy {
        Ok(())
    } else {
        Err(eyre!("backend '{}' is unhealthy", report.backend))
    }
}

async fn cmd_stats(config: &AppConfig, backend: Backend) -> Result<()> {
    let session = Session::connect(config, backend).await?;
    let stats = session.assistant.system_statistics().await?;
    let cache = session.cache.stats().await;

    let output = serde_json::json!({
        "system": stats,
        "cache": cache,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn cmd_students(
    config: &AppConfig,
    backend: Backend,
    course_id: Option<i64>,
    search: Option<&str>,
) -> Result<()> {
    let session = Session::connect(config, backend).await?;
    let rows = session.assistant.list_students(course_id, search).await?;
    debug!(rows = rows.len(), "students listed");

    print_rows(&rows, |row| {
        format!(
            "{:>5}  {:<30}  {:<6}  {}",
            row.text_or_na("id"),
            row.full_name(),
            row.course_label(),
            row.text_or_na("especialidad")
        )
    });
    Ok(())
}

async fn cmd_courses(config: &AppConfig, backend: Backend) -> Result<()> {
    let session = Session::connect(config, backend).await?;
    let rows = session.assistant.list_courses().await?;

    print_rows(&rows, |row| {
        format!(
            "{:>5}  {:<6}  {:<16}  {:<8}  {} estudiantes",
            row.text_or_na("id"),
            row.course_label(),
            row.text_or_na("especialidad"),
            row.text_or_na("turno"),
            row.integer("total_estudiantes").unwrap_or(0)
        )
    });
    Ok(())
}

async fn cmd_db_init(config: &AppConfig, demo: bool) -> Result<()> {
    let path = config.database.resolved_path()?;
    let storage = Storage::open(&path).await?;
    println!("Database ready at: {}", path.display());
    println!("Schema version:    {}", storage.schema_version().await);

    if demo {
        if storage.seed_demo().await? {
            println!("Demo data loaded.");
        } else {
            println!("Database already has students; demo data skipped.");
        }
    }
    Ok(())
}

fn cmd_config_init(path: Option<&PathBuf>) -> Result<()> {
    let path = match path {
        Some(path) => init_config_at(path)?,
        None => init_config()?,
    };
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show(path: Option<&PathBuf>) -> Result<()> {
    let config = resolve_config(path)?;
    let source = match path {
        Some(path) => path.clone(),
        None => config_file_path()?,
    };
    println!("# {}", source.display());
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

// ---------------------------------------------------------------------------
// Output helpers
// ---------------------------------------------------------------------------

fn print_rows(rows: &ResultSet, line: impl Fn(&aulabot_shared::ResultRow) -> String) {
    if rows.is_empty() {
        println!("{}", aulabot_core::render::NO_DATA);
        return;
    }
    for row in rows {
        println!("{}", line(row));
    }
    println!("\n{} registros", rows.len());
}

fn spinner(message: &str) -> Result<ProgressBar> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")?
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
    );
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(80));
    Ok(spinner)
}
