use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Local;
use clap::{Args, Parser, Subcommand, ValueEnum};
use rusqlite::{Connection, OpenFlags};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};
use vidpost_core::browser::locate_executable;
use vidpost_core::report::{LedgerEntry, SinkError};
use vidpost_core::{
    load_config, BrowserAutomation, BrowserLauncher, DispatchMode, Dispatcher, FileResultSink,
    Job, JobPipeline, JobSheet, ProfileManager, ResultAggregator, RunSummary, SessionDriver,
    SessionManager, SqliteResultLedger, VidpostConfig,
};

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] vidpost_core::ConfigError),
    #[error("{0}")]
    Sheet(#[from] vidpost_core::SheetError),
    #[error("browser error: {0}")]
    Browser(#[from] vidpost_core::BrowserError),
    #[error("{0}")]
    Publish(#[from] vidpost_core::PublishError),
    #[error("result sink error: {0}")]
    Sink(#[from] SinkError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("required resource missing: {0}")]
    MissingResource(String),
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Batch publisher for the video upload console", long_about = None)]
pub struct Cli {
    /// Path to vidpost.toml
    #[arg(long, default_value = "configs/vidpost.toml")]
    pub config: PathBuf,
    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
    /// Log polling ticks and selector choices
    #[arg(long, short, global = true)]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Log in, then publish every job of a sheet
    Run(RunArgs),
    /// Validate a job sheet without opening a browser
    Validate(SheetArgs),
    /// Check the browser binary, directories and ledger
    Check,
    /// Show recent job results from the ledger
    History(HistoryArgs),
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Job sheet (TOML)
    #[arg(long)]
    pub jobs: PathBuf,
    /// Run jobs on parallel pages instead of one page in row order
    #[arg(long, default_value_t = false)]
    pub concurrent: bool,
    /// Show the working browser window
    #[arg(long, default_value_t = false)]
    pub headed: bool,
}

#[derive(Args, Debug)]
pub struct SheetArgs {
    /// Job sheet (TOML)
    #[arg(long)]
    pub jobs: PathBuf,
}

#[derive(Args, Debug)]
pub struct HistoryArgs {
    /// Number of results returned
    #[arg(long, default_value_t = 20)]
    pub limit: usize,
}

pub async fn run(cli: Cli) -> Result<()> {
    let context = AppContext::new(&cli)?;

    match &cli.command {
        Commands::Run(args) => {
            let summary = context.run_jobs(args).await?;
            render(&summary, cli.format)?;
        }
        Commands::Validate(args) => {
            let report = context.validate(&args.jobs)?;
            render(&report, cli.format)?;
        }
        Commands::Check => {
            let report = context.check();
            render(&report, cli.format)?;
            if report
                .iter()
                .any(|entry| matches!(entry.status, CheckStatus::Error))
            {
                return Err(AppError::MissingResource(
                    "one or more checks failed".to_string(),
                ));
            }
        }
        Commands::History(args) => {
            let history = context.history(args)?;
            render(&history, cli.format)?;
        }
    }

    Ok(())
}

fn render<T>(value: &T, format: OutputFormat) -> Result<()>
where
    T: Serialize + DisplayFallback,
{
    match format {
        OutputFormat::Text => {
            println!("{}", value.display());
            Ok(())
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{}", json);
            Ok(())
        }
    }
}

trait DisplayFallback {
    fn display(&self) -> String;
}

#[derive(Debug)]
struct AppContext {
    config: Arc<VidpostConfig>,
    config_path: PathBuf,
}

impl AppContext {
    fn new(cli: &Cli) -> Result<Self> {
        let config = load_config(&cli.config)?;
        Ok(Self {
            config: Arc::new(config),
            config_path: cli.config.clone(),
        })
    }

    fn profiles_dir(&self) -> PathBuf {
        self.config.resolve_path(&self.config.paths.profiles_dir)
    }

    fn log_dir(&self) -> PathBuf {
        self.config.resolve_path(&self.config.paths.log_dir)
    }

    fn ledger_db(&self) -> PathBuf {
        self.config.resolve_path(&self.config.paths.ledger_db)
    }

    fn load_jobs(&self, sheet: &Path) -> Result<Vec<Job>> {
        let sheet = JobSheet::load(sheet)?;
        Ok(sheet.validate(Local::now().naive_local())?)
    }

    fn validate(&self, sheet: &Path) -> Result<ValidationReport> {
        let jobs = self.load_jobs(sheet)?;
        Ok(ValidationReport {
            jobs: jobs.iter().map(JobRow::from).collect(),
        })
    }

    async fn run_jobs(&self, args: &RunArgs) -> Result<RunSummary> {
        let jobs = self.load_jobs(&args.jobs)?;
        let mode = if args.concurrent {
            DispatchMode::Concurrent
        } else {
            DispatchMode::Sequential
        };
        let started = Local::now();
        info!(jobs = jobs.len(), ?mode, "job sheet validated");

        let profiles = ProfileManager::new(self.profiles_dir())?;
        let launcher = BrowserLauncher::new(self.config.chromium.clone(), profiles)?;
        let sessions = SessionManager::new(&self.config);

        let login = launcher.launch("login", false).await?;
        let auth = sessions.authenticate(&login).await;
        if let Err(err) = login.shutdown().await {
            warn!(error = %err, "failed to shut down login browser");
        }
        let auth = auth?;

        let headless = self.config.chromium.headless && !args.headed;
        let mut worker = launcher.launch("work", headless).await?;
        if let Err(err) = sessions.restore(&mut worker, &auth).await {
            if let Err(shutdown) = worker.shutdown().await {
                warn!(error = %shutdown, "failed to shut down working browser");
            }
            return Err(err.into());
        }
        let worker = Arc::new(worker);

        let run_id = started.format("%Y%m%d_%H%M%S").to_string();
        let file_sink = FileResultSink::create(self.log_dir(), started)?;
        info!(path = %file_sink.path().display(), "writing run log");
        let aggregator = ResultAggregator::new()
            .with_sink(Arc::new(file_sink))
            .with_sink(Arc::new(SqliteResultLedger::open(self.ledger_db(), run_id)?));
        let dispatcher = Dispatcher::new(
            Arc::new(JobPipeline::new(Arc::clone(&self.config))),
            Arc::new(aggregator),
        );

        let session: Arc<dyn SessionDriver> = worker.clone();
        let results = dispatcher.dispatch(jobs, session, mode).await;
        let metrics = worker.metrics();
        shutdown_shared(worker).await;

        Ok(RunSummary::new(results).with_metrics(metrics))
    }

    fn check(&self) -> Vec<HealthEntry> {
        let mut results = Vec::new();
        results.push(self.check_path("vidpost.toml", &self.config_path));
        results.push(match locate_executable(&self.config.chromium) {
            Ok(path) => HealthEntry::ok("chromium", path.display().to_string()),
            Err(err) => HealthEntry::error("chromium", err.to_string()),
        });
        results.push(self.check_directory("profiles", &self.profiles_dir()));
        results.push(self.check_directory("log", &self.log_dir()));
        results.push(self.check_database("ledger", &self.ledger_db()));
        results
    }

    fn check_path(&self, name: &str, path: &Path) -> HealthEntry {
        if path.exists() {
            HealthEntry::ok(name, format!("{}", path.display()))
        } else {
            HealthEntry::error(name, format!("{} missing", path.display()))
        }
    }

    fn check_directory(&self, name: &str, path: &Path) -> HealthEntry {
        match fs::metadata(path) {
            Ok(meta) if meta.is_dir() => HealthEntry::ok(name, format!("{}", path.display())),
            Ok(_) => HealthEntry::warn(name, format!("{} is not a directory", path.display())),
            Err(_) => HealthEntry::warn(
                name,
                format!("{} not found; created on first run", path.display()),
            ),
        }
    }

    fn check_database(&self, name: &str, path: &Path) -> HealthEntry {
        if !path.exists() {
            return HealthEntry::warn(
                name,
                format!("{} not found; created on first run", path.display()),
            );
        }
        match Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY) {
            Ok(conn) => {
                let pragma: rusqlite::Result<String> =
                    conn.query_row("PRAGMA integrity_check;", [], |row| row.get(0));
                match pragma {
                    Ok(result) if result.to_lowercase() == "ok" => {
                        HealthEntry::ok(name, "integrity ok".to_string())
                    }
                    Ok(result) => HealthEntry::warn(name, format!("integrity_check: {result}")),
                    Err(err) => HealthEntry::warn(name, format!("error: {err}")),
                }
            }
            Err(err) => HealthEntry::error(name, format!("failed to open: {err}")),
        }
    }

    fn history(&self, args: &HistoryArgs) -> Result<HistoryList> {
        let path = self.ledger_db();
        if !path.exists() {
            return Err(AppError::MissingResource(format!(
                "ledger not found at {}",
                path.display()
            )));
        }
        let rows = SqliteResultLedger::read_only(&path).history(args.limit)?;
        Ok(HistoryList { rows })
    }
}

async fn shutdown_shared(worker: Arc<BrowserAutomation>) {
    match Arc::try_unwrap(worker) {
        Ok(worker) => {
            if let Err(err) = worker.shutdown().await {
                warn!(error = %err, "failed to shut down working browser");
            }
        }
        Err(_) => warn!("working browser still referenced; skipping shutdown"),
    }
}

impl DisplayFallback for RunSummary {
    fn display(&self) -> String {
        self.render_text()
    }
}

#[derive(Debug, Serialize)]
pub struct ValidationReport {
    pub jobs: Vec<JobRow>,
}

#[derive(Debug, Serialize)]
pub struct JobRow {
    pub row: usize,
    pub video: String,
    pub mode: String,
    pub schedule_at: Option<String>,
    pub short_title: String,
}

impl From<&Job> for JobRow {
    fn from(job: &Job) -> Self {
        Self {
            row: job.row,
            video: job.asset.display().to_string(),
            mode: job.mode.to_string(),
            schedule_at: job
                .schedule_at
                .map(|at| at.format(vidpost_core::jobs::SCHEDULE_TIME_FORMAT).to_string()),
            short_title: job.fields.short_title.clone(),
        }
    }
}

impl DisplayFallback for ValidationReport {
    fn display(&self) -> String {
        let mut lines = vec![format!("{} job(s) valid", self.jobs.len())];
        for job in &self.jobs {
            lines.push(format!(
                "  row {:<4} {:<10} {:<16} {}",
                job.row,
                job.mode,
                job.schedule_at.as_deref().unwrap_or("immediate"),
                job.video
            ));
        }
        lines.join("\n")
    }
}

#[derive(Debug, Serialize)]
pub struct HistoryList {
    pub rows: Vec<LedgerEntry>,
}

impl DisplayFallback for HistoryList {
    fn display(&self) -> String {
        if self.rows.is_empty() {
            return "no results recorded".to_string();
        }
        let mut lines = Vec::new();
        for entry in &self.rows {
            let outcome = if entry.succeeded { "ok" } else { "FAILED" };
            lines.push(format!(
                "{finished} {run} row {row:<4} {outcome:<6} {asset} {detail}",
                finished = entry.finished_at.format("%Y-%m-%d %H:%M:%S"),
                run = entry.run_id,
                row = entry.row,
                asset = entry.asset_name,
                detail = entry.error.as_deref().unwrap_or(""),
            ));
        }
        lines.join("\n")
    }
}

#[derive(Debug, Serialize)]
pub struct HealthEntry {
    pub name: String,
    pub status: CheckStatus,
    pub detail: String,
}

#[derive(Debug, Serialize)]
pub enum CheckStatus {
    #[serde(rename = "ok")]
    Ok,
    #[serde(rename = "warn")]
    Warn,
    #[serde(rename = "error")]
    Error,
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CheckStatus::Ok => "OK",
            CheckStatus::Warn => "WARN",
            CheckStatus::Error => "ERROR",
        };
        write!(f, "{}", label)
    }
}

impl HealthEntry {
    fn ok(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: CheckStatus::Ok,
            detail: detail.into(),
        }
    }

    fn warn(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: CheckStatus::Warn,
            detail: detail.into(),
        }
    }

    fn error(name: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: CheckStatus::Error,
            detail: detail.into(),
        }
    }
}

impl DisplayFallback for Vec<HealthEntry> {
    fn display(&self) -> String {
        self.iter()
            .map(|entry| format!("[{}] {}: {}", entry.status, entry.name, entry.detail))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
