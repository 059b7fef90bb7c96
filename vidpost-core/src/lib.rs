pub mod browser;
pub mod config;
pub mod error;
pub mod jobs;
pub mod poll;
pub mod publish;
pub mod report;

pub use browser::{
    BrowserAutomation, BrowserError, BrowserLauncher, BrowserMetrics, BrowserResult, Matcher,
    PageDriver, ProfileManager, SessionDriver,
};
pub use config::{load_config, VidpostConfig};
pub use error::{ConfigError, Result};
pub use jobs::{Job, JobFields, JobSheet, SaveMode, SheetError};
pub use poll::{poll_until, PollOutcome, PollSpec};
pub use publish::{
    worker_count, AuthState, DispatchMode, Dispatcher, JobPipeline, Phase, PhaseFailure,
    PublishError, SessionManager,
};
pub use report::{
    FileResultSink, JobResult, JobStatus, MemorySink, ResultAggregator, ResultSink, RunSummary,
    SqliteResultLedger,
};
