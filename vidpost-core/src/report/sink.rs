use std::fs::{create_dir_all, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Local};
use thiserror::Error;

use super::result::JobResult;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("sink lock poisoned")]
    Poisoned,
}

/// Destination for finished job results. Called from concurrent workers.
pub trait ResultSink: Send + Sync {
    fn record(&self, result: &JobResult) -> Result<(), SinkError>;
}

/// Run log at `<dir>/vidpost_<YYYYMMDD_HHMMSS>.log`, one JSON object per line.
#[derive(Debug)]
pub struct FileResultSink {
    log: Mutex<File>,
    path: PathBuf,
}

impl FileResultSink {
    pub fn create(dir: impl AsRef<Path>, started: DateTime<Local>) -> Result<Self, SinkError> {
        let dir = dir.as_ref();
        create_dir_all(dir)?;
        let path = dir.join(format!("vidpost_{}.log", started.format("%Y%m%d_%H%M%S")));
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            log: Mutex::new(file),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ResultSink for FileResultSink {
    fn record(&self, result: &JobResult) -> Result<(), SinkError> {
        let json = serde_json::to_string(result)?;
        let mut guard = self.log.lock().map_err(|_| SinkError::Poisoned)?;
        writeln!(guard, "{json}")?;
        guard.flush()?;
        Ok(())
    }
}

/// Keeps results in memory; used for summaries and tests.
#[derive(Debug, Default)]
pub struct MemorySink {
    results: Mutex<Vec<JobResult>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn results(&self) -> Vec<JobResult> {
        self.results
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

impl ResultSink for MemorySink {
    fn record(&self, result: &JobResult) -> Result<(), SinkError> {
        self.results
            .lock()
            .map_err(|_| SinkError::Poisoned)?
            .push(result.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::{Job, SaveMode};
    use chrono::TimeZone;

    #[test]
    fn file_sink_appends_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let started = Local.with_ymd_and_hms(2026, 10, 19, 8, 5, 9).unwrap();
        let sink = FileResultSink::create(dir.path().join("log"), started).unwrap();
        assert!(sink
            .path()
            .ends_with("log/vidpost_20261019_080509.log"));

        let job = Job::new(2, "/videos/a.mp4", SaveMode::Draft);
        sink.record(&JobResult::succeeded(&job, None)).unwrap();
        sink.record(&JobResult::failed(&job, None, None, "boom")).unwrap();

        let content = std::fs::read_to_string(sink.path()).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["error"], "boom");
    }
}
