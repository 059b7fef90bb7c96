use std::collections::HashSet;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{Duration as ChronoDuration, NaiveDateTime};
use serde::Deserialize;
use thiserror::Error;

use super::model::{Job, JobFields, SaveMode};

/// Wall-clock format of `schedule_time` cells, e.g. `2026/11/3 09:30`.
pub const SCHEDULE_TIME_FORMAT: &str = "%Y/%m/%d %H:%M";

const SCHEDULE_WINDOW_DAYS: i64 = 30;
const FIRST_DATA_ROW: usize = 2;

#[derive(Debug, Error)]
pub enum SheetError {
    #[error("failed to read job sheet {path}: {source}")]
    Io { source: io::Error, path: PathBuf },
    #[error("failed to parse job sheet {path}: {source}")]
    Parse {
        source: toml::de::Error,
        path: PathBuf,
    },
    #[error("job sheet {path} has no jobs")]
    Empty { path: PathBuf },
    #[error("job sheet {path} has {} invalid row(s):\n{}", .issues.len(), render_issues(.issues))]
    Invalid { path: PathBuf, issues: Vec<RowIssue> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowIssue {
    pub row: usize,
    pub message: String,
}

impl fmt::Display for RowIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "row {}: {}", self.row, self.message)
    }
}

fn render_issues(issues: &[RowIssue]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}

/// The schedule column takes either a boolean or the sheet label `定时`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ScheduleFlag {
    Flag(bool),
    Label(String),
}

impl ScheduleFlag {
    fn is_scheduled(&self) -> bool {
        match self {
            ScheduleFlag::Flag(flag) => *flag,
            ScheduleFlag::Label(label) => label.trim() == "定时",
        }
    }
}

/// One `[[jobs]]` entry as written in the sheet.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawJob {
    pub row: Option<usize>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub collection: String,
    #[serde(default)]
    pub link: String,
    #[serde(default)]
    pub activity: String,
    pub schedule: Option<ScheduleFlag>,
    #[serde(default)]
    pub schedule_time: String,
    #[serde(default)]
    pub short_title: String,
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub video: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobSheet {
    #[serde(default)]
    pub jobs: Vec<RawJob>,
    #[serde(skip)]
    source: PathBuf,
}

impl JobSheet {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, SheetError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| SheetError::Io {
            source,
            path: path.to_path_buf(),
        })?;
        let mut sheet: JobSheet = toml::from_str(&content).map_err(|source| SheetError::Parse {
            source,
            path: path.to_path_buf(),
        })?;
        sheet.source = path.to_path_buf();
        Ok(sheet)
    }

    pub fn from_jobs(source: impl Into<PathBuf>, jobs: Vec<RawJob>) -> Self {
        Self {
            jobs,
            source: source.into(),
        }
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Validates every row against `now` and returns the jobs in sheet order.
    ///
    /// All row problems are collected; nothing is returned unless every row is
    /// valid. Relative video paths resolve against the sheet's directory.
    pub fn validate(&self, now: NaiveDateTime) -> Result<Vec<Job>, SheetError> {
        if self.jobs.is_empty() {
            return Err(SheetError::Empty {
                path: self.source.clone(),
            });
        }
        let base_dir = self
            .source
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        let mut seen = HashSet::new();
        let mut jobs = Vec::with_capacity(self.jobs.len());
        let mut issues = Vec::new();
        for (index, raw) in self.jobs.iter().enumerate() {
            let row = raw.row.unwrap_or(index + FIRST_DATA_ROW);
            if !seen.insert(row) {
                issues.push(RowIssue {
                    row,
                    message: "duplicate row number".into(),
                });
                continue;
            }
            match parse_row(raw, row, now, &base_dir) {
                Ok(job) => jobs.push(job),
                Err(message) => issues.push(RowIssue { row, message }),
            }
        }
        if issues.is_empty() {
            Ok(jobs)
        } else {
            Err(SheetError::Invalid {
                path: self.source.clone(),
                issues,
            })
        }
    }
}

fn parse_row(
    raw: &RawJob,
    row: usize,
    now: NaiveDateTime,
    base_dir: &Path,
) -> Result<Job, String> {
    let scheduled = raw
        .schedule
        .as_ref()
        .map(ScheduleFlag::is_scheduled)
        .unwrap_or(false);

    let schedule_at = if scheduled {
        let text = raw.schedule_time.trim();
        if text.is_empty() {
            return Err("schedule_time is required when schedule is set".into());
        }
        let at = NaiveDateTime::parse_from_str(text, SCHEDULE_TIME_FORMAT)
            .map_err(|_| format!("schedule_time {text:?} does not match YYYY/MM/D HH:MM"))?;
        if at <= now || at > now + ChronoDuration::days(SCHEDULE_WINDOW_DAYS) {
            return Err(format!(
                "schedule_time {text} must be later than now and within {SCHEDULE_WINDOW_DAYS} days"
            ));
        }
        Some(at)
    } else {
        None
    };

    let action = raw.action.trim();
    if action.is_empty() {
        return Err("action is required".into());
    }
    let mode: SaveMode = action.parse()?;
    if scheduled && mode == SaveMode::Draft {
        return Err("scheduled jobs must be published, not saved as drafts".into());
    }

    let video = raw.video.trim();
    if video.is_empty() {
        return Err("video is required".into());
    }
    let asset = if Path::new(video).is_absolute() {
        PathBuf::from(video)
    } else {
        base_dir.join(video)
    };
    if !asset.is_file() {
        return Err(format!("video file not found: {}", asset.display()));
    }

    Ok(Job {
        row,
        fields: JobFields {
            description: raw.description.trim().to_string(),
            location: raw.location.trim().to_string(),
            collection: raw.collection.trim().to_string(),
            link: raw.link.trim().to_string(),
            activity: raw.activity.trim().to_string(),
            short_title: raw.short_title.trim().to_string(),
        },
        scheduled,
        schedule_at,
        mode,
        asset,
    })
}
