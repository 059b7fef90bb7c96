use std::fs::create_dir_all;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OpenFlags};
use serde::Serialize;

use crate::publish::Phase;

use super::result::{JobResult, JobStatus};
use super::sink::{ResultSink, SinkError};

const LEDGER_SCHEMA: &str = include_str!("../../../sql/ledger.sql");

pub fn configure_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;\n\
         PRAGMA synchronous = NORMAL;\n\
         PRAGMA temp_store = MEMORY;\n\
         PRAGMA busy_timeout = 5000;\n",
    )
}

/// One row of `vidpostctl history`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerEntry {
    pub run_id: String,
    pub row: usize,
    pub asset_name: String,
    pub account: Option<String>,
    pub succeeded: bool,
    pub failed_phase: Option<String>,
    pub error: Option<String>,
    pub finished_at: DateTime<Utc>,
}

/// SQLite history of job results across runs.
#[derive(Debug, Clone)]
pub struct SqliteResultLedger {
    path: PathBuf,
    run_id: String,
    flags: OpenFlags,
}

impl SqliteResultLedger {
    /// Opens (and creates) the ledger for writing results of `run_id`.
    pub fn open(path: impl AsRef<Path>, run_id: impl Into<String>) -> Result<Self, SinkError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            create_dir_all(parent)?;
        }
        let ledger = Self {
            path,
            run_id: run_id.into(),
            flags: OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
        };
        let conn = ledger.connect()?;
        conn.execute_batch(LEDGER_SCHEMA)?;
        Ok(ledger)
    }

    /// Opens an existing ledger for reading history only.
    pub fn read_only(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            run_id: String::new(),
            flags: OpenFlags::SQLITE_OPEN_READ_ONLY,
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    fn connect(&self) -> Result<Connection, SinkError> {
        let conn = Connection::open_with_flags(&self.path, self.flags)?;
        if !self.flags.contains(OpenFlags::SQLITE_OPEN_READ_ONLY) {
            configure_connection(&conn)?;
        }
        Ok(conn)
    }

    /// Most recent results first.
    pub fn history(&self, limit: usize) -> Result<Vec<LedgerEntry>, SinkError> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT run_id, row_number, asset_name, account, status, failed_phase, error_message, finished_at
             FROM job_results ORDER BY finished_at DESC, id DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            let status: String = row.get(4)?;
            Ok(LedgerEntry {
                run_id: row.get(0)?,
                row: row.get::<_, i64>(1)? as usize,
                asset_name: row.get(2)?,
                account: row.get(3)?,
                succeeded: status == "succeeded",
                failed_phase: row.get(5)?,
                error: row.get(6)?,
                finished_at: row.get(7)?,
            })
        })?;
        let mut entries = Vec::new();
        for entry in rows {
            entries.push(entry?);
        }
        Ok(entries)
    }
}

impl ResultSink for SqliteResultLedger {
    fn record(&self, result: &JobResult) -> Result<(), SinkError> {
        let conn = self.connect()?;
        let (status, error) = match &result.status {
            JobStatus::Succeeded => ("succeeded", None),
            JobStatus::Failed { error } => ("failed", Some(error.as_str())),
        };
        conn.execute(
            "INSERT INTO job_results (run_id, row_number, asset_name, account, status, failed_phase, error_message, finished_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                self.run_id,
                result.row as i64,
                result.asset_name,
                result.account,
                status,
                result.failed_phase.map(|phase: Phase| phase.as_str()),
                error,
                result.finished_at,
            ],
        )?;
        Ok(())
    }
}
