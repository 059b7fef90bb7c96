use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::jobs::Job;
use crate::publish::{Phase, PhaseFailure};

const UNKNOWN_FAILURE: &str = "unknown failure";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobStatus {
    Succeeded,
    Failed { error: String },
}

/// Outcome of one job. Exactly one is produced per dispatched job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobResult {
    pub row: usize,
    pub asset_name: String,
    pub account: Option<String>,
    #[serde(flatten)]
    pub status: JobStatus,
    pub failed_phase: Option<Phase>,
    pub finished_at: DateTime<Utc>,
}

impl JobResult {
    pub fn succeeded(job: &Job, account: Option<String>) -> Self {
        Self {
            row: job.row,
            asset_name: job.asset_name(),
            account,
            status: JobStatus::Succeeded,
            failed_phase: None,
            finished_at: Utc::now(),
        }
    }

    /// A failed result; an empty message is replaced so failures always say something.
    pub fn failed(
        job: &Job,
        account: Option<String>,
        phase: Option<Phase>,
        error: impl Into<String>,
    ) -> Self {
        let mut error = error.into();
        if error.trim().is_empty() {
            error = UNKNOWN_FAILURE.to_string();
        }
        Self {
            row: job.row,
            asset_name: job.asset_name(),
            account,
            status: JobStatus::Failed { error },
            failed_phase: phase,
            finished_at: Utc::now(),
        }
    }

    pub fn from_outcome(
        job: &Job,
        account: Option<String>,
        outcome: Result<(), PhaseFailure>,
    ) -> Self {
        match outcome {
            Ok(()) => Self::succeeded(job, account),
            Err(failure) => Self::failed(
                job,
                account,
                Some(failure.phase),
                failure.error.to_string(),
            ),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self.status, JobStatus::Succeeded)
    }

    pub fn error(&self) -> Option<&str> {
        match &self.status {
            JobStatus::Succeeded => None,
            JobStatus::Failed { error } => Some(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::SaveMode;
    use crate::publish::PublishError;

    #[test]
    fn empty_error_gets_generic_message() {
        let job = Job::new(3, "/videos/a.mp4", SaveMode::Draft);
        let result = JobResult::failed(&job, None, None, "  ");
        assert_eq!(result.error(), Some("unknown failure"));
        assert!(!result.is_success());
    }

    #[test]
    fn outcome_keeps_phase_and_message() {
        let job = Job::new(4, "/videos/b.mp4", SaveMode::Publish);
        let failure = PhaseFailure::new(Phase::ScheduleConfigured, PublishError::ScheduledDraft);
        let result = JobResult::from_outcome(&job, Some("studio".into()), Err(failure));
        assert_eq!(result.failed_phase, Some(Phase::ScheduleConfigured));
        assert_eq!(result.asset_name, "b.mp4");
        assert_eq!(
            result.error(),
            Some("a scheduled job cannot be saved as a draft")
        );
    }

    #[test]
    fn serializes_flat_status() {
        let job = Job::new(2, "/videos/c.mp4", SaveMode::Preview);
        let value = serde_json::to_value(JobResult::succeeded(&job, None)).unwrap();
        assert_eq!(value["status"], "succeeded");
        assert_eq!(value["row"], 2);
    }
}
