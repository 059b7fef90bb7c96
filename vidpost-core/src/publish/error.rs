use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::browser::BrowserError;

pub type PublishResult<T> = Result<T, PublishError>;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("session error: {0}")]
    Session(String),
    #[error("navigation failed after {attempts} attempt(s): {message}")]
    Navigation { attempts: u32, message: String },
    #[error("page not ready: {0}")]
    Readiness(String),
    #[error("login is no longer valid: {0}")]
    LoginInvalid(String),
    #[error("upload failed after {attempts} attempt(s): {message}")]
    Upload { attempts: u32, message: String },
    #[error("could not set {field}: expected {expected}, found {actual}")]
    FormFill {
        field: String,
        expected: String,
        actual: String,
    },
    #[error("a scheduled job cannot be saved as a draft")]
    ScheduledDraft,
    #[error("{action} failed: {message}")]
    Action { action: String, message: String },
    #[error("timed out waiting for {0}")]
    Timeout(String),
    #[error("browser error: {0}")]
    Browser(#[from] BrowserError),
}

impl PublishError {
    pub fn form_fill(
        field: impl Into<String>,
        expected: impl fmt::Display,
        actual: impl fmt::Display,
    ) -> Self {
        PublishError::FormFill {
            field: field.into(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    pub fn action(action: impl Into<String>, message: impl Into<String>) -> Self {
        PublishError::Action {
            action: action.into(),
            message: message.into(),
        }
    }
}

/// Steps of the per-job state machine, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    PageAcquired,
    ReadyVerified,
    LoginVerified,
    MediaUploaded,
    FieldsFilled,
    ScheduleConfigured,
    Submitted,
    PolledOutcome,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::PageAcquired => "page_acquired",
            Phase::ReadyVerified => "ready_verified",
            Phase::LoginVerified => "login_verified",
            Phase::MediaUploaded => "media_uploaded",
            Phase::FieldsFilled => "fields_filled",
            Phase::ScheduleConfigured => "schedule_configured",
            Phase::Submitted => "submitted",
            Phase::PolledOutcome => "polled_outcome",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A job error tagged with the phase that produced it.
#[derive(Debug, Error)]
#[error("{phase}: {error}")]
pub struct PhaseFailure {
    pub phase: Phase,
    #[source]
    pub error: PublishError,
}

impl PhaseFailure {
    pub fn new(phase: Phase, error: impl Into<PublishError>) -> Self {
        Self {
            phase,
            error: error.into(),
        }
    }
}

/// Attaches a phase to any error convertible into [`PublishError`].
pub(crate) trait InPhase<T> {
    fn in_phase(self, phase: Phase) -> Result<T, PhaseFailure>;
}

impl<T, E: Into<PublishError>> InPhase<T> for Result<T, E> {
    fn in_phase(self, phase: Phase) -> Result<T, PhaseFailure> {
        self.map_err(|error| PhaseFailure::new(phase, error))
    }
}
