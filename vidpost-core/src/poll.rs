//! Bounded polling shared by every wait point.

use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Success,
    Failure,
    Timeout,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollSpec {
    pub interval: Duration,
    pub deadline: Duration,
    pub label: &'static str,
}

impl PollSpec {
    pub fn new(interval: Duration, deadline: Duration) -> Self {
        Self {
            interval,
            deadline,
            label: "condition",
        }
    }

    /// A budget of `attempts` checks spaced by `interval`.
    pub fn attempts(attempts: u32, interval: Duration) -> Self {
        Self::new(interval, interval.saturating_mul(attempts.max(1)))
    }

    pub fn labelled(mut self, label: &'static str) -> Self {
        self.label = label;
        self
    }
}

/// Polls `failure` then `success` until one of them holds or the deadline passes.
///
/// A failure observation wins over a success observed on the same tick. When
/// the deadline expires, one last check runs so that a marker which appeared
/// during the final sleep window is still reported.
pub async fn poll_until<S, SFut, F, FFut>(
    spec: &PollSpec,
    mut success: S,
    mut failure: F,
) -> PollOutcome
where
    S: FnMut() -> SFut,
    SFut: Future<Output = bool>,
    F: FnMut() -> FFut,
    FFut: Future<Output = bool>,
{
    let started = Instant::now();
    let deadline = started + spec.deadline;
    let mut tick = 0u64;
    loop {
        if failure().await {
            debug!(label = spec.label, tick, "poll observed failure");
            return PollOutcome::Failure;
        }
        if success().await {
            debug!(label = spec.label, tick, "poll observed success");
            return PollOutcome::Success;
        }
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        tick += 1;
        debug!(
            label = spec.label,
            tick,
            elapsed_ms = now.duration_since(started).as_millis() as u64,
            "poll waiting"
        );
        sleep(spec.interval.min(deadline - now)).await;
        if Instant::now() >= deadline {
            break;
        }
    }

    if failure().await {
        return PollOutcome::Failure;
    }
    if success().await {
        return PollOutcome::Success;
    }
    debug!(label = spec.label, "poll deadline exceeded");
    PollOutcome::Timeout
}
