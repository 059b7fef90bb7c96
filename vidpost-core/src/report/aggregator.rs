use std::sync::Arc;

use tracing::{info, warn};

use super::result::{JobResult, JobStatus};
use super::sink::ResultSink;

/// Fans every result out to the configured sinks.
///
/// Sink failures are logged and never fail the job that produced the result.
#[derive(Default, Clone)]
pub struct ResultAggregator {
    sinks: Vec<Arc<dyn ResultSink>>,
}

impl ResultAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink(mut self, sink: Arc<dyn ResultSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn record(&self, result: &JobResult) {
        match &result.status {
            JobStatus::Succeeded => info!(
                row = result.row,
                asset = %result.asset_name,
                account = result.account.as_deref().unwrap_or("-"),
                "job succeeded"
            ),
            JobStatus::Failed { error } => warn!(
                row = result.row,
                asset = %result.asset_name,
                phase = result.failed_phase.map(|p| p.as_str()).unwrap_or("-"),
                error = %error,
                "job failed"
            ),
        }
        for sink in &self.sinks {
            if let Err(err) = sink.record(result) {
                warn!(row = result.row, error = %err, "failed to record job result");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::{Job, SaveMode};
    use crate::report::sink::{MemorySink, SinkError};

    struct BrokenSink;

    impl ResultSink for BrokenSink {
        fn record(&self, _result: &JobResult) -> Result<(), SinkError> {
            Err(SinkError::Poisoned)
        }
    }

    #[test]
    fn broken_sink_does_not_block_others() {
        let memory = Arc::new(MemorySink::new());
        let aggregator = ResultAggregator::new()
            .with_sink(Arc::new(BrokenSink))
            .with_sink(memory.clone());
        let job = Job::new(2, "/videos/a.mp4", SaveMode::Draft);
        aggregator.record(&JobResult::succeeded(&job, None));
        assert_eq!(memory.results().len(), 1);
    }
}
