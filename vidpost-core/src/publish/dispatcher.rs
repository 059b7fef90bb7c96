use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{error, info};

use crate::browser::SessionDriver;
use crate::jobs::Job;
use crate::report::{JobResult, ResultAggregator};

use super::pipeline::JobPipeline;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DispatchMode {
    /// One page, jobs in row order, reloaded between jobs.
    #[default]
    Sequential,
    /// A page per job with a bounded number of jobs in flight.
    Concurrent,
}

/// Concurrent worker count for a batch of `jobs`.
pub fn worker_count(jobs: usize) -> usize {
    match jobs {
        0..=50 => 3,
        51..=100 => 5,
        _ => 10,
    }
}

pub struct Dispatcher {
    pipeline: Arc<JobPipeline>,
    aggregator: Arc<ResultAggregator>,
}

impl Dispatcher {
    pub fn new(pipeline: Arc<JobPipeline>, aggregator: Arc<ResultAggregator>) -> Self {
        Self {
            pipeline,
            aggregator,
        }
    }

    /// Runs every job and returns one result per job, in input order.
    pub async fn dispatch(
        &self,
        jobs: Vec<Job>,
        session: Arc<dyn SessionDriver>,
        mode: DispatchMode,
    ) -> Vec<JobResult> {
        info!(jobs = jobs.len(), ?mode, "dispatching jobs");
        match mode {
            DispatchMode::Sequential => self.sequential(jobs, session.as_ref()).await,
            DispatchMode::Concurrent => self.concurrent(jobs, session).await,
        }
    }

    async fn sequential(&self, jobs: Vec<Job>, session: &dyn SessionDriver) -> Vec<JobResult> {
        let mut results = Vec::with_capacity(jobs.len());
        let lease = match self.pipeline.acquire(session).await {
            Ok(lease) => lease,
            Err(failure) => {
                error!(error = %failure, "could not open the upload surface; failing every job");
                let message = failure.error.to_string();
                for job in &jobs {
                    let result =
                        JobResult::failed(job, None, Some(failure.phase), message.clone());
                    self.aggregator.record(&result);
                    results.push(result);
                }
                return results;
            }
        };

        for (index, job) in jobs.iter().enumerate() {
            let outcome = if index == 0 {
                Ok(())
            } else {
                self.pipeline.refresh(&lease).await
            };
            let outcome = match outcome {
                Ok(()) => self.pipeline.run_job(&lease, job).await,
                Err(failure) => Err(failure),
            };
            let result = JobResult::from_outcome(job, lease.account().map(str::to_string), outcome);
            self.aggregator.record(&result);
            results.push(result);
        }
        lease.release().await;
        results
    }

    async fn concurrent(&self, jobs: Vec<Job>, session: Arc<dyn SessionDriver>) -> Vec<JobResult> {
        let workers = worker_count(jobs.len());
        info!(workers, "starting concurrent workers");
        let semaphore = Arc::new(Semaphore::new(workers));
        let mut slots: Vec<Option<JobResult>> = vec![None; jobs.len()];
        let mut handles = Vec::with_capacity(jobs.len());

        for (index, job) in jobs.into_iter().enumerate() {
            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(err) => {
                    let result =
                        JobResult::failed(&job, None, None, format!("worker pool closed: {err}"));
                    self.aggregator.record(&result);
                    slots[index] = Some(result);
                    continue;
                }
            };
            let pipeline = Arc::clone(&self.pipeline);
            let aggregator = Arc::clone(&self.aggregator);
            let session = Arc::clone(&session);
            let task_job = job.clone();
            let handle = tokio::spawn(async move {
                let _permit = permit;
                let result = pipeline.execute(session.as_ref(), &task_job).await;
                aggregator.record(&result);
                result
            });
            handles.push((index, job, handle));
        }

        for (index, job, handle) in handles {
            let result = match handle.await {
                Ok(result) => result,
                Err(err) => {
                    error!(row = job.row, error = %err, "worker task failed");
                    let result =
                        JobResult::failed(&job, None, None, format!("worker task failed: {err}"));
                    self.aggregator.record(&result);
                    result
                }
            };
            slots[index] = Some(result);
        }
        slots.into_iter().flatten().collect()
    }
}
