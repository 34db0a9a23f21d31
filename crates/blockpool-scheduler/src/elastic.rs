//! Elastic dispatcher — send every pending job to one shared queue.
//!
//! The degenerate policy: no worker pool, no ceiling, no idle matching.
//! Each pending job becomes a task on the named queue, and a semaphore
//! bounds how many run at once, standing in for a queue whose consumers
//! are scaled externally.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{info, warn};

use blockpool_state::{JobId, StateStore};

use crate::error::{SchedulerError, SchedulerResult};
use crate::executor::{JobDuration, run_job_body};

/// Queue used when none is given.
pub const DEFAULT_QUEUE: &str = "default";

/// Outcome of an elastic dispatch.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ElasticReport {
    pub queue: String,
    pub dispatched: Vec<JobId>,
    /// Jobs from `dispatched` that completed. Filled in by
    /// `run_to_completion`.
    pub completed: usize,
    pub elapsed_ms: u64,
}

pub struct ElasticDispatcher {
    state: StateStore,
    queue: String,
    duration: JobDuration,
    permits: Arc<Semaphore>,
    tasks: JoinSet<SchedulerResult<()>>,
}

impl ElasticDispatcher {
    /// `concurrency` is clamped to between one consumer and the most
    /// permits a semaphore can hold.
    pub fn new(
        state: StateStore,
        queue: impl Into<String>,
        concurrency: usize,
        duration: JobDuration,
    ) -> Self {
        Self {
            state,
            queue: queue.into(),
            duration,
            permits: Arc::new(Semaphore::new(concurrency.clamp(1, Semaphore::MAX_PERMITS))),
            tasks: JoinSet::new(),
        }
    }

    /// Dispatch every pending job in the store, oldest first.
    pub fn dispatch_all(&mut self) -> SchedulerResult<ElasticReport> {
        let pending = self.state.list_pending_jobs()?;
        info!(count = pending.len(), queue = %self.queue, "dispatching pending jobs");

        let mut dispatched = Vec::with_capacity(pending.len());
        for mut job in pending {
            job.queue = Some(self.queue.clone());
            self.state.put_job(&job)?;

            let state = self.state.clone();
            let queue = self.queue.clone();
            let duration = self.duration;
            let permits = self.permits.clone();
            let job_id = job.id;
            self.tasks.spawn(async move {
                let _permit = permits
                    .acquire_owned()
                    .await
                    .map_err(|_| SchedulerError::SubstrateClosed)?;
                let delay = run_job_body(&state, job_id, &queue, &duration).await?;
                info!(
                    job_id,
                    %queue,
                    elapsed_ms = delay.as_millis() as u64,
                    "job completed"
                );
                Ok(())
            });

            info!(job_id, queue = %self.queue, "job dispatched");
            dispatched.push(job_id);
        }

        Ok(ElasticReport {
            queue: self.queue.clone(),
            dispatched,
            ..ElasticReport::default()
        })
    }

    /// Dispatch everything and wait for every job to finish.
    ///
    /// The first failed job is returned after the remaining jobs finish.
    pub async fn run_to_completion(&mut self) -> SchedulerResult<ElasticReport> {
        let started = Instant::now();
        let mut report = self.dispatch_all()?;

        let mut first_error = None;
        while let Some(joined) = self.tasks.join_next().await {
            let outcome = joined
                .map_err(|e| SchedulerError::Task(e.to_string()))
                .and_then(|res| res);
            if let Err(e) = outcome {
                warn!(error = %e, "elastic job failed");
                first_error.get_or_insert(e);
            }
        }
        if let Some(e) = first_error {
            return Err(e);
        }

        let mut completed = 0;
        for &job_id in &report.dispatched {
            let job = self
                .state
                .get_job(job_id)?
                .ok_or(SchedulerError::JobNotFound(job_id))?;
            if job.status == blockpool_state::JobStatus::Completed {
                completed += 1;
            }
        }
        report.completed = completed;
        report.elapsed_ms = started.elapsed().as_millis() as u64;
        Ok(report)
    }
}
