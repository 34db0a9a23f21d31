//! Scheduler — the dispatch loop.
//!
//! While jobs remain queued, the loop:
//! - takes the lowest idle worker, if any, and hands it the oldest job
//! - otherwise asks the `BlockScaler` whether the pool may grow, and
//!   creates one block of workers if so
//! - otherwise waits on the pool's change signal until a worker goes idle
//!
//! It is the only writer of job→worker assignments and of idle→busy
//! transitions. Execution substrates report invariant violations through
//! a failure channel, which ends the run with that error.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use blockpool_autoscale::{BlockScaler, ScaleDecision};
use blockpool_state::{JobId, JobStatus, StateStore, Worker, WorkerId};

use crate::epoch_millis;
use crate::error::{SchedulerError, SchedulerResult};
use crate::executor::{Assignment, ExecutionSubstrate, FailureReceiver};
use crate::pool::WorkerPool;
use crate::queue::JobQueue;

/// One job handed to one worker, in dispatch order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssignmentRecord {
    pub job: JobId,
    pub worker: WorkerId,
}

/// One scale-up event: the pool grew from `from` to `to` workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScaleEvent {
    pub from: u32,
    pub to: u32,
}

/// Outcome of a dispatch run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DispatchReport {
    pub assignments: Vec<AssignmentRecord>,
    pub scale_events: Vec<ScaleEvent>,
    pub initial_workers: u32,
    pub final_workers: u32,
    /// Jobs left in the queue; non-zero only when cancelled.
    pub unassigned: usize,
    /// Jobs from `assignments` found completed once in-flight work
    /// drained. Only filled in by `run_to_completion`.
    pub completed: usize,
    pub cancelled: bool,
    pub elapsed: Duration,
}

/// Matches queued jobs to idle workers, growing the pool in blocks.
pub struct Scheduler {
    state: StateStore,
    pool: WorkerPool,
    scaler: BlockScaler,
    queue: JobQueue,
    substrate: Arc<dyn ExecutionSubstrate>,
    failures: Option<FailureReceiver>,
    shutdown: Option<watch::Receiver<bool>>,
}

impl Scheduler {
    /// Create a scheduler with an empty queue.
    ///
    /// `pool` and `scaler` are expected to share the same ceiling; the
    /// pool rejects any creation past its own.
    pub fn new(
        state: StateStore,
        pool: WorkerPool,
        scaler: BlockScaler,
        substrate: Arc<dyn ExecutionSubstrate>,
    ) -> Self {
        Self {
            state,
            pool,
            scaler,
            queue: JobQueue::new(),
            substrate,
            failures: None,
            shutdown: None,
        }
    }

    /// Receive substrate failures while dispatching and draining.
    pub fn with_failures(mut self, failures: FailureReceiver) -> Self {
        self.failures = Some(failures);
        self
    }

    /// Stop assigning once `shutdown` turns true; in-flight jobs still finish.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Insert `total_jobs` pending jobs and queue every unassigned
    /// pending job in the store, oldest first.
    pub fn seed(&mut self, total_jobs: u64) -> SchedulerResult<Vec<JobId>> {
        let ids = self.state.insert_pending_jobs(total_jobs, epoch_millis())?;
        self.queue = JobQueue::from_store(&self.state)?;
        info!(
            inserted = ids.len(),
            queued = self.queue.len(),
            "pending jobs seeded"
        );
        Ok(ids)
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Run the dispatch loop until the queue is empty or shutdown is
    /// requested. Returns once every job is handed off; jobs may still be
    /// running.
    pub async fn run(&mut self) -> SchedulerResult<DispatchReport> {
        let started = Instant::now();
        let mut report = DispatchReport {
            initial_workers: self.pool.count().await,
            ..DispatchReport::default()
        };
        let mut changes = self.pool.subscribe();

        info!(
            queued = self.queue.len(),
            workers = report.initial_workers,
            ceiling = self.scaler.ceiling(),
            block_size = self.scaler.block_size(),
            "dispatch loop started"
        );

        while !self.queue.is_empty() {
            if self.shutdown_requested() {
                warn!(remaining = self.queue.len(), "shutdown requested, stopping dispatch");
                report.cancelled = true;
                break;
            }
            self.check_failures()?;

            // Mark the current generation seen before looking, so a worker
            // released after the scan still wakes the wait below.
            changes.borrow_and_update();

            if let Some(worker) = self.pool.find_idle().await {
                let job = self.assign(worker).await?;
                report.assignments.push(AssignmentRecord { job, worker });
                continue;
            }

            let current = self.pool.count().await;
            match self.scaler.evaluate(current) {
                ScaleDecision::Grow(count) => {
                    self.pool.grow(count).await?;
                    let event = ScaleEvent {
                        from: current,
                        to: current + count,
                    };
                    info!(from = event.from, to = event.to, "worker pool scaled up");
                    report.scale_events.push(event);
                }
                ScaleDecision::AtCeiling => {
                    debug!(
                        workers = current,
                        "all workers busy, waiting for an idle worker"
                    );
                    self.wait_for_capacity(&mut changes).await?;
                }
            }
        }

        report.unassigned = self.queue.len();
        report.final_workers = self.pool.count().await;
        report.elapsed = started.elapsed();
        info!(
            assigned = report.assignments.len(),
            scale_ups = report.scale_events.len(),
            workers = report.final_workers,
            cancelled = report.cancelled,
            "dispatch loop finished"
        );
        Ok(report)
    }

    /// Run the dispatch loop, then wait for every in-flight job.
    pub async fn run_to_completion(&mut self) -> SchedulerResult<DispatchReport> {
        let started = Instant::now();
        let mut report = self.run().await?;

        let pool = self.pool.clone();
        tokio::select! {
            _ = pool.wait_all_idle() => {}
            Some(e) = next_failure(&mut self.failures) => return Err(e),
        }
        // A lane may have failed on its last job just before going idle.
        self.check_failures()?;

        report.completed = self.count_completed(&report.assignments)?;
        report.elapsed = started.elapsed();
        info!(
            completed = report.completed,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "all in-flight jobs finished"
        );
        Ok(report)
    }

    /// Number of jobs handed out by this run that have completed.
    fn count_completed(&self, assignments: &[AssignmentRecord]) -> SchedulerResult<usize> {
        let mut completed = 0;
        for record in assignments {
            let job = self
                .state
                .get_job(record.job)?
                .ok_or(SchedulerError::JobNotFound(record.job))?;
            if job.status == JobStatus::Completed {
                completed += 1;
            }
        }
        Ok(completed)
    }

    /// Hand the oldest queued job to `worker`.
    async fn assign(&mut self, worker: WorkerId) -> SchedulerResult<JobId> {
        let job_id = self.queue.remove_front()?;
        let mut job = self
            .state
            .get_job(job_id)?
            .ok_or(SchedulerError::JobNotFound(job_id))?;
        if job.status != JobStatus::Pending || job.assigned_worker.is_some() {
            return Err(SchedulerError::transition(
                format!("job {job_id}"),
                job.status,
                "assigned",
            ));
        }

        self.pool.mark_busy(worker, job_id).await?;

        let lane = Worker::lane_name(worker);
        job.assigned_worker = Some(worker);
        job.queue = Some(lane.clone());
        self.state.put_job(&job)?;

        self.substrate.submit(Assignment {
            job: job_id,
            worker,
            lane: lane.clone(),
        })?;
        info!(job_id, worker = %lane, "job assigned");
        Ok(job_id)
    }

    async fn wait_for_capacity(
        &mut self,
        changes: &mut watch::Receiver<u64>,
    ) -> SchedulerResult<()> {
        tokio::select! {
            res = changes.changed() => {
                res.map_err(|_| SchedulerError::SubstrateClosed)?;
            }
            Some(e) = next_failure(&mut self.failures) => return Err(e),
            _ = shutdown_signal(&mut self.shutdown) => {}
        }
        Ok(())
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown.as_ref().is_some_and(|rx| *rx.borrow())
    }

    fn check_failures(&mut self) -> SchedulerResult<()> {
        if let Some(rx) = self.failures.as_mut()
            && let Ok(e) = rx.try_recv()
        {
            return Err(e);
        }
        Ok(())
    }
}

async fn next_failure(
    failures: &mut Option<mpsc::UnboundedReceiver<SchedulerError>>,
) -> Option<SchedulerError> {
    match failures {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn shutdown_signal(shutdown: &mut Option<watch::Receiver<bool>>) {
    match shutdown {
        Some(rx) => {
            if rx.wait_for(|stop| *stop).await.is_err() {
                // Sender gone without asking to stop: never fires.
                std::future::pending::<()>().await;
            }
        }
        None => std::future::pending().await,
    }
}
