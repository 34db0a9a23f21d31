//! Execution substrate — runs assigned jobs off the dispatch loop.
//!
//! The scheduler hands each `(job, worker, lane)` triple to an
//! [`ExecutionSubstrate`] and moves on. [`LaneExecutor`] is the in-process
//! substrate: one tokio task per lane, where a lane is named after its
//! worker, so a worker never runs two jobs at once and jobs on different
//! workers run in parallel.
//!
//! The job body is a stand-in: mark the job in-progress, sleep for a
//! random duration within bounds, mark it completed. The lane then returns
//! its worker to idle. Those two writes are the only writers of
//! `completed` and `idle`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use rand::Rng;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use blockpool_core::SimulationConfig;
use blockpool_state::{JobId, JobStatus, StateStore, WorkerId};

use crate::epoch_millis;
use crate::error::{SchedulerError, SchedulerResult};
use crate::pool::WorkerPool;

/// A job handed to a worker's lane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub job: JobId,
    pub worker: WorkerId,
    /// Lane the job runs on; the worker's queue name.
    pub lane: String,
}

/// Asynchronous runner for assigned jobs.
///
/// `submit` is fire-and-forget. The implementation must eventually mark
/// the job completed and the worker idle, exactly once per job.
pub trait ExecutionSubstrate: Send + Sync {
    fn submit(&self, assignment: Assignment) -> SchedulerResult<()>;
}

/// Channel on which substrates report invariant violations back to the
/// dispatch loop.
pub type FailureSender = mpsc::UnboundedSender<SchedulerError>;
pub type FailureReceiver = mpsc::UnboundedReceiver<SchedulerError>;

// ── Job body ───────────────────────────────────────────────────────

/// Inclusive bounds for the simulated job body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobDuration {
    min: Duration,
    max: Duration,
}

impl JobDuration {
    /// Bounds are swapped if given in the wrong order.
    pub fn new(min: Duration, max: Duration) -> Self {
        if min <= max {
            Self { min, max }
        } else {
            Self { min: max, max: min }
        }
    }

    pub fn fixed(duration: Duration) -> Self {
        Self::new(duration, duration)
    }

    pub fn from_config(config: &SimulationConfig) -> Self {
        let (min, max) = config.job_duration();
        Self::new(min, max)
    }

    /// Pick a duration uniformly at millisecond granularity.
    pub fn sample(&self) -> Duration {
        let min_ms = self.min.as_millis() as u64;
        let max_ms = self.max.as_millis() as u64;
        if min_ms == max_ms {
            return self.min;
        }
        let ms = rand::thread_rng().gen_range(min_ms..=max_ms);
        Duration::from_millis(ms)
    }
}

/// Run the stand-in job body for `job` on `lane`.
///
/// Shared by the lane executor and the elastic dispatcher. Returns the
/// simulated duration.
pub(crate) async fn run_job_body(
    state: &StateStore,
    job_id: JobId,
    lane: &str,
    duration: &JobDuration,
) -> SchedulerResult<Duration> {
    let mut job = state
        .get_job(job_id)?
        .ok_or(SchedulerError::JobNotFound(job_id))?;
    if !job.status.can_advance_to(JobStatus::InProgress) {
        return Err(SchedulerError::transition(
            format!("job {job_id}"),
            job.status,
            JobStatus::InProgress,
        ));
    }
    job.status = JobStatus::InProgress;
    job.started_at = Some(epoch_millis());
    job.queue = Some(lane.to_string());
    state.put_job(&job)?;
    debug!(job_id, %lane, "job started");

    let delay = duration.sample();
    tokio::time::sleep(delay).await;

    // Re-read so a duplicate completion is caught by the transition check.
    let mut job = state
        .get_job(job_id)?
        .ok_or(SchedulerError::JobNotFound(job_id))?;
    if !job.status.can_advance_to(JobStatus::Completed) {
        return Err(SchedulerError::transition(
            format!("job {job_id}"),
            job.status,
            JobStatus::Completed,
        ));
    }
    job.status = JobStatus::Completed;
    job.completed_at = Some(epoch_millis());
    state.put_job(&job)?;

    Ok(delay)
}

// ── Lane executor ──────────────────────────────────────────────────

/// In-process substrate with one sequential lane per worker.
#[derive(Clone)]
pub struct LaneExecutor {
    inner: Arc<LaneInner>,
}

struct LaneInner {
    runner: Arc<LaneRunner>,
    lanes: Mutex<HashMap<String, Lane>>,
}

struct Lane {
    tx: mpsc::UnboundedSender<Assignment>,
    task: JoinHandle<()>,
}

/// What a lane task needs. Holds no lane senders, so lanes close once the
/// executor is dropped.
struct LaneRunner {
    state: StateStore,
    pool: WorkerPool,
    duration: JobDuration,
    failures: FailureSender,
}

impl LaneExecutor {
    /// Create an executor. The returned receiver yields lane failures and
    /// is meant for `Scheduler::with_failures`.
    pub fn new(
        state: StateStore,
        pool: WorkerPool,
        duration: JobDuration,
    ) -> (Self, FailureReceiver) {
        let (failures, failure_rx) = mpsc::unbounded_channel();
        let executor = Self {
            inner: Arc::new(LaneInner {
                runner: Arc::new(LaneRunner {
                    state,
                    pool,
                    duration,
                    failures,
                }),
                lanes: Mutex::new(HashMap::new()),
            }),
        };
        (executor, failure_rx)
    }

    /// Number of lanes started so far.
    pub fn lane_count(&self) -> usize {
        self.inner
            .lanes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn lane_sender(&self, lane: &str) -> mpsc::UnboundedSender<Assignment> {
        let mut lanes = self
            .inner
            .lanes
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = lanes.get(lane)
            && !existing.tx.is_closed()
        {
            return existing.tx.clone();
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(run_lane(lane.to_string(), rx, self.inner.runner.clone()));
        lanes.insert(
            lane.to_string(),
            Lane {
                tx: tx.clone(),
                task,
            },
        );
        debug!(%lane, "lane started");
        tx
    }

    /// Close every lane and wait for its task to exit. Jobs already
    /// submitted still run first. Later submissions start fresh lanes.
    pub async fn close(&self) {
        let lanes: Vec<(String, Lane)> = self
            .inner
            .lanes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .collect();

        for (name, lane) in lanes {
            drop(lane.tx);
            if let Err(e) = lane.task.await {
                error!(lane = %name, error = %e, "lane task panicked");
            }
        }
    }
}

impl ExecutionSubstrate for LaneExecutor {
    fn submit(&self, assignment: Assignment) -> SchedulerResult<()> {
        let tx = self.lane_sender(&assignment.lane);
        tx.send(assignment)
            .map_err(|_| SchedulerError::SubstrateClosed)
    }
}

async fn run_lane(
    lane: String,
    mut rx: mpsc::UnboundedReceiver<Assignment>,
    runner: Arc<LaneRunner>,
) {
    while let Some(assignment) = rx.recv().await {
        if let Err(e) = execute(&runner, &assignment).await {
            error!(
                %lane,
                job_id = assignment.job,
                worker = assignment.worker,
                error = %e,
                "job execution failed"
            );
            // The dispatch loop may already have returned; nothing left
            // to report to in that case.
            let _ = runner.failures.send(e);
        }
    }
    debug!(%lane, "lane closed");
}

async fn execute(runner: &LaneRunner, assignment: &Assignment) -> SchedulerResult<()> {
    let delay = run_job_body(
        &runner.state,
        assignment.job,
        &assignment.lane,
        &runner.duration,
    )
    .await?;
    runner.pool.mark_idle(assignment.worker, assignment.job).await?;

    info!(
        job_id = assignment.job,
        worker = %assignment.lane,
        elapsed_ms = delay.as_millis() as u64,
        "job completed"
    );
    Ok(())
}
