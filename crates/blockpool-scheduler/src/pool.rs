//! Worker pool — the bounded, growing set of workers and their status.
//!
//! Every status change goes through `mark_busy` / `mark_idle`, which
//! validate the transition under the pool lock and mirror the new record
//! into the state store. A watch channel carries a generation counter that
//! is bumped whenever a worker goes idle or the pool grows, so waiters
//! observe every change without polling.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::{Mutex, watch};
use tracing::{debug, info, warn};

use blockpool_state::{JobId, JobStatus, StateStore, Worker, WorkerId, WorkerStatus};

use crate::epoch_millis;
use crate::error::{SchedulerError, SchedulerResult};

/// Shared handle to the worker pool. Cloning shares the same workers.
#[derive(Clone)]
pub struct WorkerPool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    state: StateStore,
    ceiling: u32,
    /// Workers by ordinal. Ordinals are dense since nothing is removed.
    workers: Mutex<BTreeMap<WorkerId, Worker>>,
    changed: watch::Sender<u64>,
}

impl WorkerPool {
    /// Create an empty pool bounded by `ceiling`.
    pub fn new(state: StateStore, ceiling: u32) -> Self {
        let (changed, _) = watch::channel(0);
        Self {
            inner: Arc::new(PoolInner {
                state,
                ceiling,
                workers: Mutex::new(BTreeMap::new()),
                changed,
            }),
        }
    }

    /// Create a pool from the workers already recorded in the store.
    ///
    /// Workers left busy by an earlier run have no lane behind them
    /// anymore, so they are reset to idle, and every job still assigned
    /// but unfinished goes back to pending so the next seed queues it.
    pub async fn load(state: StateStore, ceiling: u32) -> SchedulerResult<Self> {
        let pool = Self::new(state, ceiling);
        let stored = pool.inner.state.list_workers()?;
        {
            let mut workers = pool.inner.workers.lock().await;
            for mut worker in stored {
                if worker.status == WorkerStatus::Busy {
                    warn!(
                        worker = %worker.queue_name,
                        job_id = ?worker.current_job,
                        "resetting stale busy worker"
                    );
                    worker.status = WorkerStatus::Idle;
                    worker.current_job = None;
                    pool.inner.state.put_worker(&worker)?;
                }
                workers.insert(worker.id, worker);
            }
            if workers.len() as u32 > ceiling {
                warn!(
                    existing = workers.len(),
                    ceiling, "store holds more workers than the ceiling allows"
                );
            }
            debug!(workers = workers.len(), "worker pool loaded");
        }
        pool.requeue_orphaned_jobs()?;
        Ok(pool)
    }

    /// Return jobs whose worker no longer runs them to the pending state.
    fn requeue_orphaned_jobs(&self) -> SchedulerResult<()> {
        let state = &self.inner.state;
        for mut job in state.list_jobs()? {
            if !job.is_outstanding() {
                continue;
            }
            warn!(
                job_id = job.id,
                worker = ?job.assigned_worker,
                status = %job.status,
                "requeueing orphaned job"
            );
            job.status = JobStatus::Pending;
            job.assigned_worker = None;
            job.queue = None;
            job.started_at = None;
            state.put_job(&job)?;
        }
        Ok(())
    }

    /// Guarantee at least one worker exists before dispatch begins.
    pub async fn ensure_worker(&self) -> SchedulerResult<()> {
        if self.count().await == 0 {
            self.create_worker().await?;
        }
        Ok(())
    }

    /// Allocate a new idle worker with the next ordinal.
    pub async fn create_worker(&self) -> SchedulerResult<Worker> {
        let mut workers = self.inner.workers.lock().await;
        if workers.len() as u32 >= self.inner.ceiling {
            return Err(SchedulerError::CapacityExceeded {
                ceiling: self.inner.ceiling,
            });
        }

        let id = workers.len() as WorkerId;
        let worker = Worker::idle(id, epoch_millis());
        self.inner.state.put_worker(&worker)?;
        workers.insert(id, worker.clone());
        drop(workers);

        self.bump();
        info!(worker = %worker.queue_name, "worker created");
        Ok(worker)
    }

    /// Create `count` workers as one scale-up event.
    pub async fn grow(&self, count: u32) -> SchedulerResult<Vec<Worker>> {
        let mut created = Vec::with_capacity(count as usize);
        for _ in 0..count {
            created.push(self.create_worker().await?);
        }
        Ok(created)
    }

    /// Lowest-ordinal idle worker, if any.
    pub async fn find_idle(&self) -> Option<WorkerId> {
        let workers = self.inner.workers.lock().await;
        workers
            .values()
            .find(|w| w.status == WorkerStatus::Idle)
            .map(|w| w.id)
    }

    /// Transition `worker` from idle to busy, owning `job`.
    pub async fn mark_busy(&self, worker: WorkerId, job: JobId) -> SchedulerResult<()> {
        let mut workers = self.inner.workers.lock().await;
        let current = workers
            .get(&worker)
            .ok_or(SchedulerError::WorkerNotFound(worker))?;

        if current.status != WorkerStatus::Idle {
            return Err(SchedulerError::transition(
                format!("worker {}", current.queue_name),
                current.status,
                WorkerStatus::Busy,
            ));
        }

        let mut updated = current.clone();
        updated.status = WorkerStatus::Busy;
        updated.current_job = Some(job);
        self.inner.state.put_worker(&updated)?;
        workers.insert(worker, updated);

        debug!(worker, job_id = job, "worker marked busy");
        Ok(())
    }

    /// Transition `worker` from busy back to idle once `job` finished.
    ///
    /// The releasing job must be the one the worker owns.
    pub async fn mark_idle(&self, worker: WorkerId, job: JobId) -> SchedulerResult<()> {
        let mut workers = self.inner.workers.lock().await;
        let current = workers
            .get(&worker)
            .ok_or(SchedulerError::WorkerNotFound(worker))?;

        if current.status != WorkerStatus::Busy || current.current_job != Some(job) {
            return Err(SchedulerError::transition(
                format!("worker {} releasing job {job}", current.queue_name),
                current.status,
                WorkerStatus::Idle,
            ));
        }

        let mut updated = current.clone();
        updated.status = WorkerStatus::Idle;
        updated.current_job = None;
        self.inner.state.put_worker(&updated)?;
        workers.insert(worker, updated);
        drop(workers);

        self.bump();
        debug!(worker, job_id = job, "worker marked idle");
        Ok(())
    }

    /// Total worker count (idle + busy).
    pub async fn count(&self) -> u32 {
        self.inner.workers.lock().await.len() as u32
    }

    pub async fn busy_count(&self) -> u32 {
        let workers = self.inner.workers.lock().await;
        workers
            .values()
            .filter(|w| w.status == WorkerStatus::Busy)
            .count() as u32
    }

    pub fn ceiling(&self) -> u32 {
        self.inner.ceiling
    }

    /// Copy of every worker, ordered by ordinal.
    pub async fn snapshot(&self) -> Vec<Worker> {
        self.inner.workers.lock().await.values().cloned().collect()
    }

    /// Change signal. The receiver starts with the current generation
    /// marked as seen.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.inner.changed.subscribe()
    }

    /// Resolve once no worker is busy.
    pub async fn wait_all_idle(&self) {
        let mut changes = self.subscribe();
        loop {
            changes.borrow_and_update();
            if self.busy_count().await == 0 {
                return;
            }
            // The sender lives as long as the pool, so this cannot fail
            // while `self` is alive.
            if changes.changed().await.is_err() {
                return;
            }
        }
    }

    fn bump(&self) {
        self.inner.changed.send_modify(|generation| *generation += 1);
    }
}
