//! FIFO queue of jobs awaiting assignment.
//!
//! Holds ids only. The state store stays the source of truth for job
//! fields; the queue only fixes the order in which jobs are handed out.

use std::collections::VecDeque;

use blockpool_state::{JobId, StateResult, StateStore};

use crate::error::{SchedulerError, SchedulerResult};

#[derive(Debug, Default)]
pub struct JobQueue {
    pending: VecDeque<JobId>,
}

impl JobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a queue from the store's pending, not yet assigned jobs,
    /// in creation order.
    pub fn from_store(state: &StateStore) -> StateResult<Self> {
        let pending = state
            .list_pending_jobs()?
            .into_iter()
            .filter(|job| job.assigned_worker.is_none())
            .map(|job| job.id)
            .collect();
        Ok(Self { pending })
    }

    pub fn enqueue(&mut self, job: JobId) {
        self.pending.push_back(job);
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Pop the oldest job.
    pub fn remove_front(&mut self) -> SchedulerResult<JobId> {
        self.pending.pop_front().ok_or(SchedulerError::EmptyQueue)
    }
}
