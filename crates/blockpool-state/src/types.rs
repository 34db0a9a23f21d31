//! Domain types for the blockpool state store.
//!
//! Jobs and workers as persisted in redb. The scheduler crate enforces
//! the transition rules; these types only describe which moves are legal.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Unique identifier for a simulated job. Allocated in creation order.
pub type JobId = u64;

/// Ordinal of a worker within the pool.
pub type WorkerId = u32;

// ── Job ───────────────────────────────────────────────────────────

/// Lifecycle of a simulated job. Forward-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobStatus {
    Pending,
    InProgress,
    Completed,
}

impl JobStatus {
    /// Whether `next` is the single legal successor of this status.
    pub fn can_advance_to(self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (JobStatus::Pending, JobStatus::InProgress)
                | (JobStatus::InProgress, JobStatus::Completed)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::InProgress => "in-progress",
            JobStatus::Completed => "completed",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A simulated unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub status: JobStatus,
    /// Worker chosen at assignment time. Set once, never changed.
    pub assigned_worker: Option<WorkerId>,
    /// Execution lane the job was handed to.
    pub queue: Option<String>,
    /// Unix epoch milliseconds.
    pub created_at: u64,
    pub started_at: Option<u64>,
    pub completed_at: Option<u64>,
}

impl Job {
    pub fn pending(id: JobId, created_at: u64) -> Self {
        Self {
            id,
            status: JobStatus::Pending,
            assigned_worker: None,
            queue: None,
            created_at,
            started_at: None,
            completed_at: None,
        }
    }

    /// True once a worker has been recorded but the job has not finished.
    pub fn is_outstanding(&self) -> bool {
        self.assigned_worker.is_some() && self.status != JobStatus::Completed
    }
}

// ── Worker ────────────────────────────────────────────────────────

/// Availability of a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    Idle,
    Busy,
}

impl WorkerStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            WorkerStatus::Idle => "idle",
            WorkerStatus::Busy => "busy",
        }
    }
}

impl fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A pool member with its dedicated execution lane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Worker {
    pub id: WorkerId,
    /// Lane name, e.g. `load-balancer_03`.
    pub queue_name: String,
    pub status: WorkerStatus,
    /// Job currently owned while busy.
    pub current_job: Option<JobId>,
    pub created_at: u64,
}

impl Worker {
    pub fn idle(id: WorkerId, created_at: u64) -> Self {
        Self {
            id,
            queue_name: Worker::lane_name(id),
            status: WorkerStatus::Idle,
            current_job: None,
            created_at,
        }
    }

    /// Lane label derived from the worker ordinal.
    pub fn lane_name(id: WorkerId) -> String {
        format!("load-balancer_{id:02}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_status_only_moves_forward() {
        use JobStatus::*;
        assert!(Pending.can_advance_to(InProgress));
        assert!(InProgress.can_advance_to(Completed));

        assert!(!Pending.can_advance_to(Completed));
        assert!(!InProgress.can_advance_to(Pending));
        assert!(!Completed.can_advance_to(InProgress));
        assert!(!Completed.can_advance_to(Completed));
    }

    #[test]
    fn job_status_serializes_kebab_case() {
        let json = serde_json::to_string(&JobStatus::InProgress).unwrap();
        assert_eq!(json, "\"in-progress\"");
        assert_eq!(JobStatus::InProgress.to_string(), "in-progress");
    }

    #[test]
    fn lane_names_are_zero_padded() {
        assert_eq!(Worker::lane_name(0), "load-balancer_00");
        assert_eq!(Worker::lane_name(7), "load-balancer_07");
        assert_eq!(Worker::lane_name(12), "load-balancer_12");
    }

    #[test]
    fn outstanding_requires_assignment() {
        let mut job = Job::pending(1, 1000);
        assert!(!job.is_outstanding());

        job.assigned_worker = Some(0);
        assert!(job.is_outstanding());

        job.status = JobStatus::Completed;
        assert!(!job.is_outstanding());
    }
}
