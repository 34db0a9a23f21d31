//! blockpool-scheduler — block-scaling job dispatch.
//!
//! Drains a FIFO backlog of simulated jobs onto a worker pool that grows
//! in fixed-size blocks up to a ceiling. The scheduler:
//!
//! - Matches the oldest pending job to the lowest idle worker
//! - Grows the pool through `blockpool-autoscale` when no worker is idle
//! - Blocks on the pool's change signal when the pool is full
//! - Hands each assignment to an execution substrate that runs it on the
//!   worker's own lane and frees the worker when done
//!
//! # Architecture
//!
//! ```text
//! Scheduler (single dispatch loop)
//!   ├── JobQueue (FIFO of pending job ids)
//!   ├── BlockScaler (how many workers to add, if any)
//!   ├── WorkerPool (status map under one lock + change signal)
//!   │     └── StateStore (worker records)
//!   └── ExecutionSubstrate
//!         └── LaneExecutor (one tokio task per worker lane)
//!               ├── StateStore (job in-progress / completed)
//!               └── WorkerPool (busy → idle)
//! ```
//!
//! `ElasticDispatcher` is the alternative mode that skips the pool and
//! sends every pending job to one shared queue.

pub mod elastic;
pub mod error;
pub mod executor;
pub mod pool;
pub mod queue;
pub mod scheduler;
pub mod simulation;

pub use elastic::{ElasticDispatcher, ElasticReport};
pub use error::{SchedulerError, SchedulerResult};
pub use executor::{Assignment, ExecutionSubstrate, JobDuration, LaneExecutor};
pub use pool::WorkerPool;
pub use queue::JobQueue;
pub use scheduler::{AssignmentRecord, DispatchReport, ScaleEvent, Scheduler};
pub use simulation::simulate;

use std::time::{SystemTime, UNIX_EPOCH};

/// Current Unix epoch in milliseconds.
pub fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
