//! End-to-end wiring of one load-balancing simulation.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

use blockpool_autoscale::BlockScaler;
use blockpool_core::SimulationConfig;
use blockpool_state::StateStore;

use crate::error::SchedulerResult;
use crate::executor::{JobDuration, LaneExecutor};
use crate::pool::WorkerPool;
use crate::scheduler::{DispatchReport, Scheduler};

/// Validate `config`, seed the store, make sure worker zero exists, and
/// run the scheduler until every job has completed (or, after
/// `shutdown`, until in-flight jobs have drained).
///
/// Nothing is written to the store when the configuration is invalid.
pub async fn simulate(
    config: &SimulationConfig,
    state: StateStore,
    shutdown: Option<watch::Receiver<bool>>,
) -> SchedulerResult<DispatchReport> {
    config.validate()?;
    let scaler = BlockScaler::from_config(config)?;

    let pool = WorkerPool::load(state.clone(), scaler.ceiling()).await?;
    pool.ensure_worker().await?;

    let (executor, failures) = LaneExecutor::new(
        state.clone(),
        pool.clone(),
        JobDuration::from_config(config),
    );

    let executor = Arc::new(executor);
    let mut scheduler =
        Scheduler::new(state, pool, scaler, executor.clone()).with_failures(failures);
    if let Some(shutdown) = shutdown {
        scheduler = scheduler.with_shutdown(shutdown);
    }

    scheduler.seed(config.total_jobs)?;
    info!(
        total_jobs = config.total_jobs,
        max_workers = config.max_workers,
        block_size = config.block_size,
        "simulation starting"
    );
    let result = scheduler.run_to_completion().await;

    // Lanes hold store handles; release them before returning.
    drop(scheduler);
    executor.close().await;
    result
}
