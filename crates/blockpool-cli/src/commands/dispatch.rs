use std::path::Path;
use std::time::Duration;

use blockpool_scheduler::{ElasticDispatcher, JobDuration, epoch_millis};
use tracing::info;

use super::open_state;

/// Seed `total_jobs` pending jobs and push all of them to one queue.
pub async fn run(
    total_jobs: u64,
    queue: &str,
    concurrency: usize,
    job_ms: (u64, u64),
    data_dir: Option<&Path>,
    format: &str,
) -> anyhow::Result<()> {
    let state = open_state(data_dir)?;
    let ids = state.insert_pending_jobs(total_jobs, epoch_millis())?;
    info!(inserted = ids.len(), "pending jobs seeded");

    let duration = JobDuration::new(
        Duration::from_millis(job_ms.0),
        Duration::from_millis(job_ms.1),
    );
    let mut dispatcher = ElasticDispatcher::new(state, queue, concurrency, duration);
    let report = dispatcher.run_to_completion().await?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&report)?),
        _ => println!(
            "Dispatched {} jobs to queue '{}'; {} completed in {:.2}s",
            report.dispatched.len(),
            report.queue,
            report.completed,
            report.elapsed_ms as f64 / 1000.0
        ),
    }
    Ok(())
}
