//! End-to-end simulation scenarios.
//!
//! Runs the full stack (state store, worker pool, lane executor, dispatch
//! loop) with short job bodies and checks the run against the properties
//! the scheduler promises.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tokio::sync::watch;

use blockpool_core::{ConfigError, SimulationConfig};
use blockpool_scheduler::{DispatchReport, SchedulerError, simulate};
use blockpool_state::*;

fn config(total_jobs: u64, max_workers: u32, block_size: u32, job_ms: (u64, u64)) -> SimulationConfig {
    SimulationConfig {
        total_jobs,
        max_workers,
        block_size,
        min_job_ms: job_ms.0,
        max_job_ms: job_ms.1,
    }
}

/// Checks every property a finished run must satisfy.
fn assert_run_invariants(state: &StateStore, cfg: &SimulationConfig, report: &DispatchReport) {
    let jobs = state.list_jobs().unwrap();

    // Every job completed exactly once, and each was assigned.
    assert_eq!(report.completed as u64, cfg.total_jobs);
    for job in &jobs {
        assert_eq!(job.status, JobStatus::Completed, "job {} not completed", job.id);
        assert!(job.assigned_worker.is_some());
        assert!(job.started_at.is_some() && job.completed_at.is_some());
        assert!(job.completed_at >= job.started_at);
    }

    // FIFO: dispatch order is creation order.
    let order: Vec<JobId> = report.assignments.iter().map(|a| a.job).collect();
    let mut sorted = order.clone();
    sorted.sort_unstable();
    assert_eq!(order, sorted);

    // Growth never overshoots and each block is clamped.
    assert!(report.final_workers <= cfg.max_workers);
    let mut current = report.initial_workers;
    for event in &report.scale_events {
        assert_eq!(event.from, current);
        assert_eq!(
            event.to - event.from,
            cfg.block_size.min(cfg.max_workers - event.from)
        );
        current = event.to;
    }
    assert_eq!(current, report.final_workers);

    // No worker ran two jobs at once.
    let mut by_worker: HashMap<WorkerId, Vec<&Job>> = HashMap::new();
    for job in &jobs {
        by_worker.entry(job.assigned_worker.unwrap()).or_default().push(job);
    }
    for runs in by_worker.values_mut() {
        runs.sort_by_key(|j| j.started_at);
        for pair in runs.windows(2) {
            assert!(pair[1].started_at >= pair[0].completed_at);
        }
    }

    // Everyone is back to idle.
    let workers = state.list_workers().unwrap();
    assert!(workers.iter().all(|w| w.status == WorkerStatus::Idle));
    assert!(workers.iter().all(|w| w.current_job.is_none()));
}

#[tokio::test]
async fn scenario_a_grows_one_three_five() {
    let state = StateStore::open_in_memory().unwrap();
    let cfg = config(5, 5, 2, (100, 100));

    let report = simulate(&cfg, state.clone(), None).await.unwrap();

    let steps: Vec<(u32, u32)> = report.scale_events.iter().map(|e| (e.from, e.to)).collect();
    assert_eq!(steps, vec![(1, 3), (3, 5)]);
    assert_eq!(report.final_workers, 5);
    assert_eq!(state.count_workers().unwrap(), 5);
    assert_run_invariants(&state, &cfg, &report);
}

#[tokio::test]
async fn scenario_b_single_worker_runs_jobs_sequentially() {
    let state = StateStore::open_in_memory().unwrap();
    let cfg = config(3, 1, 2, (30, 30));

    let started = Instant::now();
    let report = simulate(&cfg, state.clone(), None).await.unwrap();

    assert!(started.elapsed() >= Duration::from_millis(90));
    assert!(report.scale_events.is_empty());
    assert_eq!(report.final_workers, 1);
    assert!(report.assignments.iter().all(|a| a.worker == 0));
    assert_run_invariants(&state, &cfg, &report);
}

#[tokio::test]
async fn scenario_c_zero_jobs_completes_immediately() {
    let state = StateStore::open_in_memory().unwrap();
    let cfg = config(0, 5, 2, (10, 10));

    let report = simulate(&cfg, state.clone(), None).await.unwrap();

    assert!(report.assignments.is_empty());
    assert!(report.scale_events.is_empty());
    assert_eq!(report.final_workers, 1);
    assert_eq!(report.completed, 0);
    assert_eq!(state.count_workers().unwrap(), 1);
}

#[tokio::test]
async fn scenario_d_zero_ceiling_is_rejected_before_any_work() {
    let state = StateStore::open_in_memory().unwrap();
    let cfg = config(4, 0, 2, (10, 10));

    let result = simulate(&cfg, state.clone(), None).await;

    assert!(matches!(
        result,
        Err(SchedulerError::InvalidConfiguration(ConfigError::ZeroCeiling))
    ));
    assert!(state.list_jobs().unwrap().is_empty());
    assert_eq!(state.count_workers().unwrap(), 0);
}

#[tokio::test]
async fn zero_block_size_is_rejected() {
    let state = StateStore::open_in_memory().unwrap();
    let cfg = config(4, 3, 0, (10, 10));

    assert!(matches!(
        simulate(&cfg, state.clone(), None).await,
        Err(SchedulerError::InvalidConfiguration(ConfigError::ZeroBlockSize))
    ));
    assert!(state.list_jobs().unwrap().is_empty());
}

#[tokio::test]
async fn invariants_hold_across_configurations() {
    let cases = [
        (12, 4, 3),
        (7, 3, 5),
        (20, 6, 1),
        (9, 9, 4),
        (1, 2, 2),
    ];
    for (total, ceiling, block) in cases {
        let state = StateStore::open_in_memory().unwrap();
        let cfg = config(total, ceiling, block, (1, 8));

        let report = simulate(&cfg, state.clone(), None).await.unwrap();
        assert_eq!(report.assignments.len() as u64, total);
        assert_run_invariants(&state, &cfg, &report);
    }
}

#[tokio::test]
async fn shutdown_drains_in_flight_jobs() {
    let state = StateStore::open_in_memory().unwrap();
    let cfg = config(5, 1, 1, (40, 40));
    let (stop_tx, stop_rx) = watch::channel(false);

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        stop_tx.send(true).unwrap();
    });

    let report = simulate(&cfg, state.clone(), Some(stop_rx)).await.unwrap();

    assert!(report.cancelled);
    assert!(!report.assignments.is_empty());
    assert_eq!(report.completed, report.assignments.len());
    assert_eq!(report.unassigned, 5 - report.assignments.len());
    assert_eq!(
        state.count_jobs_with_status(JobStatus::Pending).unwrap(),
        report.unassigned
    );
    assert!(
        state
            .list_workers()
            .unwrap()
            .iter()
            .all(|w| w.status == WorkerStatus::Idle)
    );
}

#[tokio::test]
async fn on_disk_store_carries_workers_and_jobs_across_runs() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("blockpool.redb");

    {
        let state = StateStore::open(&path).unwrap();
        let report = simulate(&config(4, 3, 2, (1, 3)), state, None).await.unwrap();
        assert_eq!(report.completed, 4);
    }

    let state = StateStore::open(&path).unwrap();
    let report = simulate(&config(2, 3, 2, (1, 3)), state.clone(), None)
        .await
        .unwrap();

    // Existing workers are reused rather than recreated.
    assert!(report.initial_workers >= 1);
    assert!(report.final_workers <= 3);
    // Only this run's jobs are reported.
    assert_eq!(report.assignments.len(), 2);
    assert_eq!(report.completed, 2);
    assert_eq!(state.list_jobs().unwrap().len(), 6);
    assert_eq!(state.count_jobs_with_status(JobStatus::Completed).unwrap(), 6);
}

#[tokio::test]
async fn interrupted_job_is_finished_by_the_next_run() {
    let state = StateStore::open_in_memory().unwrap();

    // Leftovers of a run that stopped mid-job: worker 0 busy on job 1.
    state.insert_pending_jobs(1, 1000).unwrap();
    let mut worker = Worker::idle(0, 1000);
    worker.status = WorkerStatus::Busy;
    worker.current_job = Some(1);
    state.put_worker(&worker).unwrap();
    let mut job = state.get_job(1).unwrap().unwrap();
    job.status = JobStatus::InProgress;
    job.assigned_worker = Some(0);
    job.queue = Some(Worker::lane_name(0));
    job.started_at = Some(1100);
    state.put_job(&job).unwrap();

    let cfg = config(2, 2, 1, (1, 3));
    let report = simulate(&cfg, state.clone(), None).await.unwrap();

    let jobs: Vec<JobId> = report.assignments.iter().map(|a| a.job).collect();
    assert_eq!(jobs, vec![1, 2, 3]);
    assert_eq!(report.completed, 3);
    for job in state.list_jobs().unwrap() {
        assert_eq!(job.status, JobStatus::Completed, "job {} not completed", job.id);
        assert!(job.assigned_worker.is_some());
    }
    assert!(
        state
            .list_workers()
            .unwrap()
            .iter()
            .all(|w| w.status == WorkerStatus::Idle && w.current_job.is_none())
    );
}

#[tokio::test]
async fn report_serializes_for_json_output() {
    let state = StateStore::open_in_memory().unwrap();
    let report = simulate(&config(3, 3, 2, (1, 2)), state, None).await.unwrap();

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["assignments"].as_array().unwrap().len(), 3);
    assert_eq!(json["scale_events"][0]["from"], 1);
    assert_eq!(json["scale_events"][0]["to"], 3);
    assert_eq!(json["cancelled"], false);
}
