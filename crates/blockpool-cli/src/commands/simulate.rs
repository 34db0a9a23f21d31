use std::fmt::Write as _;
use std::path::Path;

use blockpool_core::SimulationConfig;
use blockpool_scheduler::DispatchReport;

use super::{open_state, shutdown_on_ctrl_c};

/// Values given on the command line; each one overrides the config file.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub total_jobs: Option<u64>,
    pub max_workers: Option<u32>,
    pub block_size: Option<u32>,
    pub min_job_ms: Option<u64>,
    pub max_job_ms: Option<u64>,
}

/// Merge `blockpool.toml` (if given) with command-line overrides.
pub fn resolve_config(
    config_path: Option<&Path>,
    overrides: &Overrides,
) -> anyhow::Result<SimulationConfig> {
    let mut config = match config_path {
        Some(path) => SimulationConfig::from_file(path)?,
        None => SimulationConfig::default(),
    };

    if let Some(v) = overrides.total_jobs {
        config.total_jobs = v;
    }
    if let Some(v) = overrides.max_workers {
        config.max_workers = v;
    }
    if let Some(v) = overrides.block_size {
        config.block_size = v;
    }
    if let Some(v) = overrides.min_job_ms {
        config.min_job_ms = v;
    }
    if let Some(v) = overrides.max_job_ms {
        config.max_job_ms = v;
    }
    Ok(config)
}

pub async fn run(
    config: &SimulationConfig,
    data_dir: Option<&Path>,
    format: &str,
) -> anyhow::Result<()> {
    // Reject bad input before touching the store.
    config.validate()?;

    let state = open_state(data_dir)?;
    let shutdown = shutdown_on_ctrl_c();
    let report = blockpool_scheduler::simulate(config, state, Some(shutdown)).await?;

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&report)?),
        _ => println!("{}", format_report(config, &report)),
    }
    Ok(())
}

pub fn format_report(config: &SimulationConfig, report: &DispatchReport) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Simulated {} jobs (max workers {}, block size {})",
        config.total_jobs, config.max_workers, config.block_size
    );
    let _ = writeln!(out, "  assigned:  {}", report.assignments.len());
    let _ = writeln!(out, "  completed: {}", report.completed);
    let _ = writeln!(
        out,
        "  workers:   {} -> {}",
        report.initial_workers, report.final_workers
    );
    for event in &report.scale_events {
        let _ = writeln!(out, "  scale-up:  {} -> {}", event.from, event.to);
    }
    if report.cancelled {
        let _ = writeln!(
            out,
            "  cancelled: {} jobs left pending",
            report.unassigned
        );
    }
    let _ = write!(out, "  elapsed:   {:.2}s", report.elapsed.as_secs_f64());
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use blockpool_scheduler::{AssignmentRecord, ScaleEvent};

    #[test]
    fn overrides_win_over_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blockpool.toml");
        std::fs::write(
            &path,
            "[simulation]\ntotal_jobs = 10\nmax_workers = 8\nblock_size = 4\n",
        )
        .unwrap();

        let overrides = Overrides {
            total_jobs: Some(3),
            block_size: Some(1),
            ..Overrides::default()
        };
        let config = resolve_config(Some(&path), &overrides).unwrap();
        assert_eq!(config.total_jobs, 3);
        assert_eq!(config.max_workers, 8);
        assert_eq!(config.block_size, 1);
    }

    #[test]
    fn no_file_uses_defaults() {
        let config = resolve_config(None, &Overrides::default()).unwrap();
        assert_eq!(config, SimulationConfig::default());
    }

    #[test]
    fn missing_file_is_an_error() {
        let result = resolve_config(Some(Path::new("/nonexistent/blockpool.toml")), &Overrides::default());
        assert!(result.is_err());
    }

    #[test]
    fn report_lists_scale_ups_and_cancellation() {
        let config = SimulationConfig {
            total_jobs: 5,
            ..SimulationConfig::default()
        };
        let report = DispatchReport {
            assignments: vec![AssignmentRecord { job: 1, worker: 0 }],
            scale_events: vec![ScaleEvent { from: 1, to: 3 }],
            initial_workers: 1,
            final_workers: 3,
            unassigned: 4,
            completed: 1,
            cancelled: true,
            ..DispatchReport::default()
        };

        let text = format_report(&config, &report);
        assert!(text.contains("Simulated 5 jobs"));
        assert!(text.contains("scale-up:  1 -> 3"));
        assert!(text.contains("4 jobs left pending"));
    }

    #[tokio::test]
    async fn run_rejects_zero_ceiling() {
        let config = SimulationConfig {
            total_jobs: 1,
            max_workers: 0,
            ..SimulationConfig::default()
        };
        assert!(run(&config, None, "text").await.is_err());
    }
}
