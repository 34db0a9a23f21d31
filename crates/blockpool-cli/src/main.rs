//! blockpool — load-balancing simulator.
//!
//! # Usage
//!
//! ```text
//! blockpool simulate 20 --max-workers 5 --block-size 2
//! blockpool dispatch-all 20 --queue default --concurrency 8
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

mod commands;

#[derive(Parser)]
#[command(
    name = "blockpool",
    about = "blockpool — simulate a block-scaling worker pool draining a job backlog",
    version,
    propagate_version = true,
)]
struct Cli {
    /// Log output format.
    #[arg(long, value_enum, default_value = "text", global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Distribute jobs over a worker pool that grows in blocks up to a ceiling.
    Simulate {
        /// Number of simulated jobs to create (overrides the config file).
        total_jobs: Option<u64>,
        /// Maximum number of workers (Y).
        #[arg(long)]
        max_workers: Option<u32>,
        /// Workers added per scale-up (Z).
        #[arg(long)]
        block_size: Option<u32>,
        /// Shortest simulated job, in milliseconds.
        #[arg(long)]
        min_job_ms: Option<u64>,
        /// Longest simulated job, in milliseconds.
        #[arg(long)]
        max_job_ms: Option<u64>,
        /// Path to a blockpool.toml with a [simulation] table.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Directory for the persistent state store (in-memory if omitted).
        #[arg(long)]
        data_dir: Option<PathBuf>,
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },
    /// Dispatch every pending job to a single shared queue, no pool.
    DispatchAll {
        /// Number of simulated jobs to create.
        total_jobs: u64,
        /// Queue the jobs are dispatched to.
        #[arg(long, default_value = blockpool_scheduler::elastic::DEFAULT_QUEUE)]
        queue: String,
        /// Jobs allowed to run at once on the queue.
        #[arg(long, default_value = "10")]
        concurrency: usize,
        #[arg(long, default_value_t = blockpool_core::config::DEFAULT_MIN_JOB_MS)]
        min_job_ms: u64,
        #[arg(long, default_value_t = blockpool_core::config::DEFAULT_MAX_JOB_MS)]
        max_job_ms: u64,
        /// Directory for the persistent state store (in-memory if omitted).
        #[arg(long)]
        data_dir: Option<PathBuf>,
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format)?;

    match cli.command {
        Commands::Simulate {
            total_jobs,
            max_workers,
            block_size,
            min_job_ms,
            max_job_ms,
            config,
            data_dir,
            format,
        } => {
            let overrides = commands::simulate::Overrides {
                total_jobs,
                max_workers,
                block_size,
                min_job_ms,
                max_job_ms,
            };
            let config = commands::simulate::resolve_config(config.as_deref(), &overrides)?;
            commands::simulate::run(&config, data_dir.as_deref(), &format).await
        }
        Commands::DispatchAll {
            total_jobs,
            queue,
            concurrency,
            min_job_ms,
            max_job_ms,
            data_dir,
            format,
        } => {
            commands::dispatch::run(
                total_jobs,
                &queue,
                concurrency,
                (min_job_ms, max_job_ms),
                data_dir.as_deref(),
                &format,
            )
            .await
        }
    }
}

fn init_tracing(format: LogFormat) -> anyhow::Result<()> {
    let filter = match tracing_subscriber::EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => "info,blockpool=debug".parse()?,
    };
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
    Ok(())
}
