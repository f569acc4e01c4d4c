//! r-scheduler - Adaptive worker-pool controller for run-parallel.sh jobs.
//!
//! Usage:
//!   r-scheduler [options] <psub_cmd path | job id>

use clap::Parser;
use rscheduler::{
    ConfigError, ControllerBuilder, ControllerConfig, Event, EventHandler, JobId, MonitorError,
    ShutdownReason, YamlLoader,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info};

/// r-scheduler - keep a fraction of the cluster free by resizing one job's worker pool
#[derive(Parser)]
#[command(name = "r-scheduler")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Schedule an add rule, e.g. "0.05:0 0 18 * * * mon-fri"
    #[arg(short = 'a', value_name = "FRACTION:PATTERN")]
    add: Vec<String>,

    /// Schedule a quench rule, e.g. "0.3:0 0 8 * * * mon-fri"
    #[arg(short = 'q', value_name = "FRACTION:PATTERN")]
    quench: Vec<String>,

    /// Minutes between two feedback cycles [default: 5]
    #[arg(short = 'b', value_name = "MINUTES")]
    burst_interval: Option<u64>,

    /// Never quench below this many workers [default: 60]
    #[arg(short = 'm', value_name = "WORKERS")]
    minimum_workers: Option<u64>,

    /// Initial fraction of the cluster to keep free [default: 0.1]
    #[arg(short = 'f', value_name = "FRACTION")]
    free_fraction: Option<f64>,

    /// Log add/quench commands without running them
    #[arg(short = 'n', long = "not-really")]
    not_really: bool,

    /// Print debug output to stderr
    #[arg(short = 'd', long)]
    debug: bool,

    /// YAML configuration file; flags override its values
    #[arg(short = 'c', long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// IANA timezone schedule rules are evaluated in [default: UTC]
    #[arg(long, value_name = "TZ")]
    timezone: Option<String>,

    /// Path to the job's psub_cmd file, or its job ID
    #[arg(value_name = "JOB")]
    job: Option<String>,
}

#[derive(Debug, Error)]
enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Monitor(#[from] MonitorError),
}

/// Logging event handler for events the components do not log themselves.
struct LoggingHandler;

#[async_trait::async_trait]
impl EventHandler for LoggingHandler {
    async fn handle(&self, event: &Event) {
        match event {
            Event::CycleCompleted {
                job_id, adjustment, ..
            } => {
                debug!("Cycle for job {} decided: {}", job_id, adjustment);
            }
            Event::WorkersAdded {
                job_id,
                count,
                dry_run: true,
                ..
            } => {
                info!("Dry run: would add {} worker(s) to job {}", count, job_id);
            }
            Event::WorkersQuenched {
                job_id,
                count,
                dry_run: true,
                ..
            } => {
                info!("Dry run: would quench {} worker(s) from job {}", count, job_id);
            }
            Event::ShutdownRequested { reason, .. } => {
                info!("Shutting down: {}", reason);
            }
            _ => {}
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    // Initialize logging
    let level = if cli.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .with_writer(std::io::stderr)
        .init();

    let result = run(cli).await;
    match &result {
        Ok(reason) => info!("Stopped: {}", reason),
        Err(e) => error!("Fatal error: {}", e),
    }
    ExitCode::from(exit_status(&result))
}

/// Process exit status for the outcome of [`run`].
fn exit_status(result: &Result<ShutdownReason, AppError>) -> u8 {
    match result {
        // Job gone or interrupted.
        Ok(_) => 0,
        Err(AppError::Config(_) | AppError::Monitor(_)) => 1,
    }
}

/// Merge the configuration file (if any) with command line flags.
fn load_config(cli: &Cli) -> Result<ControllerConfig, ConfigError> {
    let mut config = match &cli.config {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            YamlLoader::load_config(path)?
        }
        None => ControllerConfig::default(),
    };

    config.add.extend(cli.add.iter().cloned());
    config.quench.extend(cli.quench.iter().cloned());
    if let Some(minutes) = cli.burst_interval {
        config.burst_interval_minutes = minutes;
    }
    if let Some(workers) = cli.minimum_workers {
        config.minimum_workers = workers;
    }
    if let Some(fraction) = cli.free_fraction {
        config.free_fraction = fraction;
    }
    if let Some(timezone) = &cli.timezone {
        config.timezone = timezone.clone();
    }
    if cli.not_really {
        config.dry_run = true;
    }

    Ok(config)
}

/// Build the controller and run it until it stops.
async fn run(cli: Cli) -> Result<ShutdownReason, AppError> {
    let config = load_config(&cli)?;
    let job = JobId::from_spec(cli.job.as_deref().unwrap_or_default()).map_err(ConfigError::from)?;
    info!("Monitoring job {}", job);

    let controller = ControllerBuilder::new(config).build(job)?;
    controller.register(Arc::new(LoggingHandler)).await;
    info!("Loaded {} schedule rule(s)", controller.rule_count());

    // Ctrl+C stops the shared state; in-flight commands finish first.
    let state = controller.state().clone();
    let events = controller.events().clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted");
            if state.stop(ShutdownReason::Interrupted).await {
                events
                    .emit(Event::shutdown_requested(ShutdownReason::Interrupted))
                    .await;
            }
        }
    });

    info!("Press Ctrl+C to stop");
    Ok(controller.run().await?)
}
