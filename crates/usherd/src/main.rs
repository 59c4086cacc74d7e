//! usherd - The usher background service
//!
//! This is the main entry point for the usherd service.
//! It wires together all the components:
//! - Configuration loading
//! - Scheduler backend (HTTP, SQLite, or in-memory)
//! - Change record intake and normalization
//! - Partitioned dispatch into the reconciliation core

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;
use usher_cdc::{Normalized, Normalizer, RawRecord, RecordReader, RecordSource};
use usher_config::{load_config, SchedulerBackend, Settings};
use usher_core::{DerivationOptions, Dispatcher, PartitionedDispatcher, Reconciler};
use usher_scheduler_api::{ExternalScheduler, MemoryScheduler};
use usher_scheduler_http::{HttpScheduler, HttpSchedulerConfig};
use usher_store::SqliteScheduler;
use usher_util::{default_config_path, SystemClock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

/// usherd - Keeps external schedules in step with session change records
#[derive(Parser, Debug)]
#[command(name = "usherd")]
#[command(about = "Keeps external schedules in step with session change records", long_about = None)]
struct Args {
    /// Configuration file path (default: ~/.config/usher/config.toml if present)
    #[arg(short, long, env = "USHER_CONFIG")]
    config: Option<PathBuf>,

    /// Change record input: NDJSON file path, or "-" for stdin
    #[arg(short, long, env = "USHER_INPUT")]
    input: Option<String>,

    /// Data directory override (or set USHER_DATA_DIR env var)
    #[arg(short, long, env = "USHER_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Log level (RUST_LOG takes precedence)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[derive(Debug, Default)]
struct IntakeCounts {
    records: u64,
    submitted: u64,
    ignored: u64,
    malformed: u64,
}

/// Main service state
struct Service {
    normalizer: Normalizer,
    intake: PartitionedDispatcher,
    source: RecordSource,
}

impl Service {
    async fn new(args: &Args) -> Result<Self> {
        let settings = load_settings(args.config.as_deref())?;

        let data_dir = args
            .data_dir
            .clone()
            .unwrap_or_else(|| settings.service.data_dir.clone());

        let input = args
            .input
            .clone()
            .unwrap_or_else(|| settings.service.input.clone());
        let source = RecordSource::parse(&input);

        let scheduler = build_scheduler(&settings, &data_dir)?;
        info!(
            backend = scheduler.backend(),
            target = %settings.scheduler.target,
            "Scheduler backend initialized"
        );

        let clock = Arc::new(SystemClock);
        let reconciler = Reconciler::new(scheduler, clock.clone(), settings.scheduler.target.clone())
            .with_retry(settings.reconciler.retry.clone())
            .with_call_timeout(settings.reconciler.call_timeout);

        let options = DerivationOptions {
            rederive_sale_reminder: settings.derivation.rederive_sale_reminder,
        };

        let intake = PartitionedDispatcher::new(
            Dispatcher::new(reconciler, options),
            settings.intake.workers,
            settings.intake.queue_depth,
        );

        Ok(Self {
            normalizer: Normalizer::new(settings.intake.timestamp_unit, clock),
            intake,
            source,
        })
    }

    async fn run(self) -> Result<()> {
        let mut reader = RecordReader::open(&self.source)
            .await
            .with_context(|| format!("Failed to open input {}", self.source))?;

        let mut sigterm =
            signal(SignalKind::terminate()).context("Failed to create SIGTERM handler")?;
        let mut sigint =
            signal(SignalKind::interrupt()).context("Failed to create SIGINT handler")?;

        let mut counts = IntakeCounts::default();

        info!(input = %self.source, "Service running");

        loop {
            tokio::select! {
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, draining and shutting down");
                    break;
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT, draining and shutting down");
                    break;
                }

                next = reader.next_record() => match next {
                    Ok(Some(record)) => self.ingest(record, &mut counts).await,
                    Ok(None) => {
                        info!(lines = reader.lines_read(), "End of input");
                        break;
                    }
                    // Only IO failures end up here; undecodable lines are records
                    Err(e) => {
                        error!(error = %e, "Failed to read input");
                        break;
                    }
                }
            }
        }

        let stats = self.intake.shutdown().await;

        info!(
            records = counts.records,
            submitted = counts.submitted,
            ignored = counts.ignored,
            malformed = counts.malformed,
            applied = stats.intents_applied,
            failed = stats.intents_failed,
            "Service shutdown complete"
        );

        Ok(())
    }

    async fn ingest(&self, record: RawRecord, counts: &mut IntakeCounts) {
        counts.records += 1;

        match self.normalizer.normalize_bytes(&record.bytes) {
            Ok(Normalized::Change(change)) => {
                if let Err(e) = self.intake.submit(change).await {
                    error!(line = record.line, error = %e, "Failed to queue change");
                } else {
                    counts.submitted += 1;
                }
            }
            Ok(Normalized::Ignored(reason)) => {
                counts.ignored += 1;
                debug!(line = record.line, reason = %reason, "Ignoring record");
            }
            Err(e) => {
                counts.malformed += 1;
                warn!(line = record.line, error = %e, "Skipping malformed change record");
                debug!(line = record.line, raw = %record.text(), "Malformed record contents");
            }
        }
    }
}

/// Load settings from an explicit path, the default path if present, or built-in defaults
fn load_settings(explicit: Option<&Path>) -> Result<Settings> {
    let (path, required) = match explicit {
        Some(path) => (path.to_path_buf(), true),
        None => (default_config_path(), false),
    };

    if !required && !path.exists() {
        info!(
            config_path = %path.display(),
            "No configuration file found, using defaults"
        );
        return Ok(Settings::default());
    }

    let settings = load_config(&path)
        .with_context(|| format!("Failed to load config from {:?}", path))?;

    info!(
        config_path = %path.display(),
        backend = %settings.scheduler.backend,
        workers = settings.intake.workers,
        "Configuration loaded"
    );

    Ok(settings)
}

fn build_scheduler(settings: &Settings, data_dir: &Path) -> Result<Arc<dyn ExternalScheduler>> {
    let scheduler: Arc<dyn ExternalScheduler> = match settings.scheduler.backend {
        SchedulerBackend::Http => {
            let base_url = settings
                .scheduler
                .base_url
                .clone()
                .context("scheduler.base_url is required for the http backend")?;

            let mut config = HttpSchedulerConfig::new(base_url)
                .with_request_timeout(settings.reconciler.call_timeout);
            match settings.scheduler.auth_token() {
                Some(token) => config = config.with_auth_token(token),
                None => {
                    if let Some(var) = &settings.scheduler.auth_token_env {
                        warn!(env = %var, "Scheduler auth token variable is unset");
                    }
                }
            }

            Arc::new(HttpScheduler::new(config).context("Failed to create HTTP scheduler")?)
        }
        SchedulerBackend::Sqlite => {
            std::fs::create_dir_all(data_dir)
                .with_context(|| format!("Failed to create data directory {:?}", data_dir))?;

            let db_path = settings.scheduler.database_path(data_dir);
            let store = SqliteScheduler::open(&db_path)
                .with_context(|| format!("Failed to open database {:?}", db_path))?;
            info!(db_path = %db_path.display(), "Schedule store initialized");
            Arc::new(store)
        }
        SchedulerBackend::Memory => {
            warn!("Using the in-memory scheduler; schedules are lost on exit");
            Arc::new(MemoryScheduler::new())
        }
    };

    Ok(scheduler)
}

fn init_logging(args: &Args) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    match args.log_format {
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args);

    info!(version = env!("CARGO_PKG_VERSION"), "usherd starting");

    let service = Service::new(&args).await?;
    service.run().await
}
