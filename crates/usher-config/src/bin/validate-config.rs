//! Config validation CLI tool
//!
//! Validates a usherd configuration file and reports any errors.

use std::path::PathBuf;
use std::process::ExitCode;
use usher_config::{ConfigError, SchedulerBackend, CURRENT_CONFIG_VERSION};
use usher_util::default_config_path;

fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();

    let config_path = match args.get(1) {
        Some(path) => PathBuf::from(path),
        None => {
            let default_path = default_config_path();
            eprintln!("Usage: validate-config [config-file]");
            eprintln!();
            eprintln!("Validates a usherd configuration file.");
            eprintln!();
            eprintln!("If no path is provided, uses: {}", default_path.display());
            eprintln!();
            eprintln!("Example:");
            eprintln!("  validate-config {}", default_path.display());
            eprintln!("  validate-config config.example.toml");
            return ExitCode::from(2);
        }
    };

    if !config_path.exists() {
        eprintln!("Error: Configuration file not found: {}", config_path.display());
        return ExitCode::from(1);
    }

    match usher_config::load_config(&config_path) {
        Ok(settings) => {
            println!("✓ Configuration is valid");
            println!();
            println!("Summary:");
            println!("  Config version: {}", CURRENT_CONFIG_VERSION);
            println!("  Input: {}", settings.service.input);
            println!("  Data dir: {}", settings.service.data_dir.display());
            println!(
                "  Intake: {} workers, queue depth {}, {} timestamps",
                settings.intake.workers, settings.intake.queue_depth, settings.intake.timestamp_unit
            );
            println!(
                "  Re-derive SALE_REMINDER on update: {}",
                settings.derivation.rederive_sale_reminder
            );

            let scheduler = &settings.scheduler;
            let backend_detail = match scheduler.backend {
                SchedulerBackend::Http => {
                    format!("http ({})", scheduler.base_url.as_deref().unwrap_or("?"))
                }
                SchedulerBackend::Sqlite => format!(
                    "sqlite ({})",
                    scheduler
                        .database_path(&settings.service.data_dir)
                        .display()
                ),
                SchedulerBackend::Memory => "memory".to_string(),
            };
            println!("  Scheduler: {}", backend_detail);
            println!("  Target: {}", scheduler.target);
            if let Some(var) = &scheduler.auth_token_env {
                let state = if scheduler.auth_token().is_some() {
                    "set"
                } else {
                    "not set"
                };
                println!("  Auth token env: {} ({})", var, state);
            }

            let retry = &settings.reconciler.retry;
            println!(
                "  Reconciler: timeout {}ms, {} attempts, backoff {}ms..{}ms x{}",
                settings.reconciler.call_timeout.as_millis(),
                retry.max_attempts,
                retry.initial_interval.as_millis(),
                retry.max_interval.as_millis(),
                retry.backoff_coefficient
            );

            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("✗ Configuration validation failed");
            eprintln!();
            match &e {
                ConfigError::ReadError(io_err) => {
                    eprintln!("Failed to read file: {}", io_err);
                }
                ConfigError::ParseError(parse_err) => {
                    eprintln!("TOML parse error:");
                    eprintln!("  {}", parse_err);
                }
                ConfigError::ValidationFailed { errors } => {
                    eprintln!("Validation errors ({}):", errors.len());
                    for err in errors {
                        eprintln!("  - {}", err);
                    }
                }
                ConfigError::UnsupportedVersion(ver) => {
                    eprintln!(
                        "Unsupported config version: {} (expected {})",
                        ver, CURRENT_CONFIG_VERSION
                    );
                }
            }
            ExitCode::from(1)
        }
    }
}
