//! Logging initialization
//!
//! Console output goes to stderr; an optional non-blocking file layer writes
//! to the configured log directory. `RUST_LOG` wins over the configured
//! level, and the CLI verbosity flags win over both.

use anyhow::{Context, Result};
use std::fs::File;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    filter::EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt, Layer,
};

use dmxflow_core::LogConfig;

/// Handle to keep the file-logging worker thread alive
pub struct LogGuard {
    _guard: WorkerGuard,
}

/// Initialize the logging system
pub fn init(config: &LogConfig, verbose: u8, quiet: bool) -> Result<Option<LogGuard>> {
    config
        .ensure_log_directory()
        .context("Failed to create log directory")?;

    let default_level = if quiet {
        "warn".to_string()
    } else {
        match verbose {
            0 => config.level.clone(),
            1 => "debug".to_string(),
            _ => "trace".to_string(),
        }
    };
    // RUST_LOG env var takes precedence over the configured level
    let build_filter = || {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(default_level.clone()))
    };

    let console_layer = if config.console_output {
        Some(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_filter(build_filter()),
        )
    } else {
        None
    };

    let (file_layer, guard) = if config.file_output {
        let log_path = config.current_log_path();
        let file = File::create(&log_path)
            .with_context(|| format!("Failed to create log file: {log_path:?}"))?;
        let (non_blocking, worker_guard) = tracing_appender::non_blocking(file);

        let layer = fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_filter(build_filter());

        (
            Some(layer),
            Some(LogGuard {
                _guard: worker_guard,
            }),
        )
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .init();

    tracing::info!(level = %default_level, "Logging initialized");
    Ok(guard)
}
