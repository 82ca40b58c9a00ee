// SPDX-License-Identifier: Apache-2.0

//! Logging and observability helpers.
//!
//! stdout carries the protocol, so every log line goes to stderr and,
//! optionally, to a daily rolling JSON file.

use std::fs;
use std::path::Path;
use std::time::{Duration, SystemTime};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::{DaemonConfig, LogFormat, DEFAULT_LOG_FILTER};

const LOG_FILE_PREFIX: &str = "datawarden.log";
const LOG_RETENTION: Duration = Duration::from_secs(14 * 24 * 60 * 60);

/// Installs the global subscriber and the panic hook.
///
/// Keep the returned guard alive for the life of the process; dropping it
/// flushes and stops the file writer.
pub fn init_tracing(config: &DaemonConfig) -> Option<WorkerGuard> {
    let env_filter = EnvFilter::try_new(&config.log_filter).unwrap_or_else(|e| {
        eprintln!("datawarden: invalid log filter {:?}: {e}", config.log_filter);
        EnvFilter::new(DEFAULT_LOG_FILTER)
    });

    let stderr_layer = match config.log_format {
        LogFormat::Text => fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(false)
            .with_target(true)
            .boxed(),
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_current_span(true)
            .with_span_list(false)
            .boxed(),
    };

    let (file_layer, guard) = match config.log_dir.as_deref() {
        Some(log_dir) => match prepare_log_dir(log_dir) {
            Ok(()) => {
                let appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX);
                let (writer, guard) = tracing_appender::non_blocking(appender);
                let layer = fmt::layer()
                    .json()
                    .with_writer(writer)
                    .with_thread_ids(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_current_span(true)
                    .with_span_list(true)
                    .with_ansi(false)
                    .with_span_events(FmtSpan::CLOSE);
                (Some(layer), Some(guard))
            }
            Err(e) => {
                eprintln!("datawarden: log directory {} unusable: {e}", log_dir.display());
                (None, None)
            }
        },
        None => (None, None),
    };

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init();

    install_panic_hook();

    match config.log_dir.as_deref() {
        Some(dir) if guard.is_some() => {
            tracing::info!(log_dir = %dir.display(), "Tracing initialized")
        }
        _ => tracing::info!("Tracing initialized"),
    }
    guard
}

fn prepare_log_dir(log_dir: &Path) -> std::io::Result<()> {
    fs::create_dir_all(log_dir)?;
    match cleanup_old_logs(log_dir, LOG_RETENTION, SystemTime::now()) {
        Ok(0) => {}
        Ok(removed) => eprintln!("datawarden: removed {removed} expired log file(s)"),
        Err(e) => eprintln!("datawarden: failed to clean up old logs: {e}"),
    }
    Ok(())
}

fn install_panic_hook() {
    let previous_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        let payload = panic_info.payload();
        let location = panic_info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "unknown".to_string());

        let msg = if let Some(s) = payload.downcast_ref::<&str>() {
            format!("PANIC: {}", s)
        } else if let Some(s) = payload.downcast_ref::<String>() {
            format!("PANIC: {}", s)
        } else {
            "PANIC: unknown cause".to_string()
        };

        tracing::error!(target: "panic", location = %location, message = %msg, "Panic");

        // Default behavior (the stderr report) still runs
        previous_hook(panic_info);
    }));
}

/// Removes rolled log files last modified more than `retention` before `now`.
/// Returns how many were removed.
fn cleanup_old_logs(log_dir: &Path, retention: Duration, now: SystemTime) -> std::io::Result<usize> {
    let mut removed = 0;

    for entry in fs::read_dir(log_dir)? {
        let path = entry?.path();

        let is_log = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.starts_with(LOG_FILE_PREFIX));
        if !is_log || !path.is_file() {
            continue;
        }

        let expired = fs::metadata(&path)
            .and_then(|meta| meta.modified())
            .ok()
            .and_then(|modified| now.duration_since(modified).ok())
            .is_some_and(|age| age > retention);

        if expired {
            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(e) => eprintln!("datawarden: failed to remove old log file {:?}: {}", path, e),
            }
        }
    }

    Ok(removed)
}
