// SPDX-License-Identifier: Apache-2.0

//! Daemon settings.
//!
//! Everything is optional and read from the environment once at startup. The
//! daemon is ready to serve with no configuration at all.

use std::path::PathBuf;
use std::time::Duration;

const ENV_LOG: &str = "DATAWARDEN_LOG";
const ENV_LOG_FALLBACK: &str = "RUST_LOG";
const ENV_LOG_DIR: &str = "DATAWARDEN_LOG_DIR";
const ENV_LOG_FORMAT: &str = "DATAWARDEN_LOG_FORMAT";
const ENV_SHUTDOWN_GRACE_MS: &str = "DATAWARDEN_SHUTDOWN_GRACE_MS";

pub const DEFAULT_LOG_FILTER: &str = "datawarden=info,datawarden_lib=info";
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_millis(5000);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonConfig {
    /// `tracing_subscriber::EnvFilter` directives
    pub log_filter: String,
    pub log_format: LogFormat,
    /// Enables the daily rolling JSON log file when set
    pub log_dir: Option<PathBuf>,
    /// How long in-flight requests may run once input has ended
    pub shutdown_grace: Duration,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            log_filter: DEFAULT_LOG_FILTER.to_string(),
            log_format: LogFormat::Text,
            log_dir: None,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
        }
    }
}

impl DaemonConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup. Unparseable values fall back to
    /// defaults; logging is not up yet, so they are reported on stderr.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let log_filter = non_empty(ENV_LOG)
            .or_else(|| non_empty(ENV_LOG_FALLBACK))
            .unwrap_or(defaults.log_filter);

        let log_format = match non_empty(ENV_LOG_FORMAT) {
            None => defaults.log_format,
            Some(v) if v.eq_ignore_ascii_case("json") => LogFormat::Json,
            Some(v) if v.eq_ignore_ascii_case("text") => LogFormat::Text,
            Some(v) => {
                eprintln!("datawarden: ignoring {ENV_LOG_FORMAT}={v:?}, expected text or json");
                defaults.log_format
            }
        };

        let log_dir = non_empty(ENV_LOG_DIR).map(PathBuf::from);

        let shutdown_grace = match non_empty(ENV_SHUTDOWN_GRACE_MS) {
            None => defaults.shutdown_grace,
            Some(v) => match v.trim().parse::<u64>() {
                Ok(ms) => Duration::from_millis(ms),
                Err(_) => {
                    eprintln!("datawarden: ignoring {ENV_SHUTDOWN_GRACE_MS}={v:?}, expected milliseconds");
                    defaults.shutdown_grace
                }
            },
        };

        Self {
            log_filter,
            log_format,
            log_dir,
            shutdown_grace,
        }
    }
}
