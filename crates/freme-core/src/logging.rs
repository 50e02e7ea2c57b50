//! Tracing subscriber setup.
//!
//! Filter comes from `FREME_LOG` (same syntax as `RUST_LOG`), defaulting to
//! `warn`, or `debug` for freme crates when verbose. Output goes to stderr,
//! or to a daily-rolling file under `$FREME_HOME/logs` when
//! `log_to_file` is set.

use anyhow::{Result, anyhow};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use crate::config::{Config, paths};

const LOG_ENV: &str = "FREME_LOG";
const LOG_FILE_PREFIX: &str = "freme.log";

/// Keeps the background log writer alive; drop it at process exit.
#[derive(Debug)]
#[must_use]
pub struct LogGuard {
    _worker: Option<WorkerGuard>,
}

fn filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("warn,freme=debug,freme_core=debug")
        } else {
            EnvFilter::new("warn")
        }
    })
}

/// Installs the global subscriber.
///
/// # Errors
/// Returns an error if a global subscriber is already installed or the log
/// directory cannot be created.
pub fn init(config: &Config, verbose: bool) -> Result<LogGuard> {
    if config.log_to_file {
        let dir = paths::logs_dir();
        std::fs::create_dir_all(&dir)
            .map_err(|err| anyhow!("create log directory {}: {err}", dir.display()))?;
        let appender = tracing_appender::rolling::daily(&dir, LOG_FILE_PREFIX);
        let (writer, worker) = tracing_appender::non_blocking(appender);
        tracing_subscriber::fmt()
            .with_env_filter(filter(verbose))
            .with_ansi(false)
            .with_writer(writer)
            .try_init()
            .map_err(|err| anyhow!("install log subscriber: {err}"))?;
        return Ok(LogGuard {
            _worker: Some(worker),
        });
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter(verbose))
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow!("install log subscriber: {err}"))?;
    Ok(LogGuard { _worker: None })
}
