//! Tracing setup: a terminal layer plus a per-run log file.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::Result;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::DriverSettings;

const LOG_ENV: &str = "TEST_DRIVER_LOG";

static FILE_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// `TEST_DRIVER_LOG`, then `RUST_LOG`, then the settings file.
fn filter(settings: &DriverSettings, verbose: bool) -> EnvFilter {
    let fallback = if verbose { "debug" } else { settings.log_filter.as_str() };
    match std::env::var(LOG_ENV) {
        Ok(directive) => EnvFilter::try_new(&directive).unwrap_or_else(|err| {
            eprintln!("invalid {LOG_ENV} directive ({err}); using {fallback}");
            EnvFilter::new(fallback)
        }),
        Err(_) => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback)),
    }
}

/// `<run name>.log`, next to the config file.
pub fn log_file_for(run_name: &str) -> PathBuf {
    PathBuf::from(format!("{run_name}.log"))
}

/// Installs the global subscriber. With `log_file` set, every event is
/// also written there, without ANSI colors.
pub fn init(settings: &DriverSettings, verbose: bool, log_file: Option<&Path>) -> Result<()> {
    let terminal = if settings.log_json {
        fmt::layer()
            .with_target(false)
            .json()
            .with_writer(std::io::stderr)
            .boxed()
    } else {
        fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .boxed()
    };

    let file = match log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            std::fs::create_dir_all(dir)?;
            let file_name = path
                .file_name()
                .map(|n| n.to_os_string())
                .unwrap_or_else(|| "test-driver.log".into());
            let appender = tracing_appender::rolling::never(dir, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let _ = FILE_GUARD.set(guard);
            Some(
                fmt::layer()
                    .with_target(true)
                    .with_ansi(false)
                    .with_writer(writer)
                    .boxed(),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter(settings, verbose))
        .with(terminal)
        .with(file)
        .try_init()
        .ok();

    tracing::debug!(log_file = ?log_file, "tracing initialised");
    Ok(())
}
