use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{Local, NaiveDate};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::error::{ExtratoError, Result};

/// Monthly log file, e.g. `logs/extrato_202403.log`.
pub fn log_file(log_dir: &Path, today: NaiveDate) -> PathBuf {
    log_dir.join(format!("extrato_{}.log", today.format("%Y%m")))
}

/// Console on stderr (`RUST_LOG`, default `info`) plus an append-only
/// debug-level file under `log_dir`.
pub fn init(log_dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(log_dir)?;
    let path = log_file(log_dir, Local::now().date_naive());
    let file = OpenOptions::new().create(true).append(true).open(&path)?;

    let console_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let console = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .with_filter(console_filter);
    let logfile = fmt::layer()
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(false)
        .with_filter(LevelFilter::DEBUG);

    tracing_subscriber::registry()
        .with(console)
        .with(logfile)
        .try_init()
        .map_err(|e| ExtratoError::Other(format!("Failed to install logger: {e}")))?;
    Ok(path)
}

/// Console only, for when the data directory is not writable.
pub fn init_console() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false).compact())
        .with(filter)
        .try_init();
}
