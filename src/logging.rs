//! Logging setup
//!
//! The binary installs a console subscriber once at startup. A run given a
//! log file gets its own subscriber for the duration of that run only, so
//! concurrent runs in one process never share a destination.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use tracing::{Level, Subscriber};

use crate::error::{BackupError, Result};

/// Install the process-wide console subscriber
///
/// # Arguments
/// * `level` - Maximum level printed
/// * `timestamps` - Prefix lines with a timestamp
pub fn init_console(level: Level, timestamps: bool) {
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr);

    if timestamps {
        subscriber.init();
    } else {
        subscriber.without_time().init();
    }
}

/// Build a subscriber appending plain lines to `path`
///
/// The file is created when missing.
pub fn file_subscriber(path: &Path, level: Level) -> Result<impl Subscriber + Send + Sync + 'static> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| BackupError::sink(path, e))?;

    Ok(tracing_subscriber::fmt()
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(false)
        .with_max_level(level)
        .finish())
}
