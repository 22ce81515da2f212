use std::fs::{self, OpenOptions};
use std::path::PathBuf;

use anyhow::{Context, Result};
use env_logger::{Builder, Env, Target};

use crate::persist::cache_dir;

const LOG_FILE: &str = "league_feed.log";

/// Routes `log` output to a file so it stays off the terminal UI. `RUST_LOG`
/// overrides the default `info` filter. Returns the file path in use.
pub fn init_file_logger() -> Result<PathBuf> {
    let dir = cache_dir().unwrap_or_else(std::env::temp_dir);
    fs::create_dir_all(&dir).with_context(|| format!("create log dir {}", dir.display()))?;
    let path = dir.join(LOG_FILE);
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("open log file {}", path.display()))?;

    Builder::from_env(Env::default().default_filter_or("info"))
        .target(Target::Pipe(Box::new(file)))
        .format_timestamp_secs()
        .try_init()
        .context("logger already initialised")?;
    Ok(path)
}

/// Stderr logger for the command-line helpers.
pub fn init_stderr_logger() {
    let _ = Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp(None)
        .try_init();
}
