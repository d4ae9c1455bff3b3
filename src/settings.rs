//! Local paths used by the application: the log directory and log file.

use anyhow::{Context, Result};
use std::fs::{File, OpenOptions};
use std::path::PathBuf;

const LOG_FILE_NAME: &str = "m365report.log";

/// Get the path to the log directory.
pub fn log_directory() -> PathBuf {
    let base = dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(std::env::temp_dir);
    base.join("m365report").join("logs")
}

pub fn log_file_path() -> PathBuf {
    log_directory().join(LOG_FILE_NAME)
}

/// Initialize the log directory.
pub fn init_log_directory() -> Result<()> {
    let log_dir = log_directory();
    if !log_dir.exists() {
        std::fs::create_dir_all(&log_dir)
            .with_context(|| format!("Failed to create {}", log_dir.display()))?;
    }
    Ok(())
}

/// Open the log file for appending, creating the directory first.
pub fn open_log_file() -> Result<File> {
    init_log_directory()?;
    let path = log_file_path();
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("Failed to open {}", path.display()))
}
