//! Path utilities for the switchboard data directory

use std::path::PathBuf;
use std::sync::OnceLock;

/// Global storage for custom data directory path
static DATA_DIR: OnceLock<PathBuf> = OnceLock::new();

/// Initialize the data directory with an optional custom path.
/// Call early in main() before any other path function.
/// If custom_path is None, uses the default ~/.switchboard location.
pub fn init_data_dir(custom_path: Option<PathBuf>) {
    let path = custom_path.unwrap_or_else(default_data_dir);
    if DATA_DIR.set(path.clone()).is_err() {
        let existing = DATA_DIR
            .get()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "<unknown>".to_string());
        tracing::debug!(
            path = %path.display(),
            existing = %existing,
            "Data directory already initialized"
        );
    }
}

/// Get the default data directory path (~/.switchboard)
fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|h| h.join(".switchboard"))
        .unwrap_or_else(|| PathBuf::from(".switchboard"))
}

/// Get the base data directory.
/// Returns the custom path if set via init_data_dir(), otherwise ~/.switchboard
pub fn data_dir() -> PathBuf {
    DATA_DIR.get().cloned().unwrap_or_else(default_data_dir)
}

/// Get the logs directory (~/.switchboard/logs)
pub fn logs_dir() -> PathBuf {
    data_dir().join("logs")
}

/// Get the default log file path (~/.switchboard/logs/switchboard.log)
pub fn log_file_path() -> PathBuf {
    logs_dir().join("switchboard.log")
}

/// Get the config file path (~/.switchboard/config.toml)
pub fn config_path() -> PathBuf {
    data_dir().join("config.toml")
}
