//! Logging configuration
//!
//! The binary turns this into a `tracing-subscriber` registry; the struct
//! lives here so it can be persisted alongside the other settings.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Log output configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogConfig {
    /// Default level directive: error, warn, info, debug or trace
    #[serde(default = "default_level")]
    pub level: String,
    /// Log to stderr
    #[serde(default = "default_true")]
    pub console_output: bool,
    /// Also write a log file
    #[serde(default)]
    pub file_output: bool,
    /// Directory for log files
    #[serde(default = "default_directory")]
    pub directory: PathBuf,
}

fn default_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_directory() -> PathBuf {
    PathBuf::from("logs")
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            console_output: true,
            file_output: false,
            directory: default_directory(),
        }
    }
}

impl LogConfig {
    /// Parse the configured level, falling back to `info`
    pub fn parse_level(&self) -> tracing::Level {
        self.level.parse().unwrap_or(tracing::Level::INFO)
    }

    /// Path of the current log file
    pub fn current_log_path(&self) -> PathBuf {
        self.directory.join("dmxflow.log")
    }

    /// Create the log directory if file output is enabled
    pub fn ensure_log_directory(&self) -> std::io::Result<()> {
        if self.file_output {
            std::fs::create_dir_all(&self.directory)?;
        }
        Ok(())
    }
}
