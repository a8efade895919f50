//! Error types for configuration I/O.

/// Result type alias for configuration I/O.
pub type Result<T> = std::result::Result<T, IoError>;

/// Errors raised while loading or saving the configuration files.
#[derive(Debug, thiserror::Error)]
pub enum IoError {
    /// Generic I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// File exceeds the size limit
    #[error("File too large: {size} bytes (limit {limit})")]
    FileTooLarge {
        /// Actual file size in bytes
        size: u64,
        /// Configured limit in bytes
        limit: u64,
    },
}
