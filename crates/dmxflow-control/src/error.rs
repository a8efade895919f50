//! Error types for the control plane
use thiserror::Error;

/// Control plane errors
#[derive(Error, Debug)]
pub enum ControlError {
    /// DMX/Art-Net/sACN error
    #[error("DMX error: {0}")]
    Dmx(String),

    /// MQTT client or broker error
    #[error("MQTT error: {0}")]
    Mqtt(String),

    /// Web API or HTTP server error
    #[error("HTTP error: {0}")]
    Http(String),

    /// Rejected input at the boundary
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Named resource does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Name collision (e.g. a sender that already exists)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Transient frame send failure (EAGAIN, unreachable network); logged
    /// and counted, the sender's ticker keeps running
    #[error("Transient send error: {0}")]
    TransientSend(String),

    /// Fatal sender failure (socket closed); the sender is marked failed
    /// and its socket reopened with backoff
    #[error("Fatal send error: {0}")]
    FatalSend(String),

    /// Standard IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/Deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Error surfaced from the playback engine
    #[error(transparent)]
    Core(#[from] dmxflow_core::CoreError),

    /// Error surfaced from configuration persistence
    #[error(transparent)]
    Store(#[from] dmxflow_io::IoError),
}

impl ControlError {
    /// Classify a socket send failure.
    ///
    /// Closed-socket conditions are fatal and make the sender reopen with
    /// backoff; everything else (EAGAIN, unreachable networks, ...) is
    /// transient: logged, counted, and the ticker continues.
    pub fn classify_send(error: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match error.kind() {
            ErrorKind::NotConnected
            | ErrorKind::BrokenPipe
            | ErrorKind::ConnectionAborted
            | ErrorKind::ConnectionReset => Self::FatalSend(error.to_string()),
            _ => Self::TransientSend(error.to_string()),
        }
    }

    /// True when the sender must be marked failed and its socket reopened
    pub fn is_fatal_send(&self) -> bool {
        matches!(self, Self::FatalSend(_))
    }
}

/// Result type for control operations
pub type Result<T> = std::result::Result<T, ControlError>;
