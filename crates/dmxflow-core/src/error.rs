//! Error types for the core engine
use thiserror::Error;

use crate::expr::ExprError;

/// Core engine errors
#[derive(Error, Debug)]
pub enum CoreError {
    /// DMX channel outside 1..=512
    #[error("Invalid channel: {0} (must be 1-512)")]
    InvalidChannel(u16),

    /// Channel value outside 0..=255
    #[error("Invalid channel value: {0} (must be 0-255)")]
    InvalidValue(i64),

    /// Named scene does not exist
    #[error("Scene not found: {0}")]
    SceneNotFound(String),

    /// Named sequence does not exist
    #[error("Sequence not found: {0}")]
    SequenceNotFound(String),

    /// Named programmable scene does not exist
    #[error("Programmable scene not found: {0}")]
    ProgrammableNotFound(String),

    /// Expression failed to parse or validate
    #[error("Expression error: {0}")]
    Expr(#[from] ExprError),

    /// The engine task is gone and can no longer accept commands
    #[error("Playback engine unavailable")]
    EngineGone,

    /// Malformed playback artifact (bad step, empty sequence, ...)
    #[error("Invalid playback data: {0}")]
    InvalidPlayback(String),
}

/// Result type for core operations
pub type Result<T> = std::result::Result<T, CoreError>;
