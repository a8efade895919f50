//! DmxFlow Core - Domain Model and Playback Engine
//!
//! This crate contains the heart of the DMX show runtime:
//! - The 512-channel universe buffer with follower mirroring
//! - Scenes, sequences and programmable scenes
//! - The sandboxed expression VM driving programmable scenes
//! - The playback engine task that time-steps everything
//! - The inactivity fallback watchdog
//!
//! Wire protocols, MQTT/HTTP ingest and persistence live in the sibling
//! crates; nothing in here touches the network or the filesystem.

#![warn(missing_docs)]

use serde::{Deserialize, Serialize};

pub mod engine;
/// Error types
pub mod error;
/// Sandboxed channel expressions
pub mod expr;
/// Follower channel mapping
pub mod follower;
/// Logging configuration
pub mod logging;
/// Application settings
pub mod settings;
/// Show artifacts
pub mod show;
/// The shared universe buffer
pub mod universe;

pub use engine::{
    ActivityTracker, EngineConfig, EngineHandle, FallbackWatchdog, PlaybackEngine,
    PlaybackStatus,
};
pub use error::{CoreError, Result};
pub use expr::{Expr, ExprError};
pub use follower::FollowerMap;
pub use logging::LogConfig;
pub use settings::{
    MqttSettings, PlaybackDefaults, RetransmitSettings, SenderConfig, SenderProtocol,
    Settings, WebSettings, DEFAULT_FPS,
};
pub use show::{
    AutostartConfig, FallbackConfig, FallbackSlot, PlaybackKind, ProgrammableScene, Scene,
    Sequence, SequenceStep, ShowState,
};
pub use universe::{UniverseBuffer, UniverseSnapshot, UNIVERSE_SIZE};

/// The most recent externally-originated channel write, kept so a UI can
/// mirror changes made over MQTT.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelUpdate {
    /// 1-based channel number
    pub channel: u16,
    /// Written value
    pub value: u8,
    /// Monotonic update counter, so pollers can detect new writes
    pub seq: u64,
}
