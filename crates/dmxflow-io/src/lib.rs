//! DmxFlow I/O - configuration persistence
//!
//! Loads and saves the two JSON files that make up a DmxFlow installation:
//! `settings.json` and `config.json` (the show file). The in-memory types
//! live in `dmxflow-core`; this crate only owns the file handling.

#![warn(missing_docs)]

/// Error types
pub mod error;
/// Configuration directory handling
pub mod store;

pub use error::{IoError, Result};
pub use store::{ConfigStore, MAX_CONFIG_FILE_SIZE};
