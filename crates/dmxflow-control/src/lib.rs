//! DmxFlow Control - wire output and command ingest
//!
//! This crate connects the playback core to the outside world:
//! - **DMX**: Art-Net and sACN framers with a per-sender ticker fan-out
//! - **Retransmit**: periodic full-universe re-emission
//! - **MQTT**: broker connection, topic router, command execution
//! - **Web API**: axum REST surface for the browser console
//!
//! All dispatchers share one [`AppContext`] so both boundaries execute the
//! same engine operations and stamp the same activity clock.

#![allow(missing_docs)]

/// Shared dispatcher context
pub mod context;
/// DMX output (Art-Net, sACN, fan-out, retransmit)
pub mod dmx;
/// Error types
pub mod error;
/// MQTT ingest
pub mod mqtt;
/// REST API
pub mod web;

pub use context::AppContext;
pub use dmx::{ArtNetSender, DmxManager, E131Sender, LogSender, RetransmitLoop, SenderStatus};
pub use error::{ControlError, Result};
pub use mqtt::MqttService;
pub use web::WebServer;
