//! MQTT topic routing
//!
//! Maps the topic grammar onto typed commands:
//!
//! | Topic | Command |
//! |---|---|
//! | `dmx/set/channel/{n}` | set channel `n` to the integer payload |
//! | `dmx/scene/{name}` | play scene, payload = transition seconds or empty |
//! | `dmx/sender/status` | publish per-sender status |
//! | `dmx/sender/list` | publish sender names |
//! | `dmx/sender/blackout[/{name}]` | blackout all or one |
//! | `dmx/sender/remove/{name}` | remove a sender |
//! | `dmx/config/{show\|reload\|save}` | config lifecycle |
//! | `{sequence}` | play the sequence registered under that topic |
//!
//! Sequence topics are data-defined: the caller passes the set registered at
//! config load. Unknown topics route to `None`; malformed payloads are
//! errors so the caller can log them.

use std::collections::HashSet;

use crate::{error::ControlError, Result};

/// A parsed MQTT command
#[derive(Debug, Clone, PartialEq)]
pub enum MqttCommand {
    /// `dmx/set/channel/{n}`
    SetChannel { channel: u16, value: u8 },
    /// `dmx/scene/{name}`
    PlayScene {
        name: String,
        transition_seconds: Option<f64>,
    },
    /// A registered sequence topic
    PlaySequence { name: String },
    /// `dmx/sender/status`
    SenderStatus,
    /// `dmx/sender/list`
    SenderList,
    /// `dmx/sender/blackout[/{name}]`
    Blackout { sender: Option<String> },
    /// `dmx/sender/remove/{name}`
    RemoveSender { name: String },
    /// `dmx/config/show`
    ConfigShow,
    /// `dmx/config/reload`
    ConfigReload,
    /// `dmx/config/save`
    ConfigSave,
}

/// Route a topic/payload pair onto a command.
///
/// Returns `Ok(None)` for topics outside the surface.
pub fn route(
    topic: &str,
    payload: &str,
    sequence_topics: &HashSet<String>,
) -> Result<Option<MqttCommand>> {
    let parts: Vec<&str> = topic.split('/').collect();

    match parts.as_slice() {
        ["dmx", "set", "channel", channel] => {
            let channel: u16 = channel.parse().map_err(|_| {
                ControlError::InvalidInput(format!("invalid channel '{channel}'"))
            })?;
            if !(1..=512).contains(&channel) {
                return Err(ControlError::InvalidInput(format!(
                    "channel {channel} out of range (1-512)"
                )));
            }
            let value: i64 = payload.trim().parse().map_err(|_| {
                ControlError::InvalidInput(format!("invalid channel value '{payload}'"))
            })?;
            if !(0..=255).contains(&value) {
                return Err(ControlError::InvalidInput(format!(
                    "value {value} out of range (0-255)"
                )));
            }
            Ok(Some(MqttCommand::SetChannel {
                channel,
                value: value as u8,
            }))
        }

        ["dmx", "scene", name] => {
            let trimmed = payload.trim();
            let transition_seconds = if trimmed.is_empty() {
                None
            } else {
                let seconds: f64 = trimmed.parse().map_err(|_| {
                    ControlError::InvalidInput(format!("invalid transition time '{trimmed}'"))
                })?;
                if seconds < 0.0 {
                    return Err(ControlError::InvalidInput(
                        "transition time must be non-negative".to_string(),
                    ));
                }
                Some(seconds)
            };
            Ok(Some(MqttCommand::PlayScene {
                name: name.to_string(),
                transition_seconds,
            }))
        }

        ["dmx", "sender", "status"] => Ok(Some(MqttCommand::SenderStatus)),
        ["dmx", "sender", "list"] => Ok(Some(MqttCommand::SenderList)),
        ["dmx", "sender", "blackout"] => Ok(Some(MqttCommand::Blackout { sender: None })),
        ["dmx", "sender", "blackout", name] => Ok(Some(MqttCommand::Blackout {
            sender: Some(name.to_string()),
        })),
        ["dmx", "sender", "remove", name] => Ok(Some(MqttCommand::RemoveSender {
            name: name.to_string(),
        })),

        ["dmx", "config", "show"] => Ok(Some(MqttCommand::ConfigShow)),
        ["dmx", "config", "reload"] => Ok(Some(MqttCommand::ConfigReload)),
        ["dmx", "config", "save"] => Ok(Some(MqttCommand::ConfigSave)),

        _ => {
            if sequence_topics.contains(topic) {
                Ok(Some(MqttCommand::PlaySequence {
                    name: topic.to_string(),
                }))
            } else {
                Ok(None)
            }
        }
    }
}
