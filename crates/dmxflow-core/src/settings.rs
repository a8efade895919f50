//! Application settings persisted in `settings.json`
//!
//! Settings cover the pieces that survive restarts but are not part of the
//! show itself: broker connection, default senders, playback defaults, the
//! follower map, retransmission and logging.

use serde::{Deserialize, Serialize};

use crate::follower::FollowerMap;
use crate::logging::LogConfig;

/// MQTT broker connection parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MqttSettings {
    /// Broker URL, `mqtt://host[:port]`
    pub url: String,
    /// Client identifier presented to the broker
    #[serde(default = "default_client_id")]
    pub client_id: String,
    /// Optional broker username
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Optional broker password
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Keepalive interval in seconds
    #[serde(default = "default_keepalive")]
    pub keepalive_seconds: u64,
}

fn default_client_id() -> String {
    "dmxflow".to_string()
}

fn default_keepalive() -> u64 {
    60
}

impl Default for MqttSettings {
    fn default() -> Self {
        Self {
            url: "mqtt://127.0.0.1".to_string(),
            client_id: default_client_id(),
            username: None,
            password: None,
            keepalive_seconds: default_keepalive(),
        }
    }
}

impl MqttSettings {
    /// Split the URL into host and port (default 1883)
    pub fn host_port(&self) -> (String, u16) {
        let trimmed = self.url.trim_start_matches("mqtt://");
        match trimmed.split_once(':') {
            Some((host, port)) => (
                host.to_string(),
                port.parse().unwrap_or(DEFAULT_MQTT_PORT),
            ),
            None => (trimmed.to_string(), DEFAULT_MQTT_PORT),
        }
    }
}

/// Standard MQTT port
pub const DEFAULT_MQTT_PORT: u16 = 1883;

/// Wire protocol of a DMX sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SenderProtocol {
    /// Art-Net 3 ArtDMX over UDP, default port 6454
    Artnet,
    /// E1.31 (streaming ACN) over UDP, default port 5568
    E131,
    /// Frame logger for dry runs; no network traffic
    Log,
}

/// One configured DMX output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SenderConfig {
    /// Unique sender name
    pub name: String,
    /// Wire protocol
    #[serde(rename = "type")]
    pub protocol: SenderProtocol,
    /// Unicast IPv4, broadcast address, or empty for the protocol default
    /// (E1.31 derives its multicast group from the universe)
    #[serde(default)]
    pub target: String,
    /// Universe/port-address on the wire
    pub universe: u16,
    /// Frames per second, clamped to 1..=60
    #[serde(default = "default_fps")]
    pub fps: u32,
    /// UDP port override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

fn default_fps() -> u32 {
    DEFAULT_FPS
}

/// Default frame rate for senders
pub const DEFAULT_FPS: u32 = 40;

impl SenderConfig {
    /// fps clamped into the legal band
    pub fn effective_fps(&self) -> u32 {
        self.fps.clamp(1, 60)
    }

    /// Check name, universe and fps ranges
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("sender name cannot be empty".to_string());
        }
        match self.protocol {
            SenderProtocol::Artnet => {
                if self.universe > 32767 {
                    return Err(format!(
                        "Art-Net universe {} out of range (0-32767)",
                        self.universe
                    ));
                }
            }
            SenderProtocol::E131 => {
                if self.universe == 0 || self.universe > 63999 {
                    return Err(format!(
                        "E1.31 universe {} out of range (1-63999)",
                        self.universe
                    ));
                }
            }
            SenderProtocol::Log => {}
        }
        Ok(())
    }
}

/// Periodic full-universe retransmission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetransmitSettings {
    /// Whether the retransmit loop runs
    pub enabled: bool,
    /// Seconds between forced frames
    #[serde(default = "default_retransmit_interval")]
    pub interval_seconds: u64,
}

fn default_retransmit_interval() -> u64 {
    5
}

impl Default for RetransmitSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_seconds: default_retransmit_interval(),
        }
    }
}

/// Playback defaults applied when a command omits them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackDefaults {
    /// Scene transition when the play command gives none, in seconds
    #[serde(default)]
    pub transition_seconds: f64,
    /// Step duration when a sequence step gives none, in milliseconds
    #[serde(default = "default_step_duration")]
    pub step_duration_ms: u64,
}

fn default_step_duration() -> u64 {
    1000
}

impl Default for PlaybackDefaults {
    fn default() -> Self {
        Self {
            transition_seconds: 0.0,
            step_duration_ms: default_step_duration(),
        }
    }
}

/// HTTP server binding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebSettings {
    /// Bind address
    #[serde(default = "default_host")]
    pub host: String,
    /// Bind port
    #[serde(default = "default_web_port")]
    pub port: u16,
    /// Attach a permissive CORS layer
    #[serde(default = "default_true")]
    pub enable_cors: bool,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_web_port() -> u16 {
    5000
}

fn default_true() -> bool {
    true
}

impl Default for WebSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_web_port(),
            enable_cors: default_true(),
        }
    }
}

/// Everything `settings.json` holds
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Broker connection
    #[serde(default)]
    pub mqtt: MqttSettings,
    /// Senders created at startup
    #[serde(default)]
    pub senders: Vec<SenderConfig>,
    /// Playback defaults
    #[serde(default)]
    pub playback: PlaybackDefaults,
    /// Follower channel map
    #[serde(default)]
    pub followers: FollowerMap,
    /// Periodic retransmission
    #[serde(default)]
    pub retransmit: RetransmitSettings,
    /// REST server binding
    #[serde(default)]
    pub web: WebSettings,
    /// Log output
    #[serde(default)]
    pub logging: LogConfig,
    /// Expose raw MQTT channel updates to the frontend poll endpoint
    #[serde(default = "default_true")]
    pub frontend_mqtt_passthrough: bool,
}

impl Settings {
    /// The engine tick rate: the slowest sender's fps clamped into 25..=60 Hz
    pub fn engine_tick_hz(&self) -> u32 {
        self.senders
            .iter()
            .map(|s| s.effective_fps())
            .min()
            .unwrap_or(DEFAULT_FPS)
            .clamp(25, 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mqtt_url_parsing() {
        let mut mqtt = MqttSettings::default();
        mqtt.url = "mqtt://broker.local:1884".to_string();
        assert_eq!(mqtt.host_port(), ("broker.local".to_string(), 1884));

        mqtt.url = "mqtt://10.0.0.2".to_string();
        assert_eq!(mqtt.host_port(), ("10.0.0.2".to_string(), 1883));
    }

    #[test]
    fn test_sender_validation() {
        let mut config = SenderConfig {
            name: "main".to_string(),
            protocol: SenderProtocol::E131,
            target: String::new(),
            universe: 1,
            fps: 40,
            port: None,
        };
        assert!(config.validate().is_ok());

        config.universe = 0;
        assert!(config.validate().is_err());

        config.protocol = SenderProtocol::Artnet;
        config.universe = 40000;
        assert!(config.validate().is_err());

        config.universe = 0;
        assert!(config.validate().is_ok());

        config.name = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_fps_clamp() {
        let mut config = SenderConfig {
            name: "x".to_string(),
            protocol: SenderProtocol::Log,
            target: String::new(),
            universe: 1,
            fps: 500,
            port: None,
        };
        assert_eq!(config.effective_fps(), 60);
        config.fps = 0;
        assert_eq!(config.effective_fps(), 1);
    }

    #[test]
    fn test_engine_tick_follows_slowest_sender() {
        let mut settings = Settings::default();
        assert_eq!(settings.engine_tick_hz(), 40);

        settings.senders.push(SenderConfig {
            name: "slow".to_string(),
            protocol: SenderProtocol::E131,
            target: String::new(),
            universe: 1,
            fps: 10,
            port: None,
        });
        // clamped to the 25 Hz floor
        assert_eq!(settings.engine_tick_hz(), 25);

        settings.senders.push(SenderConfig {
            name: "fast".to_string(),
            protocol: SenderProtocol::Artnet,
            target: "255.255.255.255".to_string(),
            universe: 0,
            fps: 44,
            port: None,
        });
        assert_eq!(settings.engine_tick_hz(), 25);
    }

    #[test]
    fn test_settings_roundtrip() {
        let settings = Settings::default();
        let json = serde_json::to_string_pretty(&settings).unwrap();
        let back: Settings = serde_json::from_str(&json).unwrap();
        assert_eq!(settings, back);
    }
}
