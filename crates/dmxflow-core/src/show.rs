//! Show artifacts: scenes, sequences and programmable scenes
//!
//! These are the value types persisted in the show file and interpreted by
//! the playback engine. Channel arrays are 0-indexed in memory (index `i`
//! addresses channel `i + 1`); a `None` entry means "leave that channel
//! alone".

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::universe::UNIVERSE_SIZE;

/// A named static channel vector.
///
/// `channels[i]` targets channel `i + 1`; `None` entries are skipped on
/// playback so the current value carries forward.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    /// Channel values; may be shorter than 512
    pub channels: Vec<Option<u8>>,
    /// Default fade time in milliseconds when played without an explicit
    /// transition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fade_ms: Option<u64>,
    /// Free-form description for the editor UI
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl Scene {
    /// Validate length and produce the 1-based write batch
    pub fn to_writes(&self) -> Result<Vec<(u16, u8)>> {
        if self.channels.len() > UNIVERSE_SIZE {
            return Err(CoreError::InvalidChannel(self.channels.len() as u16));
        }
        Ok(self
            .channels
            .iter()
            .enumerate()
            .filter_map(|(i, v)| v.map(|value| (i as u16 + 1, value)))
            .collect())
    }
}

/// One step of a sequence: a scene reference or an inline channel map, held
/// for `duration_ms`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SequenceStep {
    /// Reference to a named scene
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scene: Option<String>,
    /// Inline channel map (1-based channel -> value), alternative to `scene`
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub dmx: BTreeMap<u16, u8>,
    /// How long the step holds, in milliseconds; `None` uses the configured
    /// default step duration, 0 means "one engine tick"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<u64>,
    /// Optional fade into this step, in milliseconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fade: Option<u64>,
}

impl SequenceStep {
    /// Validate the inline channel map
    pub fn validate(&self) -> Result<()> {
        for channel in self.dmx.keys() {
            if !(1..=UNIVERSE_SIZE as u16).contains(channel) {
                return Err(CoreError::InvalidChannel(*channel));
            }
        }
        Ok(())
    }
}

/// A named ordered list of steps
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Sequence {
    /// Ordered playback steps
    pub steps: Vec<SequenceStep>,
    /// Free-form description for the editor UI
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Restart at step 0 after the last step
    #[serde(default)]
    pub r#loop: bool,
}

/// A scene whose channel values are expressions over time.
///
/// Expressions see `t` (seconds since scene start) and `p` (percent of
/// `duration` elapsed, 0-100). They are compiled once when playback starts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProgrammableScene {
    /// Display name, also used as the lookup key
    pub name: String,
    /// Free-form description for the editor UI
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Cycle duration in milliseconds
    pub duration: u64,
    /// Reset `t` and `p` when the duration elapses
    #[serde(default)]
    pub r#loop: bool,
    /// 1-based channel -> expression text
    pub expressions: BTreeMap<u16, String>,
}

/// What kind of artifact a playback command targets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackKind {
    /// A static scene
    Scene,
    /// A stepped sequence
    Sequence,
    /// A programmable (expression-driven) scene
    Programmable,
}

/// One artifact to start at boot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutostartConfig {
    /// What kind of artifact to start
    pub kind: PlaybackKind,
    /// Name of the artifact
    pub name: String,
}

/// One fallback slot: after `delay_seconds` with no commands, play `target`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackSlot {
    /// Whether this slot is armed
    pub enabled: bool,
    /// Scene or sequence to apply
    pub target: String,
    /// Idle period before firing, in seconds
    pub delay_seconds: u64,
}

/// Inactivity fallback configuration.
///
/// Both slots may be armed; the one with the shorter delay fires first, and
/// the scene slot wins a tie.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FallbackConfig {
    /// Scene fallback slot
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scene: Option<FallbackSlot>,
    /// Sequence fallback slot
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<FallbackSlot>,
}

impl FallbackConfig {
    /// True when at least one slot is armed
    pub fn armed(&self) -> bool {
        self.scene.as_ref().map(|s| s.enabled).unwrap_or(false)
            || self.sequence.as_ref().map(|s| s.enabled).unwrap_or(false)
    }

    /// The armed slot that expires first; scene wins ties.
    pub fn next_to_fire(&self) -> Option<(PlaybackKind, &FallbackSlot)> {
        let scene = self
            .scene
            .as_ref()
            .filter(|s| s.enabled)
            .map(|s| (PlaybackKind::Scene, s));
        let sequence = self
            .sequence
            .as_ref()
            .filter(|s| s.enabled)
            .map(|s| (PlaybackKind::Sequence, s));
        match (scene, sequence) {
            (Some(sc), Some(sq)) => {
                if sq.1.delay_seconds < sc.1.delay_seconds {
                    Some(sq)
                } else {
                    Some(sc)
                }
            }
            (slot, None) | (None, slot) => slot,
        }
    }
}

/// Everything the show file holds: the artifact libraries plus fallback and
/// autostart wiring.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShowState {
    /// Static scenes by name
    #[serde(default)]
    pub scenes: BTreeMap<String, Scene>,
    /// Sequences by name; names double as their MQTT topics
    #[serde(default)]
    pub sequences: BTreeMap<String, Sequence>,
    /// Programmable scenes by name
    #[serde(default)]
    pub programmable_scenes: BTreeMap<String, ProgrammableScene>,
    /// Inactivity fallback
    #[serde(default)]
    pub fallback: FallbackConfig,
    /// Playback launched at boot
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autostart: Option<AutostartConfig>,
}

impl ShowState {
    /// Look up a scene
    pub fn scene(&self, name: &str) -> Result<&Scene> {
        self.scenes
            .get(name)
            .ok_or_else(|| CoreError::SceneNotFound(name.to_string()))
    }

    /// Look up a sequence
    pub fn sequence(&self, name: &str) -> Result<&Sequence> {
        self.sequences
            .get(name)
            .ok_or_else(|| CoreError::SequenceNotFound(name.to_string()))
    }

    /// Look up a programmable scene
    pub fn programmable(&self, name: &str) -> Result<&ProgrammableScene> {
        self.programmable_scenes
            .get(name)
            .ok_or_else(|| CoreError::ProgrammableNotFound(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scene_to_writes_skips_nulls() {
        let scene = Scene {
            channels: vec![Some(10), None, Some(30)],
            ..Default::default()
        };
        assert_eq!(scene.to_writes().unwrap(), vec![(1, 10), (3, 30)]);
    }

    #[test]
    fn test_scene_too_long_rejected() {
        let scene = Scene {
            channels: vec![Some(0); 513],
            ..Default::default()
        };
        assert!(scene.to_writes().is_err());
    }

    #[test]
    fn test_step_validate() {
        let mut step = SequenceStep {
            dmx: BTreeMap::from([(1, 255)]),
            duration: Some(1000),
            ..Default::default()
        };
        assert!(step.validate().is_ok());
        step.dmx.insert(600, 1);
        assert!(step.validate().is_err());
    }

    #[test]
    fn test_fallback_scene_wins_tie() {
        let config = FallbackConfig {
            scene: Some(FallbackSlot {
                enabled: true,
                target: "blackout".into(),
                delay_seconds: 5,
            }),
            sequence: Some(FallbackSlot {
                enabled: true,
                target: "idle-loop".into(),
                delay_seconds: 5,
            }),
        };
        let (kind, slot) = config.next_to_fire().unwrap();
        assert_eq!(kind, PlaybackKind::Scene);
        assert_eq!(slot.target, "blackout");
    }

    #[test]
    fn test_fallback_earliest_wins() {
        let config = FallbackConfig {
            scene: Some(FallbackSlot {
                enabled: true,
                target: "blackout".into(),
                delay_seconds: 10,
            }),
            sequence: Some(FallbackSlot {
                enabled: true,
                target: "idle-loop".into(),
                delay_seconds: 3,
            }),
        };
        let (kind, _) = config.next_to_fire().unwrap();
        assert_eq!(kind, PlaybackKind::Sequence);
    }

    #[test]
    fn test_fallback_disabled_slot_ignored() {
        let config = FallbackConfig {
            scene: Some(FallbackSlot {
                enabled: false,
                target: "blackout".into(),
                delay_seconds: 1,
            }),
            sequence: None,
        };
        assert!(!config.armed());
        assert!(config.next_to_fire().is_none());
    }

    #[test]
    fn test_show_lookup_not_found() {
        let show = ShowState::default();
        assert!(matches!(
            show.scene("missing"),
            Err(CoreError::SceneNotFound(_))
        ));
        assert!(matches!(
            show.sequence("missing"),
            Err(CoreError::SequenceNotFound(_))
        ));
        assert!(matches!(
            show.programmable("missing"),
            Err(CoreError::ProgrammableNotFound(_))
        ));
    }

    #[test]
    fn test_show_serde_roundtrip() {
        let mut show = ShowState::default();
        show.scenes.insert(
            "red".into(),
            Scene {
                channels: vec![None, Some(255)],
                fade_ms: Some(500),
                description: Some("red wash".into()),
            },
        );
        show.sequences.insert(
            "chase".into(),
            Sequence {
                steps: vec![SequenceStep {
                    scene: Some("red".into()),
                    duration: Some(1000),
                    ..Default::default()
                }],
                r#loop: true,
                description: None,
            },
        );

        let json = serde_json::to_string(&show).unwrap();
        let back: ShowState = serde_json::from_str(&json).unwrap();
        assert_eq!(show, back);
    }
}
