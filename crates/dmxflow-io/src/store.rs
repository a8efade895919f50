//! The configuration directory
//!
//! Two JSON files live side by side: `settings.json` (broker, senders,
//! defaults, followers, retransmission, logging) and `config.json` (the show:
//! scenes, sequences, programmable scenes, fallback, autostart). A missing
//! file falls back to defaults so a fresh install starts cleanly; a malformed
//! file is an error so typos do not silently wipe a show.

use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use dmxflow_core::{Settings, ShowState};

use crate::error::{IoError, Result};

/// Maximum allowed config file size (10 MB); keeps a corrupt or hostile file
/// from exhausting memory at load time.
pub const MAX_CONFIG_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Handle to the configuration directory.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    dir: PathBuf,
}

impl ConfigStore {
    /// Use `dir` as the configuration directory.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Path of `settings.json`
    pub fn settings_path(&self) -> PathBuf {
        self.dir.join("settings.json")
    }

    /// Path of `config.json`
    pub fn show_path(&self) -> PathBuf {
        self.dir.join("config.json")
    }

    /// Load settings, or defaults when the file does not exist.
    pub fn load_settings(&self) -> Result<Settings> {
        let path = self.settings_path();
        if !path.exists() {
            warn!(path = %path.display(), "Settings file not found, using defaults");
            return Ok(Settings::default());
        }
        let settings: Settings = read_json(&path)?;
        info!(path = %path.display(), "Settings loaded");
        Ok(settings)
    }

    /// Load the show, or an empty one when the file does not exist.
    pub fn load_show(&self) -> Result<ShowState> {
        let path = self.show_path();
        if !path.exists() {
            warn!(path = %path.display(), "Show file not found, starting empty");
            return Ok(ShowState::default());
        }
        let show: ShowState = read_json(&path)?;
        info!(
            path = %path.display(),
            scenes = show.scenes.len(),
            sequences = show.sequences.len(),
            programmables = show.programmable_scenes.len(),
            "Show loaded"
        );
        Ok(show)
    }

    /// Persist settings.
    pub fn save_settings(&self, settings: &Settings) -> Result<()> {
        write_json(&self.settings_path(), settings)?;
        info!(path = %self.settings_path().display(), "Settings saved");
        Ok(())
    }

    /// Persist the show.
    pub fn save_show(&self, show: &ShowState) -> Result<()> {
        write_json(&self.show_path(), show)?;
        info!(path = %self.show_path().display(), "Show saved");
        Ok(())
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let size = std::fs::metadata(path)?.len();
    if size > MAX_CONFIG_FILE_SIZE {
        return Err(IoError::FileTooLarge {
            size,
            limit: MAX_CONFIG_FILE_SIZE,
        });
    }
    let mut content = String::new();
    File::open(path)?.read_to_string(&mut content)?;
    Ok(serde_json::from_str(&content)?)
}

fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string_pretty(value)?;
    let mut file = File::create(path)?;
    file.write_all(content.as_bytes())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dmxflow_core::{Scene, SenderConfig, SenderProtocol};
    use tempfile::TempDir;

    #[test]
    fn test_missing_files_fall_back_to_defaults() {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::new(dir.path());

        assert_eq!(store.load_settings().unwrap(), Settings::default());
        assert_eq!(store.load_show().unwrap(), ShowState::default());
    }

    #[test]
    fn test_settings_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::new(dir.path());

        let mut settings = Settings::default();
        settings.mqtt.url = "mqtt://broker.local:1884".to_string();
        settings.senders.push(SenderConfig {
            name: "main".to_string(),
            protocol: SenderProtocol::E131,
            target: String::new(),
            universe: 1,
            fps: 40,
            port: None,
        });

        store.save_settings(&settings).unwrap();
        assert_eq!(store.load_settings().unwrap(), settings);
    }

    #[test]
    fn test_show_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::new(dir.path());

        let mut show = ShowState::default();
        show.scenes.insert(
            "red".to_string(),
            Scene {
                channels: vec![None, Some(255), Some(0)],
                ..Default::default()
            },
        );

        store.save_show(&show).unwrap();
        assert_eq!(store.load_show().unwrap(), show);
    }

    #[test]
    fn test_malformed_json_is_an_error() {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::new(dir.path());
        std::fs::write(store.show_path(), "{not json").unwrap();

        assert!(matches!(store.load_show(), Err(IoError::Json(_))));
    }

    #[test]
    fn test_size_limit_enforced() {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::new(dir.path());
        let blob = " ".repeat((MAX_CONFIG_FILE_SIZE + 1) as usize);
        std::fs::write(store.settings_path(), blob).unwrap();

        assert!(matches!(
            store.load_settings(),
            Err(IoError::FileTooLarge { .. })
        ));
    }

    #[test]
    fn test_scene_null_entries_survive_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = ConfigStore::new(dir.path());

        let mut show = ShowState::default();
        show.scenes.insert(
            "partial".to_string(),
            Scene {
                channels: vec![Some(10), None, None, Some(40)],
                ..Default::default()
            },
        );
        store.save_show(&show).unwrap();

        let loaded = store.load_show().unwrap();
        let scene = loaded.scenes.get("partial").unwrap();
        assert_eq!(scene.channels[1], None);
        assert_eq!(scene.channels[3], Some(40));
    }
}
