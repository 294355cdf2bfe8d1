use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::playback::ms_to_frames;

/// Returns the path to the settings file: `~/.config/soundboard-rs/settings.json`
pub fn settings_path() -> PathBuf {
    let mut path = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
    path.push("soundboard-rs");
    path.push("settings.json");
    path
}

/// Persisted operator settings.
///
/// Serialized as JSON to the platform config directory.
/// Fields use `#[serde(default)]` so that adding new settings
/// won't break existing config files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Output device opened at startup
    pub device: Option<String>,

    /// Master volume
    pub volume: f32,

    // Fades, in milliseconds
    pub fade_in_ms: u32,
    pub fade_out_ms: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            device: None,
            volume: 1.0,
            fade_in_ms: 0,
            fade_out_ms: 2000,
        }
    }
}

impl Settings {
    /// Load settings from the default location
    pub fn load() -> Self {
        Self::load_from(&settings_path())
    }

    /// Load settings from `path`, falling back to defaults on any error.
    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(settings) => {
                    log::info!("Loaded settings from {}", path.display());
                    settings
                }
                Err(e) => {
                    log::warn!("Failed to parse settings ({}), using defaults", e);
                    Self::default()
                }
            },
            Err(e) => {
                log::info!("No settings file found ({}), using defaults", e);
                Self::default()
            }
        }
    }

    /// Save settings to the default location
    pub fn save(&self) {
        self.save_to(&settings_path());
    }

    /// Save settings to `path` as pretty JSON.
    pub fn save_to(&self, path: &Path) {
        if let Some(parent) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                log::warn!("Failed to create config directory: {}", e);
                return;
            }
        }
        match serde_json::to_string_pretty(self) {
            Ok(json) => {
                if let Err(e) = std::fs::write(path, json) {
                    log::warn!("Failed to write settings: {}", e);
                }
            }
            Err(e) => {
                log::warn!("Failed to serialize settings: {}", e);
            }
        }
    }

    pub fn fade_in_frames(&self) -> usize {
        ms_to_frames(self.fade_in_ms)
    }

    pub fn fade_out_frames(&self) -> usize {
        ms_to_frames(self.fade_out_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_use_defaults() {
        let settings: Settings = serde_json::from_str(r#"{ "volume": 0.5 }"#).unwrap();
        assert_eq!(settings.volume, 0.5);
        assert_eq!(settings.fade_out_ms, 2000);
        assert!(settings.device.is_none());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");

        let settings = Settings {
            device: Some("Quad Out".to_string()),
            volume: 0.8,
            fade_in_ms: 250,
            fade_out_ms: 1000,
        };
        settings.save_to(&path);
        assert_eq!(Settings::load_from(&path), settings);
        assert_eq!(settings.fade_out_frames(), 44_100);
    }

    #[test]
    fn test_corrupt_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "not json").unwrap();
        assert_eq!(Settings::load_from(&path), Settings::default());
    }
}
