use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::battery::BatteryConfig;
use crate::player::PlayerConfig;
use crate::source::still::DEFAULT_INTERVAL_MS;

/// Which producer feeds the player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// JPEG slideshow.
    #[default]
    Still,
    /// MJPEG AVI files.
    Video,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LibraryConfig {
    pub media_dir: PathBuf,
    pub source: SourceKind,
    /// Slideshow interval for still images; 0 disables auto-advance.
    pub auto_advance_ms: u32,
    pub show_channel_name: bool,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            media_dir: dirs::video_dir()
                .or_else(dirs::picture_dir)
                .unwrap_or_else(|| PathBuf::from(".")),
            source: SourceKind::Still,
            auto_advance_ms: DEFAULT_INTERVAL_MS,
            show_channel_name: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub width: u32,
    pub height: u32,
    /// TrueType/OpenType font for overlays; block glyphs when unset.
    pub osd_font: Option<PathBuf>,
    pub osd_font_px: f32,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            width: 320,
            height: 240,
            osd_font: None,
            osd_font_px: 20.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsConfig {
    pub version: u32,
    pub library: LibraryConfig,
    pub player: PlayerConfig,
    pub display: DisplayConfig,
    pub battery: BatteryConfig,
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            version: 1,
            library: LibraryConfig::default(),
            player: PlayerConfig::default(),
            display: DisplayConfig::default(),
            battery: BatteryConfig::default(),
        }
    }
}

impl SettingsConfig {
    pub fn default_path() -> PathBuf {
        let config_dir = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        config_dir.join("kinescope").join("settings.json")
    }

    /// Falls back to defaults on any error.
    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    log::info!("Loaded settings from {}", path.display());
                    config
                }
                Err(e) => {
                    log::warn!("Failed to parse settings: {e}");
                    Self::default()
                }
            },
            Err(_) => {
                log::info!("No settings found at {}, using defaults", path.display());
                Self::default()
            }
        }
    }

    pub fn save_to(&self, path: &Path) {
        if let Some(parent) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                log::error!("Failed to create config dir: {e}");
                return;
            }
        }
        match serde_json::to_string_pretty(self) {
            Ok(json) => {
                if let Err(e) = std::fs::write(path, json) {
                    log::error!("Failed to write settings: {e}");
                } else {
                    log::debug!("Saved settings to {}", path.display());
                }
            }
            Err(e) => log::error!("Failed to serialize settings: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::osd::OsdLevel;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = SettingsConfig::load_from(&dir.path().join("settings.json"));
        assert_eq!(config.version, 1);
        assert_eq!(config.display.width, 320);
        assert_eq!(config.player.osd_duration_ms, 2000);
        assert_eq!(config.library.auto_advance_ms, 5000);
    }

    #[test]
    fn partial_file_fills_missing_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{ "library": { "source": "video" }, "player": { "osd_level": "debug" } }"#,
        )
        .unwrap();
        let config = SettingsConfig::load_from(&path);
        assert_eq!(config.library.source, SourceKind::Video);
        assert!(config.library.show_channel_name);
        assert_eq!(config.player.osd_level, OsdLevel::Debug);
        assert_eq!(config.player.fade_steps, 50);
        assert_eq!(config.battery.low_percent, 10);
    }

    #[test]
    fn malformed_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert_eq!(SettingsConfig::load_from(&path).library.source, SourceKind::Still);
    }

    #[test]
    fn save_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");
        let mut config = SettingsConfig::default();
        config.player.brightness = 128;
        config.display.osd_font = Some(PathBuf::from("/fonts/mono.ttf"));
        config.save_to(&path);

        let loaded = SettingsConfig::load_from(&path);
        assert_eq!(loaded.player.brightness, 128);
        assert_eq!(loaded.display.osd_font, Some(PathBuf::from("/fonts/mono.ttf")));
    }
}
