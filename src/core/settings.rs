//! Persistent engine settings
//!
//! Persisted to `<config_dir>/audiomerge/settings.json`. Every field has a
//! default so older or hand-edited files keep loading.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const APP_DIR: &str = "audiomerge";

fn default_probe_timeout_secs() -> u64 {
    5
}

fn default_bitrate() -> String {
    "64k".to_string()
}

fn default_high_throughput_speed() -> f64 {
    50.0
}

fn default_copy_buffer_size() -> usize {
    64 * 1024
}

fn default_progress_interval_ms() -> u64 {
    100
}

/// Settings for locating and driving the external engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Explicit engine binary, skips discovery when set
    #[serde(default)]
    pub ffmpeg_path: Option<PathBuf>,
    /// Explicit probe binary, otherwise looked up next to the engine
    #[serde(default)]
    pub ffprobe_path: Option<PathBuf>,
    /// Per-file probe timeout
    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
    /// Bitrate used when re-encoding without an explicit request
    #[serde(default = "default_bitrate")]
    pub default_bitrate: String,
    /// Speed factor above which a copy pass is labelled "merging"
    #[serde(default = "default_high_throughput_speed")]
    pub high_throughput_speed: f64,
    /// Buffer size for raw concatenation
    #[serde(default = "default_copy_buffer_size")]
    pub copy_buffer_size: usize,
    /// Minimum gap between byte-progress reports
    #[serde(default = "default_progress_interval_ms")]
    pub progress_interval_ms: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            ffmpeg_path: None,
            ffprobe_path: None,
            probe_timeout_secs: default_probe_timeout_secs(),
            default_bitrate: default_bitrate(),
            high_throughput_speed: default_high_throughput_speed(),
            copy_buffer_size: default_copy_buffer_size(),
            progress_interval_ms: default_progress_interval_ms(),
        }
    }
}

impl EngineSettings {
    const SETTINGS_FILE: &'static str = "settings.json";

    /// Get the settings directory, creating it if needed
    fn get_config_dir() -> Result<PathBuf, String> {
        let config_dir =
            dirs::config_dir().ok_or_else(|| "Could not determine config directory".to_string())?;

        let app_dir = config_dir.join(APP_DIR);

        if !app_dir.exists() {
            std::fs::create_dir_all(&app_dir)
                .map_err(|e| format!("Failed to create config directory: {}", e))?;
        }

        Ok(app_dir)
    }

    /// Default location of the settings file
    pub fn default_path() -> Result<PathBuf, String> {
        Ok(Self::get_config_dir()?.join(Self::SETTINGS_FILE))
    }

    /// Load settings from disk, or return defaults if not found
    pub fn load() -> Self {
        match Self::default_path().and_then(|p| Self::load_from(&p)) {
            Ok(settings) => {
                log::debug!("Loaded engine settings from disk");
                settings
            }
            Err(e) => {
                log::debug!("Using default engine settings: {}", e);
                Self::default()
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, String> {
        if !path.exists() {
            return Err("Settings file not found".to_string());
        }

        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read settings: {}", e))?;

        serde_json::from_str(&contents).map_err(|e| format!("Failed to parse settings: {}", e))
    }

    /// Save settings to the default location
    pub fn save(&self) -> Result<(), String> {
        self.save_to(&Self::default_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), String> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize settings: {}", e))?;

        std::fs::write(path, json).map_err(|e| format!("Failed to write settings: {}", e))?;

        log::debug!("Saved engine settings to {:?}", path);
        Ok(())
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs.max(1))
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }
}
