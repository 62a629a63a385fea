//! Application settings
//!
//! Read once at startup from `~/.config/murmur/config.json` (or `--config`).
//! Every field has a default, so a partial file is fine and a missing default
//! file means "all defaults". Settings are never written back.

use anyhow::Context;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_DIR: &str = "murmur";
const CONFIG_FILE: &str = "config.json";

/// Remote speech service
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ApiSettings {
    pub base_url: String,
    /// Bearer credential; injected, never logged
    pub api_key: Option<String>,
    pub model: String,
    pub voice: String,
    /// Codec requested for the spoken reply
    pub output_format: String,
    pub timeout_secs: u64,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            model: "gpt-audio-mini-2025-10-06".to_string(),
            voice: "alloy".to_string(),
            output_format: "pcm16".to_string(),
            timeout_secs: 60,
        }
    }
}

/// Device formats and analyser size
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AudioSettings {
    pub capture_rate: u32,
    pub playback_rate: u32,
    pub fft_size: usize,
    /// Seconds to wait for the microphone before reporting no device
    pub grant_timeout_secs: u64,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            capture_rate: 16000,
            playback_rate: 24000,
            fft_size: 32,
            grant_timeout_secs: 5,
        }
    }
}

impl AudioSettings {
    pub fn grant_timeout(&self) -> Duration {
        Duration::from_secs(self.grant_timeout_secs)
    }
}

/// Visualizer loop
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RenderSettings {
    pub fps: u32,
    pub smoothing: f32,
    pub width: f32,
    pub height: f32,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            fps: 60,
            smoothing: 0.01,
            width: 800.0,
            height: 600.0,
        }
    }
}

/// Recording policy
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PolicySettings {
    /// Recordings shorter than this are not sent; unset sends everything
    pub min_recording_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub api: ApiSettings,
    pub audio: AudioSettings,
    pub render: RenderSettings,
    pub policy: PolicySettings,
}

/// Default location of the settings file
pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_DIR).join(CONFIG_FILE))
}

impl Settings {
    /// Load settings from an explicit path, or from the default location.
    ///
    /// An explicit path must exist; the default one may be absent.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        match explicit {
            Some(path) => Self::from_file(path),
            None => match default_path() {
                Some(path) if path.exists() => Self::from_file(&path),
                _ => {
                    debug!("No settings file, using defaults");
                    Ok(Self::default())
                }
            },
        }
    }

    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings from {}", path.display()))?;
        let settings: Settings = serde_json::from_str(&text)
            .with_context(|| format!("Invalid settings file {}", path.display()))?;
        info!("Loaded settings from {}", path.display());
        Ok(settings)
    }

    pub fn min_recording(&self) -> Option<Duration> {
        self.policy.min_recording_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.audio.capture_rate, 16000);
        assert_eq!(settings.audio.playback_rate, 24000);
        assert_eq!(settings.audio.fft_size, 32);
        assert_eq!(settings.render.smoothing, 0.01);
        assert_eq!(settings.api.output_format, "pcm16");
        assert_eq!(settings.min_recording(), None);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "api": {{ "api_key": "k", "voice": "verse" }}, "policy": {{ "min_recording_ms": 250 }} }}"#
        )
        .unwrap();

        let settings = Settings::load(Some(file.path())).unwrap();
        assert_eq!(settings.api.api_key.as_deref(), Some("k"));
        assert_eq!(settings.api.voice, "verse");
        assert_eq!(settings.api.model, ApiSettings::default().model);
        assert_eq!(settings.audio, AudioSettings::default());
        assert_eq!(settings.min_recording(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Settings::load(Some(&dir.path().join("absent.json"))).is_err());
    }

    #[test]
    fn test_invalid_json_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        assert!(Settings::from_file(file.path()).is_err());
    }
}
