//! Persisted user preferences

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::{ProjectDirs, UserDirs};
use serde::{Deserialize, Serialize};

use crate::model::{OutputMode, Resolution};

/// Settings remembered between sessions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub download_folder: PathBuf,
    pub default_mode: OutputMode,
    pub default_resolution: Resolution,
    pub append_uploader: bool,
    pub append_timestamp: bool,
    pub dark_mode: bool,
    /// Overrides for the external tools; `None` means bundled copy or `PATH`
    pub ytdlp_path: Option<PathBuf>,
    pub ffmpeg_path: Option<PathBuf>,
    pub ffprobe_path: Option<PathBuf>,
    /// `tracing` filter used when `RUST_LOG` is not set
    pub log_filter: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            download_folder: default_download_folder(),
            default_mode: OutputMode::Video,
            default_resolution: Resolution::P1080,
            append_uploader: false,
            append_timestamp: false,
            dark_mode: true,
            ytdlp_path: None,
            ffmpeg_path: None,
            ffprobe_path: None,
            log_filter: "socialclip=info".to_string(),
        }
    }
}

/// The user's Downloads folder, else home, else the working directory
pub fn default_download_folder() -> PathBuf {
    UserDirs::new()
        .and_then(|dirs| {
            dirs.download_dir()
                .filter(|d| d.is_dir())
                .map(Path::to_path_buf)
                .or_else(|| Some(dirs.home_dir().to_path_buf()))
        })
        .unwrap_or_else(|| PathBuf::from("."))
}

impl AppConfig {
    /// Loads the config file, writing defaults when it does not exist yet
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        Self::load_from(&path)
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        self.save_to(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {path:?}"))?;
            let config: AppConfig =
                serde_json::from_str(&content).with_context(|| "Failed to parse config file")?;
            tracing::info!("Loaded configuration from: {path:?}");
            Ok(config)
        } else {
            let config = Self::default();
            config.save_to(path)?;
            tracing::info!("Created default configuration at: {path:?}");
            Ok(config)
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {parent:?}"))?;
        }
        let content =
            serde_json::to_string_pretty(self).with_context(|| "Failed to serialize config")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {path:?}"))?;
        tracing::debug!("Saved configuration to: {path:?}");
        Ok(())
    }

    pub fn config_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("com", "socialclip", "socialclip")
            .with_context(|| "Failed to get project directories")?;
        Ok(dirs.config_dir().join("config.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config, AppConfig::default());
        assert!(path.exists());
    }

    #[test]
    fn save_then_load_keeps_choices() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let config = AppConfig {
            download_folder: PathBuf::from("/tmp/out"),
            default_mode: OutputMode::Audio,
            default_resolution: Resolution::P2160,
            append_timestamp: true,
            ffmpeg_path: Some(PathBuf::from("/opt/ffmpeg")),
            ..AppConfig::default()
        };
        config.save_to(&path).unwrap();
        assert_eq!(AppConfig::load_from(&path).unwrap(), config);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"default_mode":"Audio"}"#).unwrap();

        let config = AppConfig::load_from(&path).unwrap();
        assert_eq!(config.default_mode, OutputMode::Audio);
        assert_eq!(config.default_resolution, Resolution::P1080);
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(AppConfig::load_from(&path).is_err());
    }
}
