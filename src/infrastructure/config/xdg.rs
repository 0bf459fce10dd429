//! Audio settings file under the XDG config directory
//!
//! `$XDG_CONFIG_HOME/clip-audio/config.toml`, holding a partial
//! `AudioConfig`. Files are validated on load and before they are written.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;

use crate::application::ports::ConfigStore;
use crate::domain::config::AudioConfig;
use crate::domain::error::ConfigError;

const APP_DIR: &str = "clip-audio";
const CONFIG_FILE: &str = "config.toml";

/// Default root for clip records and their data directories
pub fn default_clips_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("~/.local/share"))
        .join(APP_DIR)
        .join("clips")
}

fn located(path: &Path, e: impl std::fmt::Display) -> String {
    format!("{}: {}", path.display(), e)
}

/// Settings file store
pub struct XdgConfigStore {
    path: PathBuf,
}

impl XdgConfigStore {
    pub fn new() -> Self {
        let dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join(APP_DIR);
        Self::with_path(dir.join(CONFIG_FILE))
    }

    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Stored settings laid over the built-in defaults
    pub async fn load_effective(&self) -> Result<AudioConfig, ConfigError> {
        Ok(AudioConfig::defaults().merge(self.load().await?))
    }

    fn parse(content: &str) -> Result<AudioConfig, ConfigError> {
        let config: AudioConfig =
            toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }
}

impl Default for XdgConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConfigStore for XdgConfigStore {
    async fn load(&self) -> Result<AudioConfig, ConfigError> {
        match fs::read_to_string(&self.path).await {
            Ok(content) => Self::parse(&content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AudioConfig::empty()),
            Err(e) => Err(ConfigError::ReadError(located(&self.path, e))),
        }
    }

    async fn save(&self, config: &AudioConfig) -> Result<(), ConfigError> {
        config.validate()?;
        let content =
            toml::to_string_pretty(config).map_err(|e| ConfigError::WriteError(e.to_string()))?;

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| ConfigError::WriteError(located(parent, e)))?;
        }

        // Readers never see a half-written file
        let staging = self.path.with_extension("toml.tmp");
        fs::write(&staging, content)
            .await
            .map_err(|e| ConfigError::WriteError(located(&staging, e)))?;
        fs::rename(&staging, &self.path)
            .await
            .map_err(|e| ConfigError::WriteError(located(&self.path, e)))?;

        log::debug!("Saved audio config to {}", self.path.display());
        Ok(())
    }

    fn path(&self) -> PathBuf {
        self.path.clone()
    }

    fn exists(&self) -> bool {
        self.path.exists()
    }

    async fn init(&self) -> Result<(), ConfigError> {
        if self.exists() {
            return Err(ConfigError::AlreadyExists(self.path.display().to_string()));
        }
        self.save(&AudioConfig::defaults()).await
    }
}
