//! Audio configuration port interface

use async_trait::async_trait;
use std::path::PathBuf;

use crate::domain::config::AudioConfig;
use crate::domain::error::ConfigError;

/// Port for persisted audio configuration
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Load the stored audio configuration.
    /// A missing file yields an empty config, so callers merge it over defaults.
    async fn load(&self) -> Result<AudioConfig, ConfigError>;

    /// Persist `config`, creating parent directories as needed.
    async fn save(&self, config: &AudioConfig) -> Result<(), ConfigError>;

    /// Location of the configuration file.
    fn path(&self) -> PathBuf;

    fn exists(&self) -> bool;

    /// Write the default audio configuration.
    /// Fails with `AlreadyExists` rather than overwrite a user's file.
    async fn init(&self) -> Result<(), ConfigError>;
}
