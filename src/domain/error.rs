//! Domain error types

use thiserror::Error;

/// Error when parsing a duration string
#[derive(Debug, Clone, Error)]
#[error("Invalid duration format: \"{input}\". Expected format: <number>ms, <number>s, <number>m or a combination (e.g., 500ms, 30s, 2m30s)")]
pub struct DurationParseError {
    pub input: String,
}

/// Error when a PCM stream format cannot be handled by the codec or devices
#[derive(Debug, Clone, Error)]
#[error("Unsupported stream format {format}: {reason}")]
pub struct UnsupportedFormatError {
    pub format: String,
    pub reason: String,
}

/// Error when configuration fails
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(String),

    #[error("Failed to parse config file: {0}")]
    ParseError(String),

    #[error("Failed to write config file: {0}")]
    WriteError(String),

    #[error("Invalid config value for '{key}': {message}")]
    ValidationError { key: String, message: String },

    #[error("Config file already exists at: {0}")]
    AlreadyExists(String),
}

/// Error when loading or saving clip records
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("Failed to read clip record: {0}")]
    Read(String),

    #[error("Failed to parse clip record: {0}")]
    Parse(String),

    #[error("Failed to write clip record: {0}")]
    Write(String),

    #[error("Clip record schema version {found} is newer than supported version {supported}")]
    UnsupportedVersion { found: u32, supported: u32 },

    #[error("No clip record for id {0}")]
    NotFound(String),
}
