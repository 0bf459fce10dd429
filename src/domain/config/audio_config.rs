//! Audio configuration value object

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::domain::error::ConfigError;
use crate::domain::recording::{Duration, StreamFormat, DEFAULT_SAMPLE_RATE};

/// Extensions played through the local decoder when nothing is configured
const DEFAULT_LOCAL_EXTENSIONS: &[&str] = &["flac"];

/// Playback engine timing and backend selection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlaybackConfig {
    pub progress_interval: Option<String>,
    pub idle_wait: Option<String>,
    pub retry_wait: Option<String>,
    pub local_extensions: Option<Vec<String>>,
}

/// Audio configuration.
/// All fields are optional to support partial configs and merging.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AudioConfig {
    pub sample_rate: Option<u32>,
    pub channels: Option<u16>,
    pub bits_per_sample: Option<u16>,
    pub clips_dir: Option<PathBuf>,
    pub playback: Option<PlaybackConfig>,
}

impl AudioConfig {
    /// Create config with default values
    pub fn defaults() -> Self {
        Self {
            sample_rate: Some(DEFAULT_SAMPLE_RATE),
            channels: Some(1),
            bits_per_sample: Some(16),
            clips_dir: None,
            playback: Some(PlaybackConfig {
                progress_interval: Some(Duration::default_progress_interval().to_string()),
                idle_wait: Some(Duration::default_idle_wait().to_string()),
                retry_wait: Some(Duration::default_retry_wait().to_string()),
                local_extensions: Some(
                    DEFAULT_LOCAL_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
                ),
            }),
        }
    }

    /// Create an empty config (all None)
    pub fn empty() -> Self {
        Self::default()
    }

    /// Merge this config with another, where other takes precedence.
    /// Only non-None values from other will override this.
    pub fn merge(self, other: Self) -> Self {
        Self {
            sample_rate: other.sample_rate.or(self.sample_rate),
            channels: other.channels.or(self.channels),
            bits_per_sample: other.bits_per_sample.or(self.bits_per_sample),
            clips_dir: other.clips_dir.or(self.clips_dir),
            playback: Self::merge_playback_config(self.playback, other.playback),
        }
    }

    fn merge_playback_config(
        base: Option<PlaybackConfig>,
        other: Option<PlaybackConfig>,
    ) -> Option<PlaybackConfig> {
        match (base, other) {
            (None, None) => None,
            (Some(b), None) => Some(b),
            (None, Some(o)) => Some(o),
            (Some(b), Some(o)) => Some(PlaybackConfig {
                progress_interval: o.progress_interval.or(b.progress_interval),
                idle_wait: o.idle_wait.or(b.idle_wait),
                retry_wait: o.retry_wait.or(b.retry_wait),
                local_extensions: o.local_extensions.or(b.local_extensions),
            }),
        }
    }

    /// Recording format, falling back per field to mono 16-bit at 22050Hz
    pub fn format_or_default(&self) -> StreamFormat {
        let speech = StreamFormat::speech();
        StreamFormat::new(
            self.sample_rate.unwrap_or(speech.sample_rate),
            self.channels.unwrap_or(speech.channels),
            self.bits_per_sample.unwrap_or(speech.bits_per_sample),
        )
    }

    fn playback_duration(
        &self,
        field: impl Fn(&PlaybackConfig) -> Option<&String>,
        default: fn() -> Duration,
    ) -> Duration {
        self.playback
            .as_ref()
            .and_then(field)
            .and_then(|s| s.parse().ok())
            .unwrap_or_else(default)
    }

    /// Get progress tick interval, or 500ms if not set/invalid
    pub fn progress_interval_or_default(&self) -> Duration {
        self.playback_duration(
            |p| p.progress_interval.as_ref(),
            Duration::default_progress_interval,
        )
    }

    /// Get the control loop idle wait, or 60s if not set/invalid
    pub fn idle_wait_or_default(&self) -> Duration {
        self.playback_duration(|p| p.idle_wait.as_ref(), Duration::default_idle_wait)
    }

    /// Get the resume retry wait, or 251ms if not set/invalid
    pub fn retry_wait_or_default(&self) -> Duration {
        self.playback_duration(|p| p.retry_wait.as_ref(), Duration::default_retry_wait)
    }

    /// Lowercased extensions handled by the local decoder
    pub fn local_extensions_or_default(&self) -> Vec<String> {
        self.playback
            .as_ref()
            .and_then(|p| p.local_extensions.as_ref())
            .map(|exts| exts.iter().map(|e| e.trim_start_matches('.').to_lowercase()).collect())
            .unwrap_or_else(|| DEFAULT_LOCAL_EXTENSIONS.iter().map(|s| s.to_string()).collect())
    }

    /// Reject values the `*_or_default` accessors would silently replace
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_rate.is_some() || self.channels.is_some() || self.bits_per_sample.is_some() {
            self.format_or_default()
                .validate()
                .map_err(|e| ConfigError::ValidationError {
                    key: "format".to_string(),
                    message: e.reason,
                })?;
        }

        if let Some(playback) = &self.playback {
            let durations = [
                ("playback.progress_interval", &playback.progress_interval),
                ("playback.idle_wait", &playback.idle_wait),
                ("playback.retry_wait", &playback.retry_wait),
            ];
            for (key, value) in durations {
                if let Some(value) = value {
                    value
                        .parse::<Duration>()
                        .map_err(|e| ConfigError::ValidationError {
                            key: key.to_string(),
                            message: e.to_string(),
                        })?;
                }
            }
        }
        Ok(())
    }

    /// Get the clips directory, or `fallback` if not set
    pub fn clips_dir_or(&self, fallback: &Path) -> PathBuf {
        self.clips_dir
            .clone()
            .unwrap_or_else(|| fallback.to_path_buf())
    }
}
