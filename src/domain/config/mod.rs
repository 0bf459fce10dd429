//! Configuration domain types

mod audio_config;

pub use audio_config::{AudioConfig, PlaybackConfig};
