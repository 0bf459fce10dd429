//! Domain layer - Core audio logic
//!
//! Contains value objects, entities, the playback decision table and
//! domain errors. File access is limited to naming recordings on disk.

pub mod clip;
pub mod config;
pub mod error;
pub mod playback;
pub mod recording;

// Re-export common types
pub use clip::{Clip, ClipId, Location, Segment, UploadState};
pub use config::{AudioConfig, PlaybackConfig};
pub use error::*;
pub use playback::{decide, Action, BackendKind, PlaybackStatus, PlayerState};
pub use recording::{AmplitudeMeter, AmplitudeSnapshot, Duration, StreamFormat};
