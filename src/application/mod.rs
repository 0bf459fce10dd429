//! Application layer - Recording, flattening and playback components
//!
//! Components depend only on the port traits; concrete devices, codecs
//! and stores are plugged in from the infrastructure layer.

pub mod clip_recorder;
pub mod engine;
pub mod flatten;
pub mod ports;
pub mod segment_recorder;

// Re-export components
pub use clip_recorder::{ClipRecorder, ClipRecorderCallback, ClipRecorderEvent};
pub use engine::{EngineConfig, EngineError, ObserverId, PlaybackEngine, PlaybackObserver};
pub use flatten::{FlattenError, SegmentConcatenator};
pub use segment_recorder::{
    RecorderCallback, RecorderEvent, RecorderState, RecordingError, SegmentRecorder,
};
