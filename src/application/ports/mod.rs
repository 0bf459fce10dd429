//! Port interfaces (traits) for external systems
//!
//! These traits define the boundaries between the application
//! and infrastructure layers.

pub mod backend;
pub mod capture;
pub mod clip_store;
pub mod codec;
pub mod config;
pub mod render;

// Re-export common types
pub use backend::{BackendError, BackendEvent, BackendFactory, BackendListener, PlaybackBackend};
pub use capture::{AudioInput, CaptureError, CaptureStream};
pub use clip_store::ClipStore;
pub use codec::{CodecError, StreamCodec, StreamDecoder, StreamEncoder};
pub use config::ConfigStore;
pub use render::{AudioOutput, RenderError, RenderStream};
