//! Infrastructure layer - Adapter implementations
//!
//! Contains concrete implementations of the port interfaces,
//! integrating with cpal, rodio, the FLAC codec, HTTP and the filesystem.

pub mod backend;
pub mod capture;
pub mod codec;
pub mod config;
pub mod render;
pub mod store;

// Re-export adapters
pub use backend::{DefaultBackendFactory, LocalDecodeBackend, NetworkStreamBackend};
pub use capture::CpalInput;
pub use codec::FlacCodec;
pub use config::{default_clips_dir, XdgConfigStore};
pub use render::RodioOutput;
pub use store::TomlClipStore;
