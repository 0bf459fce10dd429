//! clip-audio - Recording and playback core of an audio-blogging client
//!
//! This crate records clips as sequences of FLAC segments, flattens them
//! into one stream on demand, and plays local or remote clips through a
//! coalescing playback state machine.
//!
//! # Architecture
//!
//! The crate follows hexagonal (ports & adapters) architecture:
//!
//! - **Domain**: Clips, segments, stream formats, amplitude statistics,
//!   playback states and the transition table
//! - **Application**: Segment and clip recorders, the segment concatenator,
//!   the playback engine, and the port interfaces (traits) they consume
//! - **Infrastructure**: Adapter implementations (FLAC codec, cpal capture,
//!   rodio output, playback backends, TOML clip store, XDG config)

pub mod application;
pub mod domain;
pub mod infrastructure;

/// Initialize `env_logger` from `RUST_LOG`, defaulting to `info`.
/// Calling it again is harmless.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();
}
