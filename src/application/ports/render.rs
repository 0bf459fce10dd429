//! Audio render port interface

use thiserror::Error;

use crate::domain::recording::StreamFormat;

/// Output device errors
#[derive(Debug, Clone, Error)]
pub enum RenderError {
    #[error("Output device cannot play the requested format: {0}")]
    Configuration(String),

    #[error("No audio output device available: {0}")]
    Unavailable(String),

    #[error("Playback failed: {0}")]
    Playback(String),
}

/// An opened output device, used from the thread that opened it
pub trait RenderStream {
    /// Queue a block of interleaved PCM for playback
    fn write(&mut self, pcm: &[u8]) -> Result<(), RenderError>;

    /// Milliseconds of audio queued but not yet played
    fn queued_ms(&mut self) -> u64;

    fn set_paused(&mut self, paused: bool);

    /// Drop everything queued and silence the device
    fn stop(&mut self);
}

/// Port for opening the hardware output device
pub trait AudioOutput: Send + Sync {
    fn open_render(&self, format: StreamFormat) -> Result<Box<dyn RenderStream>, RenderError>;
}
