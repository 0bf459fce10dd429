//! Streaming codec port interfaces

use std::path::Path;

use thiserror::Error;

use crate::domain::error::UnsupportedFormatError;
use crate::domain::recording::StreamFormat;

/// Codec errors
#[derive(Debug, Clone, Error)]
pub enum CodecError {
    #[error("Unsupported codec configuration: {0}")]
    Configuration(String),

    #[error("Codec I/O failed: {0}")]
    Io(String),

    #[error("Invalid stream: {0}")]
    Format(String),

    #[error("Short write: {written} of {requested} bytes accepted")]
    ShortWrite { requested: usize, written: usize },

    #[error("Codec handle is closed")]
    Closed,
}

impl From<UnsupportedFormatError> for CodecError {
    fn from(e: UnsupportedFormatError) -> Self {
        Self::Configuration(e.to_string())
    }
}

impl From<std::io::Error> for CodecError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

/// Block-based PCM to compressed file encoder.
///
/// Amplitude statistics cover every block written so far.
pub trait StreamEncoder: Send {
    fn format(&self) -> StreamFormat;

    /// Encode one block of interleaved PCM.
    ///
    /// Returns the number of bytes accepted. A block that is not a whole
    /// number of frames is a `ShortWrite`; the whole frames are still kept.
    fn write_block(&mut self, pcm: &[u8]) -> Result<usize, CodecError>;

    /// Push everything accepted so far to the file.
    /// Safe to call repeatedly and before `close`.
    fn flush(&mut self) -> Result<(), CodecError>;

    /// Flush and release the file. Idempotent.
    fn close(&mut self) -> Result<(), CodecError>;

    fn peak_amplitude(&self) -> f32;

    fn average_amplitude(&self) -> f32;

    /// Milliseconds of audio accepted so far
    fn position_ms(&self) -> u64;
}

/// Block-based compressed file to PCM decoder.
pub trait StreamDecoder: Send {
    fn format(&self) -> StreamFormat;

    /// Smallest buffer in bytes that can hold one decoded block
    fn min_block_size(&self) -> usize;

    /// Fill `buf` with whole PCM frames.
    /// `Ok(0)` signals end of stream.
    fn read_block(&mut self, buf: &mut [u8]) -> Result<usize, CodecError>;

    /// Release the stream. Idempotent.
    fn close(&mut self);

    fn peak_amplitude(&self) -> f32;

    fn average_amplitude(&self) -> f32;

    /// Milliseconds of audio returned so far
    fn position_ms(&self) -> u64;
}

/// Port for the streaming lossless codec
pub trait StreamCodec: Send + Sync {
    /// Open an encoder writing to `path`.
    ///
    /// Fails with `Configuration` for unsupported formats and `Io` when the
    /// path cannot be written.
    fn open_encoder(
        &self,
        path: &Path,
        format: StreamFormat,
    ) -> Result<Box<dyn StreamEncoder>, CodecError>;

    /// Open a decoder on `path`, failing with `Format` for foreign or corrupt
    /// streams.
    fn open_decoder(&self, path: &Path) -> Result<Box<dyn StreamDecoder>, CodecError>;
}
