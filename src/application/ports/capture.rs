//! Audio capture port interface

use thiserror::Error;

use crate::domain::error::UnsupportedFormatError;
use crate::domain::recording::StreamFormat;

/// Capture device errors
#[derive(Debug, Clone, Error)]
pub enum CaptureError {
    #[error("Input device cannot supply the requested format: {0}")]
    Configuration(String),

    #[error("No audio input device available")]
    Unavailable,

    #[error("Invalid capture operation: {0}")]
    InvalidOperation(String),

    #[error("Bad capture value: {0}")]
    BadValue(String),
}

impl From<UnsupportedFormatError> for CaptureError {
    fn from(e: UnsupportedFormatError) -> Self {
        Self::Configuration(e.to_string())
    }
}

/// An opened input device.
///
/// Device handles are generally bound to the thread that opened them, so a
/// stream is created and used on one recording thread.
pub trait CaptureStream {
    /// The format blocks are delivered in
    fn format(&self) -> StreamFormat;

    /// Smallest useful read buffer in bytes
    fn min_buffer_size(&self) -> usize;

    fn start(&mut self) -> Result<(), CaptureError>;

    fn stop(&mut self) -> Result<(), CaptureError>;

    /// Read interleaved PCM into `buf`, returning the byte count.
    /// `Ok(0)` means no data is available yet.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, CaptureError>;
}

/// Port for opening the hardware input device
pub trait AudioInput: Send + Sync {
    /// Open the device in exactly `format`; no negotiation.
    fn open_capture(&self, format: StreamFormat) -> Result<Box<dyn CaptureStream>, CaptureError>;
}
