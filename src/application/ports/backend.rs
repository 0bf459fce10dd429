//! Playback backend port interfaces

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use super::codec::CodecError;
use super::render::RenderError;
use crate::domain::clip::Clip;
use crate::domain::playback::BackendKind;

/// Playback backend errors
#[derive(Debug, Clone, Error)]
pub enum BackendError {
    #[error("Backend configuration failed: {0}")]
    Configuration(String),

    #[error("Backend I/O failed: {0}")]
    Io(String),

    #[error("Unplayable stream: {0}")]
    Format(String),

    #[error("Network stream failed: {0}")]
    Network(String),

    #[error("Clip has nothing to play")]
    NoSource,

    #[error("Render device failed: {0}")]
    Render(#[from] RenderError),
}

impl From<CodecError> for BackendError {
    fn from(e: CodecError) -> Self {
        match e {
            CodecError::Configuration(msg) => Self::Configuration(msg),
            CodecError::Format(msg) => Self::Format(msg),
            other => Self::Io(other.to_string()),
        }
    }
}

/// Asynchronous signals a backend raises from its own threads
#[derive(Debug, Clone)]
pub enum BackendEvent {
    /// Prepare finished; the backend can resume
    Ready,
    Failed(BackendError),
    /// The stream played to its end
    Finished,
    /// Playback stalled (`true`) or recovered (`false`) waiting for data
    Buffering(bool),
}

/// Callback handle a backend reports its events through
#[derive(Clone)]
pub struct BackendListener {
    sink: Arc<dyn Fn(BackendEvent) + Send + Sync>,
}

impl BackendListener {
    pub fn new(sink: impl Fn(BackendEvent) + Send + Sync + 'static) -> Self {
        Self {
            sink: Arc::new(sink),
        }
    }

    pub fn emit(&self, event: BackendEvent) {
        (self.sink)(event);
    }

    pub fn ready(&self) {
        self.emit(BackendEvent::Ready);
    }

    pub fn failed(&self, error: BackendError) {
        self.emit(BackendEvent::Failed(error));
    }

    pub fn finished(&self) {
        self.emit(BackendEvent::Finished);
    }

    pub fn buffering(&self, stalled: bool) {
        self.emit(BackendEvent::Buffering(stalled));
    }
}

impl fmt::Debug for BackendListener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendListener").finish_non_exhaustive()
    }
}

/// One way of playing a clip.
///
/// `prepare` returns as soon as preparation is under way; completion is
/// signalled through the listener from an arbitrary thread. The other calls
/// may block briefly but never call back into the listener synchronously.
pub trait PlaybackBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Start preparing `clip`. Errors returned here mean preparation never
    /// started and no listener event will follow.
    fn prepare(&self, clip: &Clip, listener: BackendListener) -> Result<(), BackendError>;

    fn pause(&self);

    /// Start or continue playback.
    /// Returns `false` when the backend cannot play yet.
    fn resume(&self) -> bool;

    /// Tear the backend down and wait for its threads to finish
    fn stop(&self);
}

/// Port constructing backends for the playback engine
pub trait BackendFactory: Send + Sync {
    fn create(&self, kind: BackendKind) -> Result<Arc<dyn PlaybackBackend>, BackendError>;
}
