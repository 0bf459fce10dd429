//! Segment recorder: one capture device feeding one encoder
//!
//! The device and encoder live on a dedicated recording thread. Pausing and
//! resuming flip a flag the thread checks every iteration, so the device is
//! never reacquired mid-session.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration as StdDuration;

use thiserror::Error;

use super::ports::{
    AudioInput, CaptureError, CaptureStream, CodecError, StreamCodec, StreamEncoder,
};
use crate::domain::recording::{AmplitudeSnapshot, StreamFormat};

/// Sleep between polls while armed but not capturing
const PAUSED_POLL: StdDuration = StdDuration::from_millis(10);

/// Back-off after a failed device read
const READ_ERROR_BACKOFF: StdDuration = StdDuration::from_millis(10);

/// Recording errors
#[derive(Debug, Clone, Error)]
pub enum RecordingError {
    #[error("Recording configuration rejected: {0}")]
    Configuration(String),

    #[error("Recording I/O failed: {0}")]
    Io(String),

    #[error("Recording stream invalid: {0}")]
    Format(String),

    #[error("Short write: {written} of {requested} bytes accepted")]
    ShortWrite { requested: usize, written: usize },

    #[error("Cannot {action} while {state}")]
    InvalidState {
        state: RecorderState,
        action: &'static str,
    },

    #[error("Recording thread panicked")]
    ThreadPanicked,
}

impl From<CodecError> for RecordingError {
    fn from(e: CodecError) -> Self {
        match e {
            CodecError::Configuration(msg) => Self::Configuration(msg),
            CodecError::Io(msg) => Self::Io(msg),
            CodecError::Format(msg) => Self::Format(msg),
            CodecError::ShortWrite { requested, written } => {
                Self::ShortWrite { requested, written }
            }
            CodecError::Closed => Self::Io("encoder already closed".to_string()),
        }
    }
}

impl From<CaptureError> for RecordingError {
    fn from(e: CaptureError) -> Self {
        match e {
            CaptureError::Configuration(msg) => Self::Configuration(msg),
            other => Self::Io(other.to_string()),
        }
    }
}

/// Lifecycle of a segment recorder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RecorderState {
    #[default]
    Idle,
    /// Device and encoder open, not capturing
    Armed,
    Recording,
    Stopped,
}

impl RecorderState {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Armed => "armed",
            Self::Recording => "recording",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for RecorderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Events raised on the recording thread
#[derive(Debug, Clone)]
pub enum RecorderEvent {
    /// Statistics after a block was encoded; position is within the segment
    Amplitudes(AmplitudeSnapshot),
    ReadError(CaptureError),
    WriteError(CodecError),
    /// The device and encoder have been released
    Stopped,
}

/// Callback receiving recorder events
pub type RecorderCallback = Arc<dyn Fn(RecorderEvent) + Send + Sync>;

/// Flags shared with the recording thread
#[derive(Debug, Default)]
struct Control {
    should_run: AtomicBool,
    should_record: AtomicBool,
}

/// Records one segment file from the input device
pub struct SegmentRecorder {
    input: Arc<dyn AudioInput>,
    codec: Arc<dyn StreamCodec>,
    path: PathBuf,
    format: StreamFormat,
    callback: RecorderCallback,
    state: RecorderState,
    control: Arc<Control>,
    last: Arc<Mutex<AmplitudeSnapshot>>,
    handle: Option<JoinHandle<()>>,
}

impl SegmentRecorder {
    pub fn new(
        input: Arc<dyn AudioInput>,
        codec: Arc<dyn StreamCodec>,
        path: impl Into<PathBuf>,
        format: StreamFormat,
        callback: RecorderCallback,
    ) -> Self {
        Self {
            input,
            codec,
            path: path.into(),
            format,
            callback,
            state: RecorderState::Idle,
            control: Arc::new(Control::default()),
            last: Arc::new(Mutex::new(AmplitudeSnapshot::default())),
            handle: None,
        }
    }

    pub fn state(&self) -> RecorderState {
        self.state
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Latest statistics reported by the recording thread
    pub fn last_snapshot(&self) -> AmplitudeSnapshot {
        *self.last.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open the input device and the encoder on a new recording thread.
    ///
    /// Returns once both are open, or with the error that prevented it.
    pub fn arm(&mut self) -> Result<(), RecordingError> {
        if self.state != RecorderState::Idle {
            return Err(RecordingError::InvalidState {
                state: self.state,
                action: "arm",
            });
        }

        if let Some(parent) = self.path.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                self.state = RecorderState::Stopped;
                return Err(RecordingError::Io(format!("{}: {}", parent.display(), e)));
            }
        }

        self.control.should_run.store(true, Ordering::SeqCst);
        self.control.should_record.store(false, Ordering::SeqCst);

        let (armed_tx, armed_rx) = mpsc::channel();
        let session = Session {
            input: Arc::clone(&self.input),
            codec: Arc::clone(&self.codec),
            path: self.path.clone(),
            format: self.format,
            callback: Arc::clone(&self.callback),
            control: Arc::clone(&self.control),
            last: Arc::clone(&self.last),
        };

        let handle = thread::Builder::new()
            .name("segment-recorder".to_string())
            .spawn(move || session.run(armed_tx))
            .map_err(|e| RecordingError::Io(format!("Failed to spawn recording thread: {}", e)))?;

        match armed_rx.recv() {
            Ok(Ok(())) => {
                self.handle = Some(handle);
                self.state = RecorderState::Armed;
                log::debug!("Armed recorder for {}", self.path.display());
                Ok(())
            }
            Ok(Err(e)) => {
                let _ = handle.join();
                self.state = RecorderState::Stopped;
                log::warn!("Failed to arm recorder for {}: {}", self.path.display(), e);
                Err(e)
            }
            Err(_) => {
                let _ = handle.join();
                self.state = RecorderState::Stopped;
                Err(RecordingError::ThreadPanicked)
            }
        }
    }

    /// Start feeding captured blocks to the encoder
    pub fn resume(&mut self) -> Result<(), RecordingError> {
        match self.state {
            RecorderState::Armed | RecorderState::Recording => {
                self.control.should_record.store(true, Ordering::SeqCst);
                self.state = RecorderState::Recording;
                Ok(())
            }
            state => Err(RecordingError::InvalidState {
                state,
                action: "resume",
            }),
        }
    }

    /// Stop capturing and flush the encoder; the device stays open
    pub fn pause(&mut self) -> Result<(), RecordingError> {
        match self.state {
            RecorderState::Armed | RecorderState::Recording => {
                self.control.should_record.store(false, Ordering::SeqCst);
                self.state = RecorderState::Armed;
                Ok(())
            }
            state => Err(RecordingError::InvalidState {
                state,
                action: "pause",
            }),
        }
    }

    /// Release the device and encoder. The recorder cannot be reused.
    pub fn stop(&mut self) -> Result<(), RecordingError> {
        self.control.should_record.store(false, Ordering::SeqCst);
        self.control.should_run.store(false, Ordering::SeqCst);
        self.state = RecorderState::Stopped;

        match self.handle.take() {
            Some(handle) => handle.join().map_err(|_| RecordingError::ThreadPanicked),
            None => Ok(()),
        }
    }
}

impl Drop for SegmentRecorder {
    fn drop(&mut self) {
        if self.handle.is_some() {
            let _ = self.stop();
        }
    }
}

/// Everything the recording thread owns
struct Session {
    input: Arc<dyn AudioInput>,
    codec: Arc<dyn StreamCodec>,
    path: PathBuf,
    format: StreamFormat,
    callback: RecorderCallback,
    control: Arc<Control>,
    last: Arc<Mutex<AmplitudeSnapshot>>,
}

impl Session {
    fn run(self, armed: mpsc::Sender<Result<(), RecordingError>>) {
        let mut capture = match self.input.open_capture(self.format) {
            Ok(capture) => capture,
            Err(e) => {
                let _ = armed.send(Err(e.into()));
                return;
            }
        };
        let mut encoder = match self.codec.open_encoder(&self.path, self.format) {
            Ok(encoder) => encoder,
            Err(e) => {
                let _ = armed.send(Err(e.into()));
                return;
            }
        };
        let _ = armed.send(Ok(()));

        self.capture_loop(capture.as_mut(), encoder.as_mut());

        if let Err(e) = encoder.close() {
            log::error!("Failed to close {}: {}", self.path.display(), e);
            (self.callback)(RecorderEvent::WriteError(e));
        }
        drop(encoder);
        drop(capture);
        (self.callback)(RecorderEvent::Stopped);
    }

    fn capture_loop(&self, capture: &mut dyn CaptureStream, encoder: &mut dyn StreamEncoder) {
        let frame_size = self.format.frame_size();
        let mut buf = vec![0u8; capture.min_buffer_size().max(frame_size)];
        let mut capturing = false;

        while self.control.should_run.load(Ordering::SeqCst) {
            let wanted = self.control.should_record.load(Ordering::SeqCst);
            if wanted != capturing {
                if wanted {
                    match capture.start() {
                        Ok(()) => capturing = true,
                        Err(e) => {
                            log::warn!("Failed to start capture: {}", e);
                            (self.callback)(RecorderEvent::ReadError(e));
                            thread::sleep(READ_ERROR_BACKOFF);
                            continue;
                        }
                    }
                } else {
                    capturing = false;
                    if let Err(e) = capture.stop() {
                        log::warn!("Failed to stop capture: {}", e);
                    }
                    if let Err(e) = encoder.flush() {
                        (self.callback)(RecorderEvent::WriteError(e));
                    }
                }
            }

            if !capturing {
                thread::sleep(PAUSED_POLL);
                continue;
            }

            match capture.read(&mut buf) {
                Ok(0) => thread::sleep(PAUSED_POLL),
                Ok(n) => {
                    if let Err(e) = encoder.write_block(&buf[..n]) {
                        log::warn!("Encoder rejected block: {}", e);
                        (self.callback)(RecorderEvent::WriteError(e));
                    }
                    let snapshot = AmplitudeSnapshot::new(
                        encoder.position_ms(),
                        encoder.peak_amplitude(),
                        encoder.average_amplitude(),
                    );
                    *self.last.lock().unwrap_or_else(PoisonError::into_inner) = snapshot;
                    (self.callback)(RecorderEvent::Amplitudes(snapshot));
                }
                Err(e) => {
                    log::warn!("Capture read failed: {}", e);
                    (self.callback)(RecorderEvent::ReadError(e));
                    thread::sleep(READ_ERROR_BACKOFF);
                }
            }
        }

        if capturing {
            if let Err(e) = capture.stop() {
                log::warn!("Failed to stop capture: {}", e);
            }
        }
    }
}
