//! Clip recorder: segmented recording into one clip
//!
//! Each start/stop cycle records one segment. Amplitudes reported upward are
//! offset by the duration of the segments recorded before, so positions keep
//! increasing across restarts.

use std::fs;
use std::io;
use std::sync::{Arc, Mutex, PoisonError};

use super::ports::{AudioInput, CaptureError, CodecError, StreamCodec};
use super::segment_recorder::{RecorderEvent, RecordingError, SegmentRecorder};
use crate::domain::clip::Clip;
use crate::domain::recording::{AmplitudeSnapshot, StreamFormat};

/// Events reported to the clip recorder's observer
#[derive(Debug, Clone)]
pub enum ClipRecorderEvent {
    /// Position is relative to the start of the clip
    Amplitudes(AmplitudeSnapshot),
    ReadError(CaptureError),
    WriteError(CodecError),
    /// A session ended; `duration` is the clip's new total in seconds
    EndOfRecording {
        duration: f64,
        amplitudes: AmplitudeSnapshot,
    },
}

/// Callback receiving clip recorder events
pub type ClipRecorderCallback = Arc<dyn Fn(ClipRecorderEvent) + Send + Sync>;

type SharedObserver = Arc<Mutex<Option<ClipRecorderCallback>>>;

fn emit(observer: &SharedObserver, event: ClipRecorderEvent) {
    let callback = observer
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone();
    if let Some(callback) = callback {
        callback(event);
    }
}

/// The segment currently being recorded
struct ActiveSession {
    recorder: SegmentRecorder,
    segment: usize,
}

/// Records a clip as a sequence of segments
pub struct ClipRecorder {
    input: Arc<dyn AudioInput>,
    codec: Arc<dyn StreamCodec>,
    format: StreamFormat,
    clip: Clip,
    session: Option<ActiveSession>,
    /// Accumulated statistics of every finished segment
    total: AmplitudeSnapshot,
    observer: SharedObserver,
}

impl ClipRecorder {
    pub fn new(
        input: Arc<dyn AudioInput>,
        codec: Arc<dyn StreamCodec>,
        format: StreamFormat,
        clip: Clip,
    ) -> Self {
        let total = AmplitudeSnapshot::new((clip.duration() * 1000.0).round() as u64, 0.0, 0.0);
        Self {
            input,
            codec,
            format,
            clip,
            session: None,
            total,
            observer: Arc::new(Mutex::new(None)),
        }
    }

    pub fn set_observer(&self, callback: ClipRecorderCallback) {
        *self.observer.lock().unwrap_or_else(PoisonError::into_inner) = Some(callback);
    }

    pub fn clear_observer(&self) {
        *self.observer.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn clip(&self) -> &Clip {
        &self.clip
    }

    /// Hand the clip back, stopping any session first
    pub fn into_clip(mut self) -> Clip {
        if let Err(e) = self.stop() {
            log::warn!("Failed to stop recording cleanly: {}", e);
        }
        std::mem::replace(&mut self.clip, Clip::new("", ""))
    }

    pub fn is_recording(&self) -> bool {
        self.session.is_some()
    }

    /// Seconds recorded in finished segments
    pub fn duration(&self) -> f64 {
        self.clip.duration()
    }

    /// Statistics accumulated over finished segments
    pub fn amplitudes(&self) -> AmplitudeSnapshot {
        self.total
    }

    /// Start recording a new segment, or re-record the last one if it never
    /// captured anything.
    pub fn start(&mut self) -> Result<(), RecordingError> {
        if self.session.is_some() {
            log::warn!("Recording already in progress; stopping it first");
            self.stop()?;
        }

        let segment = self.clip.open_segment();
        let path = self.clip.segments[segment].path.clone();
        let offset = self.total.position_ms;

        let observer = Arc::clone(&self.observer);
        let callback = Arc::new(move |event: RecorderEvent| match event {
            RecorderEvent::Amplitudes(snapshot) => {
                emit(&observer, ClipRecorderEvent::Amplitudes(snapshot.offset(offset)))
            }
            RecorderEvent::ReadError(e) => emit(&observer, ClipRecorderEvent::ReadError(e)),
            RecorderEvent::WriteError(e) => emit(&observer, ClipRecorderEvent::WriteError(e)),
            RecorderEvent::Stopped => log::debug!("Segment recorder released its device"),
        });

        let mut recorder = SegmentRecorder::new(
            Arc::clone(&self.input),
            Arc::clone(&self.codec),
            path,
            self.format,
            callback,
        );
        recorder.arm()?;
        recorder.resume()?;

        log::info!(
            "Recording segment {} of clip {}",
            self.clip.segments[segment].sequence,
            self.clip.id
        );
        self.session = Some(ActiveSession { recorder, segment });
        Ok(())
    }

    /// Stop the current session and account for the finished segment.
    /// Does nothing when not recording.
    pub fn stop(&mut self) -> Result<(), RecordingError> {
        let Some(mut session) = self.session.take() else {
            return Ok(());
        };

        let paused = session.recorder.pause();
        let stopped = session.recorder.stop();

        let last = session.recorder.last_snapshot();
        self.total.accumulate(&last);
        self.clip
            .finalize_segment(session.segment, last.position_ms as f64 / 1000.0);

        log::info!(
            "Finished segment of {:.2}s, clip {} is now {:.2}s",
            last.position_secs(),
            self.clip.id,
            self.clip.duration()
        );
        emit(
            &self.observer,
            ClipRecorderEvent::EndOfRecording {
                duration: self.clip.duration(),
                amplitudes: self.total,
            },
        );

        paused.and(stopped)
    }

    /// Stop any session and delete every recorded file so the clip can be
    /// recorded again from scratch
    pub fn discard(&mut self) -> Result<(), RecordingError> {
        let stopped = self.stop();

        for path in self.clip.owned_files() {
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(RecordingError::Io(format!("{}: {}", path.display(), e)));
                }
            }
        }
        self.clip.clear_recording();
        self.total = AmplitudeSnapshot::default();
        log::info!("Discarded recording of clip {}", self.clip.id);
        stopped
    }
}

impl Drop for ClipRecorder {
    fn drop(&mut self) {
        if self.session.is_some() {
            let _ = self.stop();
        }
    }
}
