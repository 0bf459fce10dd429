//! In-memory fakes of the device and backend ports shared by the
//! integration tests

#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use clip_audio::application::ports::{
    AudioInput, AudioOutput, BackendError, BackendFactory, BackendListener, CaptureError,
    CaptureStream, PlaybackBackend, RenderError, RenderStream, StreamCodec,
};
use clip_audio::application::EngineConfig;
use clip_audio::domain::clip::Clip;
use clip_audio::domain::playback::BackendKind;
use clip_audio::domain::recording::{samples_to_pcm, Duration as ConfigDuration, StreamFormat};
use clip_audio::infrastructure::codec::{encode_to_flac, FlacCodec};

/// Poll `condition` every 10ms until it holds or `timeout` passes
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(10));
    }
    condition()
}

/// Constant-level sample for `amplitude` in 0..1
pub fn level(amplitude: f32, format: StreamFormat) -> i32 {
    (amplitude * format.full_scale() as f32).round() as i32
}

/// Write a FLAC file of `seconds` at a constant `amplitude`
pub fn write_flac(path: &Path, format: StreamFormat, seconds: f64, amplitude: f32) {
    let frames = (seconds * format.sample_rate as f64).round() as usize;
    let samples = vec![level(amplitude, format); frames * format.channels as usize];
    let bytes = encode_to_flac(&samples, format).unwrap();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, bytes).unwrap();
}

/// Decode a whole FLAC file, returning its length in milliseconds
pub fn decoded_ms(path: &Path) -> u64 {
    let mut decoder = FlacCodec::new().open_decoder(path).unwrap();
    let mut buf = vec![0u8; decoder.min_block_size()];
    while decoder.read_block(&mut buf).unwrap() > 0 {}
    decoder.position_ms()
}

/// Engine timing suited to tests
pub fn test_engine_config() -> EngineConfig {
    EngineConfig {
        progress_interval: ConfigDuration::from_millis(100),
        idle_wait: ConfigDuration::from_secs(60),
        retry_wait: ConfigDuration::from_millis(20),
        local_extensions: vec!["flac".to_string()],
    }
}

// ---------------------------------------------------------------------------
// Capture

/// One recording session's worth of scripted input
#[derive(Debug, Clone, Copy)]
pub struct Take {
    pub amplitude: f32,
    pub duration_ms: u64,
}

impl Take {
    pub fn new(amplitude: f32, duration_ms: u64) -> Self {
        Self {
            amplitude,
            duration_ms,
        }
    }
}

/// Capture device handing out one scripted take per opened stream.
/// Opening with no takes left fails with `Unavailable`.
pub struct FakeInput {
    takes: Mutex<VecDeque<Take>>,
    opened: AtomicUsize,
}

impl FakeInput {
    pub fn new(takes: impl IntoIterator<Item = Take>) -> Arc<Self> {
        Arc::new(Self {
            takes: Mutex::new(takes.into_iter().collect()),
            opened: AtomicUsize::new(0),
        })
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

impl AudioInput for FakeInput {
    fn open_capture(&self, format: StreamFormat) -> Result<Box<dyn CaptureStream>, CaptureError> {
        let take = self
            .takes
            .lock()
            .unwrap()
            .pop_front()
            .ok_or(CaptureError::Unavailable)?;
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeCapture {
            format,
            sample: level(take.amplitude, format),
            remaining: format.ms_to_frames(take.duration_ms),
            started: false,
        }))
    }
}

/// Produces the take's frames as fast as they are read, then nothing
struct FakeCapture {
    format: StreamFormat,
    sample: i32,
    remaining: u64,
    started: bool,
}

impl CaptureStream for FakeCapture {
    fn format(&self) -> StreamFormat {
        self.format
    }

    fn min_buffer_size(&self) -> usize {
        self.format.ms_to_frames(100) as usize * self.format.frame_size()
    }

    fn start(&mut self) -> Result<(), CaptureError> {
        self.started = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), CaptureError> {
        self.started = false;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, CaptureError> {
        if !self.started {
            return Err(CaptureError::InvalidOperation("not started".to_string()));
        }
        let frames = ((buf.len() / self.format.frame_size()) as u64).min(self.remaining);
        if frames == 0 {
            return Ok(0);
        }
        self.remaining -= frames;

        let samples = vec![self.sample; frames as usize * self.format.channels as usize];
        let mut pcm = Vec::with_capacity(buf.len());
        samples_to_pcm(&samples, self.format.bits_per_sample, &mut pcm);
        buf[..pcm.len()].copy_from_slice(&pcm);
        Ok(pcm.len())
    }
}

// ---------------------------------------------------------------------------
// Render

/// Output device draining its queue in real time while unpaused
#[derive(Default)]
pub struct FakeOutput {
    played_ms: Arc<AtomicU64>,
    opened: AtomicUsize,
}

impl FakeOutput {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Milliseconds written to every stream opened so far
    pub fn written_ms(&self) -> u64 {
        self.played_ms.load(Ordering::SeqCst)
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

impl AudioOutput for FakeOutput {
    fn open_render(&self, format: StreamFormat) -> Result<Box<dyn RenderStream>, RenderError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeRender {
            format,
            queued_ms: 0.0,
            paused: true,
            last: Instant::now(),
            written: Arc::clone(&self.played_ms),
        }))
    }
}

struct FakeRender {
    format: StreamFormat,
    queued_ms: f64,
    paused: bool,
    last: Instant,
    written: Arc<AtomicU64>,
}

impl FakeRender {
    fn advance(&mut self) {
        let now = Instant::now();
        if !self.paused {
            let elapsed = now.duration_since(self.last).as_secs_f64() * 1000.0;
            self.queued_ms = (self.queued_ms - elapsed).max(0.0);
        }
        self.last = now;
    }
}

impl RenderStream for FakeRender {
    fn write(&mut self, pcm: &[u8]) -> Result<(), RenderError> {
        self.advance();
        let ms = self.format.bytes_to_ms(pcm.len());
        self.queued_ms += ms as f64;
        self.written.fetch_add(ms, Ordering::SeqCst);
        Ok(())
    }

    fn queued_ms(&mut self) -> u64 {
        self.advance();
        self.queued_ms.ceil() as u64
    }

    fn set_paused(&mut self, paused: bool) {
        self.advance();
        self.paused = paused;
    }

    fn stop(&mut self) {
        self.queued_ms = 0.0;
    }
}

// ---------------------------------------------------------------------------
// Backends

/// Shared, ordered record of backend calls
pub type CallLog = Arc<Mutex<Vec<String>>>;

/// Behaviour of every backend a `ScriptedFactory` builds
#[derive(Debug, Clone)]
pub struct Script {
    pub prepare_delay: Duration,
    pub fail_prepare: bool,
    /// Played time after which `finished` is reported
    pub length: Duration,
    /// Number of resumes refused before one succeeds
    pub refuse_resumes: usize,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            prepare_delay: Duration::from_millis(30),
            fail_prepare: false,
            length: Duration::from_secs(30),
            refuse_resumes: 0,
        }
    }
}

/// Backend factory whose backends follow a `Script` and log their calls
pub struct ScriptedFactory {
    script: Script,
    log: CallLog,
    live: Arc<AtomicUsize>,
    max_live: Arc<AtomicUsize>,
}

impl ScriptedFactory {
    pub fn new(script: Script) -> Arc<Self> {
        Arc::new(Self {
            script,
            log: Arc::new(Mutex::new(Vec::new())),
            live: Arc::new(AtomicUsize::new(0)),
            max_live: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn calls(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    /// Most backends ever prepared and not yet stopped at the same time
    pub fn max_live(&self) -> usize {
        self.max_live.load(Ordering::SeqCst)
    }
}

impl BackendFactory for ScriptedFactory {
    fn create(&self, kind: BackendKind) -> Result<Arc<dyn PlaybackBackend>, BackendError> {
        Ok(Arc::new(ScriptedBackend {
            kind,
            script: self.script.clone(),
            log: Arc::clone(&self.log),
            live: Arc::clone(&self.live),
            max_live: Arc::clone(&self.max_live),
            title: Mutex::new(String::new()),
            state: Arc::new(BackendFlags::default()),
            refused: AtomicUsize::new(0),
            threads: Mutex::new(Vec::new()),
        }))
    }
}

#[derive(Default)]
struct BackendFlags {
    ready: AtomicBool,
    playing: AtomicBool,
    stopped: AtomicBool,
    prepared: AtomicBool,
}

struct ScriptedBackend {
    kind: BackendKind,
    script: Script,
    log: CallLog,
    live: Arc<AtomicUsize>,
    max_live: Arc<AtomicUsize>,
    title: Mutex<String>,
    state: Arc<BackendFlags>,
    refused: AtomicUsize,
    threads: Mutex<Vec<thread::JoinHandle<()>>>,
}

impl ScriptedBackend {
    fn record(&self, call: &str) {
        let title = self.title.lock().unwrap().clone();
        self.log.lock().unwrap().push(format!("{} {}", call, title));
    }
}

impl PlaybackBackend for ScriptedBackend {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn prepare(&self, clip: &Clip, listener: BackendListener) -> Result<(), BackendError> {
        *self.title.lock().unwrap() = clip.title.clone();
        self.record("prepare");
        self.state.prepared.store(true, Ordering::SeqCst);
        let live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_live.fetch_max(live, Ordering::SeqCst);

        let script = self.script.clone();
        let flags = Arc::clone(&self.state);
        let handle = thread::spawn(move || {
            thread::sleep(script.prepare_delay);
            if flags.stopped.load(Ordering::SeqCst) {
                return;
            }
            if script.fail_prepare {
                listener.failed(BackendError::Format("scripted failure".to_string()));
                return;
            }
            flags.ready.store(true, Ordering::SeqCst);
            listener.ready();

            // Playback clock: counts only time spent playing
            let mut played = Duration::ZERO;
            let step = Duration::from_millis(5);
            while !flags.stopped.load(Ordering::SeqCst) {
                thread::sleep(step);
                if flags.playing.load(Ordering::SeqCst) {
                    played += step;
                    if played >= script.length {
                        listener.finished();
                        return;
                    }
                }
            }
        });
        self.threads.lock().unwrap().push(handle);
        Ok(())
    }

    fn pause(&self) {
        self.record("pause");
        self.state.playing.store(false, Ordering::SeqCst);
    }

    fn resume(&self) -> bool {
        if !self.state.ready.load(Ordering::SeqCst)
            || self.refused.load(Ordering::SeqCst) < self.script.refuse_resumes
        {
            self.refused.fetch_add(1, Ordering::SeqCst);
            self.record("refuse");
            return false;
        }
        self.record("resume");
        self.state.playing.store(true, Ordering::SeqCst);
        true
    }

    fn stop(&self) {
        if self.state.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        self.record("stop");
        for handle in self.threads.lock().unwrap().drain(..) {
            let _ = handle.join();
        }
        if self.state.prepared.load(Ordering::SeqCst) {
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
    }
}
