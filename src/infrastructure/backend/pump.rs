//! Decode-to-render pump shared by both backends
//!
//! The player thread owns the decoder and the render device. It keeps at
//! most `HIGH_WATER_MS` of audio queued on the device and reads nothing
//! while paused, so pausing never races ahead of the listener.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::application::ports::{AudioOutput, BackendError, BackendListener, StreamDecoder};

/// Audio kept queued on the render device ahead of playback
const HIGH_WATER_MS: u64 = 500;

const POLL: Duration = Duration::from_millis(10);

/// Flags shared between a backend and its player thread
#[derive(Debug)]
pub(super) struct PlayerControl {
    should_run: AtomicBool,
    paused: AtomicBool,
    ready: AtomicBool,
}

impl PlayerControl {
    fn new() -> Self {
        Self {
            should_run: AtomicBool::new(true),
            paused: AtomicBool::new(true),
            ready: AtomicBool::new(false),
        }
    }

    pub(super) fn is_running(&self) -> bool {
        self.should_run.load(Ordering::SeqCst)
    }
}

/// How the pump ended without error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum PumpEnd {
    Finished,
    Stopped,
}

/// Play `decoder` on a freshly opened render device until the stream has
/// drained or the backend is stopped. Reports `ready` once the device is
/// open.
pub(super) fn play_stream(
    decoder: &mut dyn StreamDecoder,
    output: &dyn AudioOutput,
    control: &PlayerControl,
    listener: &BackendListener,
) -> Result<PumpEnd, BackendError> {
    let format = decoder.format();
    let mut render = output.open_render(format)?;
    let mut paused = true;
    render.set_paused(true);

    control.ready.store(true, Ordering::SeqCst);
    log::debug!("Player ready at {}", format);
    listener.ready();

    let mut buf = vec![0u8; decoder.min_block_size().max(format.frame_size())];
    let mut end_of_stream = false;
    loop {
        if !control.is_running() {
            render.stop();
            return Ok(PumpEnd::Stopped);
        }

        let wanted = control.paused.load(Ordering::SeqCst);
        if wanted != paused {
            render.set_paused(wanted);
            paused = wanted;
        }

        if end_of_stream {
            if render.queued_ms() == 0 {
                return Ok(PumpEnd::Finished);
            }
            thread::sleep(POLL);
            continue;
        }

        if paused || render.queued_ms() >= HIGH_WATER_MS {
            thread::sleep(POLL);
            continue;
        }

        match decoder.read_block(&mut buf)? {
            0 => {
                log::debug!("Decoder reached end of stream at {}ms", decoder.position_ms());
                end_of_stream = true;
            }
            n => render.write(&buf[..n])?,
        }
    }
}

/// Turn the pump outcome into the listener event the engine expects.
/// Errors raised because the backend was being stopped are not reported.
pub(super) fn report(
    result: Result<PumpEnd, BackendError>,
    control: &PlayerControl,
    listener: &BackendListener,
) {
    match result {
        Ok(PumpEnd::Finished) => listener.finished(),
        Ok(PumpEnd::Stopped) => {}
        Err(e) if !control.is_running() => log::debug!("Ignoring error after stop: {}", e),
        Err(e) => {
            log::error!("Player failed: {}", e);
            listener.failed(e);
        }
    }
}

/// A backend's player thread and the flags steering it
#[derive(Debug)]
pub(super) struct PlayerHandle {
    control: Arc<PlayerControl>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl PlayerHandle {
    pub(super) fn new() -> Self {
        Self {
            control: Arc::new(PlayerControl::new()),
            thread: Mutex::new(None),
        }
    }

    /// Spawn the player thread running `body` with the shared flags
    pub(super) fn spawn(
        &self,
        name: &str,
        body: impl FnOnce(Arc<PlayerControl>) + Send + 'static,
    ) -> Result<(), BackendError> {
        let mut slot = self.thread.lock().unwrap_or_else(PoisonError::into_inner);
        if slot.is_some() {
            return Err(BackendError::Configuration(
                "backend already prepared".to_string(),
            ));
        }
        let control = Arc::clone(&self.control);
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || body(control))
            .map_err(|e| BackendError::Io(format!("Failed to spawn player thread: {}", e)))?;
        *slot = Some(handle);
        Ok(())
    }

    pub(super) fn pause(&self) {
        self.control.paused.store(true, Ordering::SeqCst);
    }

    /// Unpause if the player is ready; `false` otherwise
    pub(super) fn resume(&self) -> bool {
        if !self.control.ready.load(Ordering::SeqCst) || !self.control.is_running() {
            return false;
        }
        self.control.paused.store(false, Ordering::SeqCst);
        true
    }

    /// Ask the player thread to finish, without waiting
    pub(super) fn signal_stop(&self) {
        self.control.should_run.store(false, Ordering::SeqCst);
    }

    pub(super) fn join(&self) {
        let handle = self
            .thread
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if handle.thread().id() == thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                log::error!("Player thread panicked");
            }
        }
    }
}
