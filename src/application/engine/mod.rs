//! Playback engine
//!
//! A single-clip player driven by a background control loop. Callers state
//! what they want (`play`, `cue`, `pause`, `resume`, `stop`) and the loop
//! walks the player there through the decision table, so a burst of
//! requests collapses into whatever was asked for last.

mod control;
mod observers;
mod ticker;

use std::sync::{mpsc, Arc, Condvar, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use thiserror::Error;

use self::control::{Inner, Shared};
use self::observers::{spawn_dispatcher, ObserverRegistry, SharedRegistry};
use super::ports::BackendFactory;
use crate::domain::clip::Clip;
use crate::domain::config::AudioConfig;
use crate::domain::playback::{PlaybackStatus, PlayerState};
use crate::domain::recording::Duration;

pub use observers::{ObserverId, PlaybackObserver};

/// Playback engine errors
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Failed to start playback thread: {0}")]
    Spawn(String),
}

/// Configuration for the playback engine
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Interval between progress notifications while playing
    pub progress_interval: Duration,
    /// Longest the control loop sleeps without being woken
    pub idle_wait: Duration,
    /// Delay before retrying a resume the backend refused
    pub retry_wait: Duration,
    /// Extensions (lowercase, no dot) of sources decoded locally
    pub local_extensions: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from_config(&AudioConfig::defaults())
    }
}

impl EngineConfig {
    pub fn from_config(config: &AudioConfig) -> Self {
        Self {
            progress_interval: config.progress_interval_or_default(),
            idle_wait: config.idle_wait_or_default(),
            retry_wait: config.retry_wait_or_default(),
            local_extensions: config.local_extensions_or_default(),
        }
    }
}

/// Plays one clip at a time and reports progress to observers
pub struct PlaybackEngine {
    shared: Arc<Shared>,
    observers: SharedRegistry,
    control: Mutex<Option<JoinHandle<()>>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl PlaybackEngine {
    /// Start the control loop and the notification thread
    pub fn new(config: EngineConfig, factory: Arc<dyn BackendFactory>) -> Result<Self, EngineError> {
        let observers: SharedRegistry = Arc::new(Mutex::new(ObserverRegistry::default()));
        let (tx, rx) = mpsc::channel();
        let dispatcher = spawn_dispatcher(rx, Arc::clone(&observers))
            .map_err(|e| EngineError::Spawn(e.to_string()))?;

        let shared = Arc::new(Shared {
            inner: Mutex::new(Inner::new()),
            wake: Condvar::new(),
            config,
            factory,
            notifier: Mutex::new(Some(tx)),
        });

        let looped = Arc::clone(&shared);
        let control = thread::Builder::new()
            .name("playback-control".to_string())
            .spawn(move || looped.run());
        let control = match control {
            Ok(handle) => handle,
            Err(e) => {
                shared
                    .notifier
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .take();
                let _ = dispatcher.join();
                return Err(EngineError::Spawn(e.to_string()));
            }
        };

        Ok(Self {
            shared,
            observers,
            control: Mutex::new(Some(control)),
            dispatcher: Mutex::new(Some(dispatcher)),
        })
    }

    /// Bind `clip` and play it.
    ///
    /// A different clip, or `force_restart`, tears down the current one
    /// first; otherwise playback continues where it is.
    pub fn play(&self, clip: Clip, force_restart: bool) {
        self.request(clip, force_restart, PlayerState::Playing);
    }

    /// Bind `clip` and prepare it without playing
    pub fn cue(&self, clip: Clip) {
        self.request(clip, false, PlayerState::Paused);
    }

    fn request(&self, clip: Clip, force_restart: bool, desired: PlayerState) {
        let mut inner = self.shared.lock();
        if !inner.running {
            return;
        }
        let same_clip = inner.clip.as_ref().is_some_and(|bound| bound.id == clip.id);
        if !same_clip || force_restart {
            log::info!("Binding clip {} ({})", clip.id, clip.title);
            inner.clip = Some(clip);
            inner.reset = true;
        }
        inner.pending = desired;
        self.shared.poke(&mut inner);
    }

    /// Pause the bound clip; ignored when nothing is bound
    pub fn pause(&self) {
        self.desire(PlayerState::Paused);
    }

    /// Resume the bound clip; ignored when nothing is bound
    pub fn resume(&self) {
        self.desire(PlayerState::Playing);
    }

    fn desire(&self, desired: PlayerState) {
        let mut inner = self.shared.lock();
        if !inner.running {
            return;
        }
        if inner.clip.is_none() {
            log::debug!("No clip bound; ignoring request for {}", desired);
            return;
        }
        inner.pending = desired;
        self.shared.poke(&mut inner);
    }

    /// Stop playback and unbind the clip
    pub fn stop(&self) {
        let mut inner = self.shared.lock();
        if !inner.running {
            return;
        }
        inner.pending = PlayerState::None;
        self.shared.poke(&mut inner);
    }

    pub fn current_state(&self) -> PlayerState {
        self.shared.lock().state
    }

    /// Snapshot of state, progress and the bound clip
    pub fn status(&self) -> PlaybackStatus {
        let inner = self.shared.lock();
        inner.status(inner.state)
    }

    /// Register an observer. Notifications arrive in order on a dedicated
    /// thread; observers must not call `shutdown` from the callback.
    pub fn add_observer(&self, observer: impl Fn(&PlaybackStatus) + Send + Sync + 'static) -> ObserverId {
        self.observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .add(Arc::new(observer))
    }

    pub fn remove_observer(&self, id: ObserverId) -> bool {
        self.observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
    }

    /// Stop the control loop after a final transition towards `None`, then
    /// deliver the remaining notifications. Idempotent.
    pub fn shutdown(&self) {
        {
            let mut inner = self.shared.lock();
            inner.running = false;
            self.shared.poke(&mut inner);
        }

        let control = self
            .control
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = control {
            if handle.join().is_err() {
                log::error!("Playback control thread panicked");
            }
        }

        self.shared
            .notifier
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        let dispatcher = self
            .dispatcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = dispatcher {
            if handle.thread().id() != thread::current().id() && handle.join().is_err() {
                log::error!("Playback observer thread panicked");
            }
        }
    }
}

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}
