//! Control loop driving the playback state machine
//!
//! Public calls only record the desired state and wake the loop. The loop
//! reconciles the current state with the desired one through the decision
//! table, one action per pass. Backend work happens outside the lock; state
//! is mutated before the work starts so a concurrent call observes the
//! transition already under way.

use std::collections::VecDeque;
use std::sync::{mpsc, Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use super::ticker::Ticker;
use super::EngineConfig;
use crate::application::ports::{
    BackendError, BackendEvent, BackendFactory, BackendListener, PlaybackBackend,
};
use crate::domain::clip::Clip;
use crate::domain::playback::{decide, Action, BackendKind, PlaybackStatus, PlayerState};

/// State guarded by the engine lock
pub(super) struct Inner {
    /// Current state; may be the `Buffering` pseudo-state while playing
    pub(super) state: PlayerState,
    /// Desired state; `Error` when a backend failure is waiting to be handled
    pub(super) pending: PlayerState,
    /// The bound clip must be prepared from scratch on the next pass
    pub(super) reset: bool,
    pub(super) woken: bool,
    pub(super) running: bool,
    pub(super) clip: Option<Clip>,
    backend: Option<Arc<dyn PlaybackBackend>>,
    /// Bumped whenever a backend is torn down; events from older backends
    /// are dropped
    generation: u64,
    inbox: VecDeque<(u64, BackendEvent)>,
    /// Seconds played
    progress: f64,
    last_tick: Option<Instant>,
    ticker: Option<Ticker>,
    ticker_id: u64,
}

impl Inner {
    pub(super) fn new() -> Self {
        Self {
            state: PlayerState::None,
            pending: PlayerState::None,
            reset: false,
            woken: false,
            running: true,
            clip: None,
            backend: None,
            generation: 0,
            inbox: VecDeque::new(),
            progress: 0.0,
            last_tick: None,
            ticker: None,
            ticker_id: 0,
        }
    }

    /// Progress including time played since the last tick
    pub(super) fn progress_now(&self) -> f64 {
        match (self.state, self.last_tick) {
            (PlayerState::Playing, Some(last)) => self.progress + last.elapsed().as_secs_f64(),
            _ => self.progress,
        }
    }

    pub(super) fn status(&self, state: PlayerState) -> PlaybackStatus {
        PlaybackStatus {
            state,
            progress: self.progress_now(),
            total: self.clip.as_ref().map_or(0.0, Clip::duration),
            clip_id: self.clip.as_ref().map(|c| c.id),
            title: self.clip.as_ref().map(|c| c.title.clone()),
        }
    }

    /// Fold wall time played since the last tick into `progress`
    fn account_progress(&mut self) {
        let now = Instant::now();
        if self.state == PlayerState::Playing {
            if let Some(last) = self.last_tick {
                self.progress += now.duration_since(last).as_secs_f64();
            }
        }
        self.last_tick = Some(now);
    }
}

/// Work decided under the lock, carried out after releasing it
#[derive(Default)]
struct Step {
    ticker: Option<Ticker>,
    teardown: Option<Arc<dyn PlaybackBackend>>,
    pause: Option<Arc<dyn PlaybackBackend>>,
    prepare: Option<(Clip, u64)>,
    resume: Option<(Arc<dyn PlaybackBackend>, u64)>,
}

pub(super) struct Shared {
    pub(super) inner: Mutex<Inner>,
    pub(super) wake: Condvar,
    pub(super) config: EngineConfig,
    pub(super) factory: Arc<dyn BackendFactory>,
    pub(super) notifier: Mutex<Option<mpsc::Sender<PlaybackStatus>>>,
}

impl Shared {
    pub(super) fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Wake the control loop; call with the lock held
    pub(super) fn poke(&self, inner: &mut Inner) {
        inner.woken = true;
        self.wake.notify_all();
    }

    fn notify(&self, inner: &Inner, state: PlayerState) {
        let status = inner.status(state);
        log::trace!("Playback status {} at {:.2}s", status.state, status.progress);
        if let Some(tx) = self
            .notifier
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            let _ = tx.send(status);
        }
    }

    /// Queue a backend event for the control loop
    fn post(&self, generation: u64, event: BackendEvent) {
        let mut inner = self.lock();
        if !inner.running {
            return;
        }
        inner.inbox.push_back((generation, event));
        self.poke(&mut inner);
    }

    pub(super) fn run(self: &Arc<Self>) {
        log::debug!("Playback control loop started");
        loop {
            let step = {
                let mut inner = self.lock();
                if !inner.running {
                    break;
                }
                self.plan(&mut inner)
            };

            let retry = self.perform(step);

            let timeout = if retry {
                self.config.retry_wait.as_std()
            } else {
                self.config.idle_wait.as_std()
            };
            let inner = self.lock();
            let _ = self
                .wake
                .wait_timeout_while(inner, timeout, |i| !i.woken && i.running)
                .unwrap_or_else(PoisonError::into_inner);
        }

        self.finish();
        log::debug!("Playback control loop stopped");
    }

    /// Final transition towards `None` on shutdown, tearing down whatever
    /// the table leaves behind
    fn finish(self: &Arc<Self>) {
        let step = {
            let mut inner = self.lock();
            inner.pending = PlayerState::None;
            inner.reset = false;
            let mut step = self.plan(&mut inner);
            self.tear_down(&mut inner, &mut step);
            step
        };
        self.perform(step);
    }

    fn plan(&self, inner: &mut Inner) -> Step {
        inner.woken = false;
        let mut step = Step::default();

        if inner.reset {
            // Whatever the outgoing backend reported no longer applies
            inner.inbox.clear();
        }
        while let Some((generation, event)) = inner.inbox.pop_front() {
            self.apply_event(inner, generation, event);
        }

        if inner.reset {
            inner.reset = false;
            log::debug!("Resetting player for a new clip");
            let was_active = inner.state != PlayerState::None;
            self.tear_down(inner, &mut step);
            inner.state = PlayerState::None;
            inner.progress = 0.0;

            // Stopped before the new clip was ever prepared
            if inner.pending == PlayerState::None {
                if was_active {
                    self.notify(inner, PlayerState::None);
                }
                inner.clip = None;
            }
        }

        let action = decide(inner.state, inner.pending);
        if !matches!(action, Action::None | Action::Ignore) {
            log::debug!("{} -> {}: {}", inner.state, inner.pending, action);
        }

        match action {
            Action::Prepare | Action::Start | Action::Reset => {
                self.tear_down(inner, &mut step);
                match inner.clip.clone() {
                    Some(clip) => {
                        inner.pending = match action {
                            Action::Start => PlayerState::Playing,
                            _ if inner.pending == PlayerState::Preparing => PlayerState::Paused,
                            _ => inner.pending,
                        };
                        inner.state = PlayerState::Preparing;
                        inner.progress = 0.0;
                        self.notify(inner, PlayerState::Preparing);
                        step.prepare = Some((clip, inner.generation));
                    }
                    None => {
                        inner.state = PlayerState::None;
                        inner.pending = PlayerState::None;
                    }
                }
            }
            Action::Stop => {
                self.tear_down(inner, &mut step);
                if inner.pending == PlayerState::Error {
                    self.notify(inner, PlayerState::Error);
                }
                inner.state = PlayerState::None;
                inner.pending = PlayerState::None;
                self.notify(inner, PlayerState::None);
                inner.clip = None;
                inner.progress = 0.0;
            }
            Action::Pause => {
                inner.account_progress();
                inner.state = PlayerState::Paused;
                step.pause = inner.backend.clone();
                self.notify(inner, PlayerState::Paused);
            }
            Action::Resume => match inner.backend.clone() {
                Some(backend) => step.resume = Some((backend, inner.generation)),
                None => {
                    log::error!("Cannot resume: no backend prepared");
                    inner.pending = PlayerState::Error;
                    inner.woken = true;
                }
            },
            Action::Ignore | Action::None => {}
        }

        if inner.state == PlayerState::None && inner.pending == PlayerState::None {
            inner.clip = None;
        }
        step
    }

    /// Detach the current backend and timer; the caller stops them later
    fn tear_down(&self, inner: &mut Inner, step: &mut Step) {
        if let Some(backend) = inner.backend.take() {
            step.teardown = Some(backend);
        }
        if let Some(ticker) = inner.ticker.take() {
            step.ticker = Some(ticker);
        }
        inner.generation += 1;
        inner.last_tick = None;
    }

    fn apply_event(&self, inner: &mut Inner, generation: u64, event: BackendEvent) {
        if generation != inner.generation {
            log::debug!("Dropping {:?} from a discarded backend", event);
            return;
        }

        match event {
            BackendEvent::Ready => {
                if inner.state == PlayerState::Preparing {
                    inner.state = PlayerState::Paused;
                    self.notify(inner, PlayerState::Paused);
                }
            }
            BackendEvent::Failed(e) => {
                log::error!("Playback failed: {}", e);
                inner.pending = PlayerState::Error;
            }
            BackendEvent::Finished => {
                log::debug!("Playback reached the end of the stream");
                inner.pending = PlayerState::None;
            }
            BackendEvent::Buffering(true) => {
                if inner.state == PlayerState::Playing {
                    inner.account_progress();
                    inner.state = PlayerState::Buffering;
                    self.notify(inner, PlayerState::Buffering);
                }
            }
            BackendEvent::Buffering(false) => {
                if inner.state == PlayerState::Buffering {
                    inner.state = PlayerState::Playing;
                    inner.last_tick = Some(Instant::now());
                    self.notify(inner, PlayerState::Playing);
                }
            }
        }
    }

    /// Carry out a planned step. Returns `true` when a resume was refused
    /// and should be retried after the retry wait.
    fn perform(self: &Arc<Self>, step: Step) -> bool {
        if let Some(ticker) = step.ticker {
            ticker.cancel();
        }
        if let Some(backend) = step.teardown {
            log::debug!("Stopping {} backend", backend.kind());
            backend.stop();
        }
        if let Some(backend) = step.pause {
            backend.pause();
        }
        if let Some((clip, generation)) = step.prepare {
            self.prepare(clip, generation);
        }
        if let Some((backend, generation)) = step.resume {
            if !backend.resume() {
                log::debug!("{} backend not ready to resume", backend.kind());
                return true;
            }
            self.on_resumed(generation);
        }
        false
    }

    fn prepare(self: &Arc<Self>, clip: Clip, generation: u64) {
        let weak = Arc::downgrade(self);
        let listener = BackendListener::new(move |event| {
            if let Some(shared) = weak.upgrade() {
                shared.post(generation, event);
            }
        });

        let result = BackendKind::select(&clip, &self.config.local_extensions)
            .ok_or(BackendError::NoSource)
            .and_then(|kind| {
                log::info!("Preparing clip {} with {} backend", clip.id, kind);
                self.factory.create(kind)
            })
            .and_then(|backend| backend.prepare(&clip, listener).map(|()| backend));

        let mut inner = self.lock();
        match result {
            Ok(backend) if inner.generation == generation => {
                inner.backend = Some(backend);
            }
            Ok(backend) => {
                drop(inner);
                backend.stop();
            }
            Err(e) => {
                log::error!("Failed to prepare clip {}: {}", clip.id, e);
                if inner.generation == generation {
                    inner.pending = PlayerState::Error;
                    self.poke(&mut inner);
                }
            }
        }
    }

    fn on_resumed(self: &Arc<Self>, generation: u64) {
        let mut inner = self.lock();
        if inner.generation != generation || inner.state != PlayerState::Paused {
            return;
        }

        inner.state = PlayerState::Playing;
        inner.last_tick = Some(Instant::now());
        if inner.ticker.is_none() {
            inner.progress = 0.0;
            inner.ticker_id += 1;
            let id = inner.ticker_id;
            let weak = Arc::downgrade(self);
            let started = Ticker::start(self.config.progress_interval.as_std(), move || {
                weak.upgrade().is_some_and(|shared| shared.tick(id))
            });
            match started {
                Ok(ticker) => inner.ticker = Some(ticker),
                Err(e) => log::warn!("Failed to start progress timer: {}", e),
            }
        }
        self.notify(&inner, PlayerState::Playing);
    }

    /// Progress tick; returns `false` once this timer has been replaced
    fn tick(&self, id: u64) -> bool {
        let mut inner = self.lock();
        if !inner.running || inner.ticker.is_none() || inner.ticker_id != id {
            return false;
        }
        if inner.state == PlayerState::Playing {
            inner.account_progress();
            self.notify(&inner, PlayerState::Playing);
        }
        true
    }
}
