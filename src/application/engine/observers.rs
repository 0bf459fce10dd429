//! Observer registry and asynchronous notification delivery

use std::sync::{mpsc, Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use crate::domain::playback::PlaybackStatus;

/// Callback receiving playback state changes and progress ticks
pub type PlaybackObserver = Arc<dyn Fn(&PlaybackStatus) + Send + Sync>;

/// Handle returned by `add_observer`, used to unregister
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

#[derive(Default)]
pub(super) struct ObserverRegistry {
    next_id: u64,
    observers: Vec<(ObserverId, PlaybackObserver)>,
}

impl ObserverRegistry {
    pub(super) fn add(&mut self, observer: PlaybackObserver) -> ObserverId {
        self.next_id += 1;
        let id = ObserverId(self.next_id);
        self.observers.push((id, observer));
        id
    }

    pub(super) fn remove(&mut self, id: ObserverId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(existing, _)| *existing != id);
        self.observers.len() != before
    }

    fn snapshot(&self) -> Vec<PlaybackObserver> {
        self.observers.iter().map(|(_, o)| Arc::clone(o)).collect()
    }
}

pub(super) type SharedRegistry = Arc<Mutex<ObserverRegistry>>;

/// Deliver every status from `rx` to the registered observers, in order,
/// until the sending side is dropped. Slow observers only delay this thread.
pub(super) fn spawn_dispatcher(
    rx: mpsc::Receiver<PlaybackStatus>,
    registry: SharedRegistry,
) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("playback-observers".to_string())
        .spawn(move || {
            for status in rx {
                let observers = registry
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .snapshot();
                for observer in observers {
                    observer(&status);
                }
            }
        })
}
