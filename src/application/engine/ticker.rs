//! Fixed-interval progress timer thread

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Calls a tick function every interval until cancelled or the function
/// returns `false`.
pub(super) struct Ticker {
    cancelled: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

impl Ticker {
    pub(super) fn start(
        interval: Duration,
        mut on_tick: impl FnMut() -> bool + Send + 'static,
    ) -> io::Result<Self> {
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&cancelled);

        let handle = thread::Builder::new()
            .name("playback-ticker".to_string())
            .spawn(move || {
                let mut deadline = Instant::now() + interval;
                loop {
                    if flag.load(Ordering::SeqCst) {
                        break;
                    }
                    let now = Instant::now();
                    if now < deadline {
                        thread::park_timeout(deadline - now);
                        continue;
                    }
                    deadline += interval;
                    if !on_tick() {
                        break;
                    }
                }
            })?;

        Ok(Self { cancelled, handle })
    }

    /// Stop the timer and wait for its thread.
    /// Must not be called while holding a lock the tick function takes.
    pub(super) fn cancel(self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.handle.thread().unpark();
        if self.handle.thread().id() != thread::current().id() {
            let _ = self.handle.join();
        }
    }
}
