//! In-memory download buffer read while it fills

use std::io::{self, Read, Seek, SeekFrom};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use symphonia::core::io::MediaSource;

use crate::application::ports::BackendListener;

#[derive(Debug, Default)]
struct BufferState {
    data: Vec<u8>,
    content_length: Option<u64>,
    complete: bool,
    error: Option<String>,
    cancelled: bool,
}

/// Bytes of a download in progress, shared between the download task and
/// the player thread
#[derive(Debug, Default)]
pub struct ProgressiveBuffer {
    state: Mutex<BufferState>,
    changed: Condvar,
}

impl ProgressiveBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, BufferState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn update(&self, f: impl FnOnce(&mut BufferState)) {
        f(&mut self.lock());
        self.changed.notify_all();
    }

    pub fn set_content_length(&self, length: Option<u64>) {
        self.update(|s| s.content_length = length);
    }

    pub fn append(&self, chunk: &[u8]) {
        self.update(|s| s.data.extend_from_slice(chunk));
    }

    /// The download finished; readers see end of stream after the last byte
    pub fn complete(&self) {
        self.update(|s| s.complete = true);
    }

    /// The download failed; readers get the error once the data runs out
    pub fn fail(&self, message: impl Into<String>) {
        let message = message.into();
        self.update(|s| s.error = Some(message));
    }

    /// Unblock every reader immediately
    pub fn cancel(&self) {
        self.update(|s| s.cancelled = true);
    }

    pub fn is_cancelled(&self) -> bool {
        self.lock().cancelled
    }

    pub fn error(&self) -> Option<String> {
        self.lock().error.clone()
    }

    pub fn len(&self) -> usize {
        self.lock().data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Blocking reader over a `ProgressiveBuffer`.
///
/// Running dry before the download ends reports `buffering(true)` to the
/// listener, and `buffering(false)` once bytes arrive again.
pub struct ProgressiveReader {
    buffer: Arc<ProgressiveBuffer>,
    position: usize,
    listener: Option<BackendListener>,
    stalled: bool,
}

impl ProgressiveReader {
    pub fn new(buffer: Arc<ProgressiveBuffer>, listener: Option<BackendListener>) -> Self {
        Self {
            buffer,
            position: 0,
            listener,
            stalled: false,
        }
    }

    fn set_stalled(&mut self, stalled: bool) {
        if self.stalled == stalled {
            return;
        }
        self.stalled = stalled;
        log::debug!(
            "Download {} at byte {}",
            if stalled { "stalled" } else { "caught up" },
            self.position
        );
        if let Some(listener) = &self.listener {
            listener.buffering(stalled);
        }
    }
}

impl Read for ProgressiveReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let buffer = Arc::clone(&self.buffer);
        let mut state = buffer.lock();
        loop {
            if state.cancelled {
                return Err(io::Error::other("download cancelled"));
            }

            let available = state.data.len().saturating_sub(self.position);
            if available > 0 {
                let n = available.min(buf.len());
                buf[..n].copy_from_slice(&state.data[self.position..self.position + n]);
                self.position += n;
                drop(state);
                self.set_stalled(false);
                return Ok(n);
            }

            if let Some(message) = &state.error {
                return Err(io::Error::other(message.clone()));
            }
            if state.complete {
                return Ok(0);
            }

            if !self.stalled {
                drop(state);
                self.set_stalled(true);
                state = buffer.lock();
                continue;
            }
            state = buffer
                .changed
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

impl Seek for ProgressiveReader {
    /// Only positions already downloaded can be reached
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let state = self.buffer.lock();
        let len = state.data.len() as i64;
        let target = match pos {
            SeekFrom::Start(offset) => offset as i64,
            SeekFrom::Current(delta) => self.position as i64 + delta,
            SeekFrom::End(delta) => match state.content_length {
                Some(total) if state.complete || total as i64 == len => total as i64 + delta,
                _ => {
                    return Err(io::Error::new(
                        io::ErrorKind::Unsupported,
                        "end of stream not downloaded yet",
                    ))
                }
            },
        };
        if target < 0 || target > len {
            return Err(io::Error::new(
                io::ErrorKind::Unsupported,
                format!("cannot seek to byte {} of {} downloaded", target, len),
            ));
        }
        self.position = target as usize;
        Ok(target as u64)
    }
}

impl MediaSource for ProgressiveReader {
    fn is_seekable(&self) -> bool {
        false
    }

    fn byte_len(&self) -> Option<u64> {
        self.buffer.lock().content_length
    }
}
