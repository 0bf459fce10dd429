//! Local decode-and-render backend
//!
//! Plays recorded clips (flattening their segments first) and sources that
//! are plain files on disk. With a clip store attached, the flattened file
//! is recorded on the stored clip so later plays reuse it.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::runtime::Handle;

use super::pump::{play_stream, report, PlayerHandle};
use crate::application::ports::{
    AudioOutput, BackendError, BackendListener, ClipStore, PlaybackBackend, StreamCodec,
};
use crate::application::{FlattenError, SegmentConcatenator};
use crate::domain::clip::Clip;
use crate::domain::error::StoreError;
use crate::domain::playback::BackendKind;

impl From<FlattenError> for BackendError {
    fn from(e: FlattenError) -> Self {
        match e {
            FlattenError::Io(msg) => Self::Io(msg),
            FlattenError::Codec(e) => e.into(),
        }
    }
}

/// Stored clip records holding the flattened file between plays
#[derive(Clone)]
pub(super) struct FlattenCache {
    store: Arc<dyn ClipStore>,
    runtime: Handle,
}

impl FlattenCache {
    pub(super) fn new(store: Arc<dyn ClipStore>, runtime: Handle) -> Self {
        Self { store, runtime }
    }

    /// The stored record of `clip`, if there is one
    fn stored(&self, clip: &Clip) -> Option<Clip> {
        match self.runtime.block_on(self.store.load_clip(&clip.id)) {
            Ok(record) => Some(record),
            Err(StoreError::NotFound(_)) => None,
            Err(e) => {
                log::warn!("Cannot read stored clip {}: {}", clip.id, e);
                None
            }
        }
    }

    /// Save the flattened file of `flattened` onto its stored `record`
    fn remember(&self, mut record: Clip, flattened: &Clip) -> bool {
        record.flattened_path = flattened.flattened_path.clone();
        record.flattened_source_timestamp = flattened.flattened_source_timestamp;
        match self.runtime.block_on(self.store.save_clip(&record)) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("Cannot record flattened audio of clip {}: {}", record.id, e);
                false
            }
        }
    }
}

/// Where the audio of a clip comes from
enum LocalSource {
    /// Recorded segments, flattened on the player thread
    Recording(Clip),
    File(PathBuf),
}

impl LocalSource {
    fn of(clip: &Clip) -> Result<Self, BackendError> {
        if clip.is_local_recording() {
            return Ok(Self::Recording(clip.clone()));
        }
        let source = clip.source.as_deref().ok_or(BackendError::NoSource)?;
        let path = source.strip_prefix("file://").unwrap_or(source);
        Ok(Self::File(PathBuf::from(path)))
    }

    /// Path to decode, plus whether it is a scratch file to remove afterwards.
    ///
    /// A flattened file is scratch when neither the played clip nor its
    /// stored record refers to it.
    fn resolve(
        self,
        codec: &Arc<dyn StreamCodec>,
        cache: Option<&FlattenCache>,
    ) -> Result<(PathBuf, bool), BackendError> {
        let mut clip = match self {
            Self::File(path) => return Ok((path, false)),
            Self::Recording(clip) => clip,
        };

        let record = cache.and_then(|cache| cache.stored(&clip));
        if let Some(record) = &record {
            clip.flattened_path = record.flattened_path.clone();
            clip.flattened_source_timestamp = record.flattened_source_timestamp;
        }
        let previous = (clip.flattened_path.clone(), clip.flattened_source_timestamp);

        let path = SegmentConcatenator::new(Arc::clone(codec))
            .flatten(&mut clip)?
            .ok_or(BackendError::NoSource)?;

        let changed = previous != (clip.flattened_path.clone(), clip.flattened_source_timestamp);
        let remembered = match (cache, record) {
            (Some(cache), Some(record)) if changed => cache.remember(record, &clip),
            _ => false,
        };
        let known = previous.0.as_ref() == Some(&path);
        Ok((path, !(known || remembered)))
    }
}

/// Decodes a local file through the stream codec into the render device
pub struct LocalDecodeBackend {
    codec: Arc<dyn StreamCodec>,
    output: Arc<dyn AudioOutput>,
    cache: Option<FlattenCache>,
    player: PlayerHandle,
}

impl LocalDecodeBackend {
    pub fn new(codec: Arc<dyn StreamCodec>, output: Arc<dyn AudioOutput>) -> Self {
        Self {
            codec,
            output,
            cache: None,
            player: PlayerHandle::new(),
        }
    }

    /// Record flattened files on the clips in `store`.
    /// `runtime` must not be the runtime of the calling thread.
    pub fn with_store(mut self, store: Arc<dyn ClipStore>, runtime: Handle) -> Self {
        self.cache = Some(FlattenCache::new(store, runtime));
        self
    }

    pub(super) fn with_cache(mut self, cache: Option<FlattenCache>) -> Self {
        self.cache = cache;
        self
    }
}

impl PlaybackBackend for LocalDecodeBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::LocalDecode
    }

    fn prepare(&self, clip: &Clip, listener: BackendListener) -> Result<(), BackendError> {
        let source = LocalSource::of(clip)?;
        let codec = Arc::clone(&self.codec);
        let output = Arc::clone(&self.output);
        let cache = self.cache.clone();

        self.player.spawn("local-playback", move |control| {
            let (path, scratch) = match source.resolve(&codec, cache.as_ref()) {
                Ok(resolved) => resolved,
                Err(e) => return report(Err(e), &control, &listener),
            };
            log::debug!("Decoding {}", path.display());

            let result = codec
                .open_decoder(&path)
                .map_err(BackendError::from)
                .and_then(|mut decoder| {
                    let played = play_stream(decoder.as_mut(), output.as_ref(), &control, &listener);
                    decoder.close();
                    played
                });

            if scratch {
                if let Err(e) = fs::remove_file(&path) {
                    log::warn!("Failed to remove {}: {}", path.display(), e);
                }
            }
            report(result, &control, &listener);
        })
    }

    fn pause(&self) {
        self.player.pause();
    }

    fn resume(&self) -> bool {
        self.player.resume()
    }

    fn stop(&self) {
        self.player.signal_stop();
        self.player.join();
    }
}

impl Drop for LocalDecodeBackend {
    fn drop(&mut self) {
        self.stop();
    }
}
