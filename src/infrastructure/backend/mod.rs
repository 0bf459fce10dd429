//! Playback backend implementations

mod local;
mod network;
mod progressive;
mod pump;

use std::sync::Arc;

use tokio::runtime::Handle;

use local::FlattenCache;
pub use local::LocalDecodeBackend;
pub use network::NetworkStreamBackend;
pub use progressive::{ProgressiveBuffer, ProgressiveReader};

use crate::application::ports::{
    AudioOutput, BackendError, BackendFactory, ClipStore, PlaybackBackend, StreamCodec,
};
use crate::domain::playback::BackendKind;

/// Builds the backend matching each `BackendKind`
pub struct DefaultBackendFactory {
    codec: Arc<dyn StreamCodec>,
    output: Arc<dyn AudioOutput>,
    client: reqwest::Client,
    runtime: Handle,
    cache: Option<FlattenCache>,
}

impl DefaultBackendFactory {
    /// Network downloads run on `runtime`
    pub fn new(codec: Arc<dyn StreamCodec>, output: Arc<dyn AudioOutput>, runtime: Handle) -> Self {
        Self {
            codec,
            output,
            client: reqwest::Client::new(),
            runtime,
            cache: None,
        }
    }

    /// Keep flattened recordings on the clips in `store` across plays
    pub fn with_store(mut self, store: Arc<dyn ClipStore>) -> Self {
        self.cache = Some(FlattenCache::new(store, self.runtime.clone()));
        self
    }

    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }
}

impl BackendFactory for DefaultBackendFactory {
    fn create(&self, kind: BackendKind) -> Result<Arc<dyn PlaybackBackend>, BackendError> {
        let backend: Arc<dyn PlaybackBackend> = match kind {
            BackendKind::LocalDecode => Arc::new(
                LocalDecodeBackend::new(Arc::clone(&self.codec), Arc::clone(&self.output))
                    .with_cache(self.cache.clone()),
            ),
            BackendKind::NetworkStream => Arc::new(NetworkStreamBackend::new(
                self.client.clone(),
                self.runtime.clone(),
                Arc::clone(&self.output),
            )),
        };
        Ok(backend)
    }
}
