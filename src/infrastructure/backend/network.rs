//! Network streaming backend
//!
//! The source URI is downloaded on the tokio runtime into a progressive
//! buffer while a player thread decodes from the same buffer.

use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use super::progressive::{ProgressiveBuffer, ProgressiveReader};
use super::pump::{play_stream, report, PlayerHandle};
use crate::application::ports::{AudioOutput, BackendError, BackendListener, PlaybackBackend};
use crate::domain::clip::Clip;
use crate::domain::playback::BackendKind;
use crate::infrastructure::codec::SymphoniaDecoder;

/// The download feeding the player
struct Download {
    buffer: Arc<ProgressiveBuffer>,
    task: JoinHandle<()>,
}

/// Streams a remote clip over HTTP
pub struct NetworkStreamBackend {
    client: reqwest::Client,
    runtime: Handle,
    output: Arc<dyn AudioOutput>,
    player: PlayerHandle,
    download: Mutex<Option<Download>>,
}

impl NetworkStreamBackend {
    pub fn new(client: reqwest::Client, runtime: Handle, output: Arc<dyn AudioOutput>) -> Self {
        Self {
            client,
            runtime,
            output,
            player: PlayerHandle::new(),
            download: Mutex::new(None),
        }
    }
}

/// File extension of the URI path, used as a format hint
fn extension_hint(uri: &str) -> Option<String> {
    let url = reqwest::Url::parse(uri).ok()?;
    let extension = Path::new(url.path()).extension()?.to_str()?;
    Some(extension.to_ascii_lowercase())
}

async fn download(client: reqwest::Client, uri: String, buffer: Arc<ProgressiveBuffer>) {
    let result = fetch(&client, &uri, &buffer).await;
    match result {
        Ok(()) => {
            log::debug!("Downloaded {} bytes from {}", buffer.len(), uri);
            buffer.complete();
        }
        Err(e) => {
            log::error!("Download of {} failed: {}", uri, e);
            buffer.fail(e.to_string());
        }
    }
}

async fn fetch(
    client: &reqwest::Client,
    uri: &str,
    buffer: &ProgressiveBuffer,
) -> Result<(), BackendError> {
    let mut response = client
        .get(uri)
        .send()
        .await
        .map_err(|e| BackendError::Network(e.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        return Err(BackendError::Network(format!("HTTP {}", status)));
    }
    buffer.set_content_length(response.content_length());

    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| BackendError::Network(e.to_string()))?
    {
        if buffer.is_cancelled() {
            return Ok(());
        }
        buffer.append(&chunk);
    }
    Ok(())
}

impl PlaybackBackend for NetworkStreamBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::NetworkStream
    }

    fn prepare(&self, clip: &Clip, listener: BackendListener) -> Result<(), BackendError> {
        let uri = clip.source.clone().ok_or(BackendError::NoSource)?;
        let hint = extension_hint(&uri);
        let buffer = Arc::new(ProgressiveBuffer::new());

        log::info!("Streaming {}", uri);
        let task = self.runtime.spawn(download(
            self.client.clone(),
            uri,
            Arc::clone(&buffer),
        ));
        *self.download.lock().unwrap_or_else(PoisonError::into_inner) = Some(Download {
            buffer: Arc::clone(&buffer),
            task,
        });

        let output = Arc::clone(&self.output);
        self.player.spawn("network-playback", move |control| {
            let reader = ProgressiveReader::new(Arc::clone(&buffer), Some(listener.clone()));
            let result = SymphoniaDecoder::from_source(Box::new(reader), hint.as_deref())
                .map_err(BackendError::from)
                .and_then(|mut decoder| {
                    play_stream(&mut decoder, output.as_ref(), &control, &listener)
                })
                // The decoder only sees a broken stream; the buffer knows why
                .map_err(|e| match buffer.error() {
                    Some(message) => BackendError::Network(message),
                    None => e,
                });
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
        let download = self
            .download
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(download) = download {
            download.buffer.cancel();
            download.task.abort();
        }
        self.player.join();
    }
}

impl Drop for NetworkStreamBackend {
    fn drop(&mut self) {
        self.stop();
    }
}
