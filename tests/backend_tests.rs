//! Engine driving the real local and network backends into a fake output

mod common;

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clip_audio::application::ports::{
    ClipStore, CodecError, StreamCodec, StreamDecoder, StreamEncoder,
};
use clip_audio::application::PlaybackEngine;
use clip_audio::domain::clip::Clip;
use clip_audio::domain::playback::{PlaybackStatus, PlayerState};
use clip_audio::domain::recording::StreamFormat;
use clip_audio::infrastructure::{DefaultBackendFactory, FlacCodec, TomlClipStore};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use common::{test_engine_config, wait_until, write_flac, FakeOutput};

fn engine(output: Arc<FakeOutput>, runtime: tokio::runtime::Handle) -> PlaybackEngine {
    let factory = DefaultBackendFactory::new(Arc::new(FlacCodec::new()), output, runtime);
    PlaybackEngine::new(test_engine_config(), Arc::new(factory)).unwrap()
}

fn collect(engine: &PlaybackEngine) -> Arc<Mutex<Vec<PlaybackStatus>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    engine.add_observer(move |status: &PlaybackStatus| sink.lock().unwrap().push(status.clone()));
    seen
}

fn transitions(seen: &Mutex<Vec<PlaybackStatus>>) -> Vec<PlayerState> {
    let mut states: Vec<PlayerState> = Vec::new();
    for status in seen.lock().unwrap().iter() {
        if states.last() != Some(&status.state) {
            states.push(status.state);
        }
    }
    states
}

fn reached_none(seen: &Mutex<Vec<PlaybackStatus>>) -> bool {
    seen.lock()
        .unwrap()
        .iter()
        .any(|s| s.state == PlayerState::None)
}

#[test]
fn recorded_clip_plays_through_the_local_backend() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let format = StreamFormat::speech();

    let mut clip = Clip::create_in(dir.path(), "local");
    for secs in [0.4, 0.4] {
        let index = clip.open_segment();
        write_flac(&clip.segments[index].path, format, secs, 0.3);
        clip.finalize_segment(index, secs);
    }
    let data_dir = clip.data_dir.clone();

    let output = FakeOutput::new();
    let engine = engine(output.clone(), runtime.handle().clone());
    let seen = collect(&engine);

    engine.play(clip, false);
    assert!(wait_until(Duration::from_secs(10), || reached_none(&seen)));

    assert_eq!(
        transitions(&seen),
        vec![
            PlayerState::Preparing,
            PlayerState::Paused,
            PlayerState::Playing,
            PlayerState::None
        ]
    );
    assert!(output.written_ms().abs_diff(800) <= 50, "{}", output.written_ms());

    // Only the two segments remain; the scratch merge is gone
    let files = std::fs::read_dir(&data_dir).unwrap().count();
    assert_eq!(files, 2);
}

/// FLAC codec counting the encoders it opens
#[derive(Default)]
struct CountingCodec {
    inner: FlacCodec,
    encoders: AtomicUsize,
}

impl StreamCodec for CountingCodec {
    fn open_encoder(
        &self,
        path: &Path,
        format: StreamFormat,
    ) -> Result<Box<dyn StreamEncoder>, CodecError> {
        self.encoders.fetch_add(1, Ordering::SeqCst);
        self.inner.open_encoder(path, format)
    }

    fn open_decoder(&self, path: &Path) -> Result<Box<dyn StreamDecoder>, CodecError> {
        self.inner.open_decoder(path)
    }
}

#[test]
fn stored_clip_reuses_its_flattened_file() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(TomlClipStore::new(dir.path()));
    let format = StreamFormat::speech();

    let mut clip = store.create_clip("replayed");
    for secs in [0.3, 0.2] {
        let index = clip.open_segment();
        write_flac(&clip.segments[index].path, format, secs, 0.3);
        clip.finalize_segment(index, secs);
    }
    runtime.block_on(store.save_clip(&clip)).unwrap();

    let codec = Arc::new(CountingCodec::default());
    let output = FakeOutput::new();
    let factory = DefaultBackendFactory::new(codec.clone(), output, runtime.handle().clone())
        .with_store(store.clone());
    let engine = PlaybackEngine::new(test_engine_config(), Arc::new(factory)).unwrap();
    let seen = collect(&engine);
    let finished = |n: usize| {
        let seen = Arc::clone(&seen);
        move || {
            seen.lock()
                .unwrap()
                .iter()
                .filter(|s| s.state == PlayerState::None)
                .count()
                >= n
        }
    };

    engine.play(clip.clone(), false);
    assert!(wait_until(Duration::from_secs(10), finished(1)));
    engine.play(clip.clone(), false);
    assert!(wait_until(Duration::from_secs(10), finished(2)));

    assert_eq!(codec.encoders.load(Ordering::SeqCst), 1);
    let stored = runtime.block_on(store.load_clip(&clip.id)).unwrap();
    let flattened = stored.flattened_path.expect("flattened file recorded");
    assert!(flattened.exists());
    assert!(stored.flattened_source_timestamp.is_some());
}

#[test]
fn missing_local_file_reports_error() {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let output = FakeOutput::new();
    let engine = engine(output.clone(), runtime.handle().clone());
    let seen = collect(&engine);

    engine.play(
        Clip::from_source("gone", "/nonexistent/gone.flac", None, "/tmp/unused"),
        false,
    );
    assert!(wait_until(Duration::from_secs(5), || reached_none(&seen)));

    assert_eq!(
        transitions(&seen),
        vec![PlayerState::Preparing, PlayerState::Error, PlayerState::None]
    );
    assert_eq!(output.opened(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn remote_clip_streams_from_http() {
    let dir = tempfile::tempdir().unwrap();
    let episode = dir.path().join("episode.flac");
    write_flac(&episode, StreamFormat::speech(), 0.6, 0.4);

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ep.flac"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(std::fs::read(&episode).unwrap()))
        .mount(&server)
        .await;

    let output = FakeOutput::new();
    let engine = engine(output.clone(), tokio::runtime::Handle::current());
    let seen = collect(&engine);
    let clip = Clip::from_source(
        "remote",
        format!("{}/ep.flac", server.uri()),
        Some(0.6),
        dir.path().join("remote.data"),
    );

    let (states, written) = tokio::task::spawn_blocking(move || {
        engine.play(clip, false);
        wait_until(Duration::from_secs(10), || reached_none(&seen));
        engine.shutdown();
        (transitions(&seen), output.written_ms())
    })
    .await
    .unwrap();

    assert_eq!(
        states,
        vec![
            PlayerState::Preparing,
            PlayerState::Paused,
            PlayerState::Playing,
            PlayerState::None
        ]
    );
    assert!(written.abs_diff(600) <= 50, "{}", written);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn http_error_reports_error_then_none() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let output = FakeOutput::new();
    let engine = engine(output, tokio::runtime::Handle::current());
    let seen = collect(&engine);
    let clip = Clip::from_source(
        "missing",
        format!("{}/missing.mp3", server.uri()),
        None,
        "/tmp/unused",
    );

    let states = tokio::task::spawn_blocking(move || {
        engine.play(clip, false);
        wait_until(Duration::from_secs(10), || reached_none(&seen));
        engine.shutdown();
        transitions(&seen)
    })
    .await
    .unwrap();

    assert_eq!(
        states,
        vec![PlayerState::Preparing, PlayerState::Error, PlayerState::None]
    );
}
