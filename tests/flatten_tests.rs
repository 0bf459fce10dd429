//! Segment concatenation against real FLAC files on disk

mod common;

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use clip_audio::application::SegmentConcatenator;
use clip_audio::domain::clip::Clip;
use clip_audio::domain::recording::StreamFormat;
use clip_audio::infrastructure::FlacCodec;

use common::{decoded_ms, write_flac};

fn concatenator() -> SegmentConcatenator {
    SegmentConcatenator::new(Arc::new(FlacCodec::new()))
}

/// Clip with one finalized segment per entry of `seconds`
fn recorded_clip(root: &std::path::Path, format: StreamFormat, seconds: &[f64]) -> Clip {
    let mut clip = Clip::create_in(root, "flat");
    for &secs in seconds {
        let index = clip.open_segment();
        write_flac(&clip.segments[index].path, format, secs, 0.5);
        clip.finalize_segment(index, secs);
    }
    clip
}

fn touch_future(path: &std::path::Path) {
    let file = OpenOptions::new().write(true).open(path).unwrap();
    file.set_modified(SystemTime::now() + Duration::from_secs(10))
        .unwrap();
}

#[test]
fn flattened_length_is_the_sum_of_segments() {
    let dir = tempfile::tempdir().unwrap();
    let mut clip = recorded_clip(dir.path(), StreamFormat::speech(), &[1.0, 0.5, 0.25]);

    let path = concatenator().flatten(&mut clip).unwrap().unwrap();

    assert_eq!(decoded_ms(&path), 1750);
    assert_eq!(clip.flattened_path.as_ref(), Some(&path));
    assert!(clip.flattened_source_timestamp.is_some());
    assert!(clip.segments.iter().all(|s| s.path != path));
}

#[test]
fn fresh_flattened_file_is_reused() {
    let dir = tempfile::tempdir().unwrap();
    let mut clip = recorded_clip(dir.path(), StreamFormat::speech(), &[0.5, 0.5]);
    let flattener = concatenator();

    let first = flattener.flatten(&mut clip).unwrap().unwrap();
    let written = std::fs::metadata(&first).unwrap().modified().unwrap();

    let second = flattener.flatten(&mut clip).unwrap().unwrap();
    assert_eq!(first, second);
    assert_eq!(
        std::fs::metadata(&second).unwrap().modified().unwrap(),
        written
    );
}

#[test]
fn newer_segment_rebuilds_the_flattened_file() {
    let dir = tempfile::tempdir().unwrap();
    let format = StreamFormat::speech();
    let mut clip = recorded_clip(dir.path(), format, &[0.5, 0.5]);
    let flattener = concatenator();

    let first = flattener.flatten(&mut clip).unwrap().unwrap();
    let stamp = clip.flattened_source_timestamp;

    // Re-record the second segment longer and make it newer than the merge
    let second_segment = clip.segments[1].path.clone();
    write_flac(&second_segment, format, 1.0, 0.5);
    clip.finalize_segment(1, 1.0);
    touch_future(&second_segment);

    let rebuilt = flattener.flatten(&mut clip).unwrap().unwrap();
    assert!(rebuilt.exists());
    assert_eq!(decoded_ms(&rebuilt), 1500);
    assert_ne!(clip.flattened_source_timestamp, stamp);
    if rebuilt != first {
        assert!(!first.exists());
    }
}

#[test]
fn segment_recorded_after_flattening_is_included() {
    let dir = tempfile::tempdir().unwrap();
    let format = StreamFormat::speech();
    let mut clip = recorded_clip(dir.path(), format, &[0.5, 0.25]);
    let flattener = concatenator();

    let first = flattener.flatten(&mut clip).unwrap().unwrap();
    assert_eq!(decoded_ms(&first), 750);

    let index = clip.open_segment();
    let appended = clip.segments[index].path.clone();
    assert_ne!(appended, first);
    write_flac(&appended, format, 0.5, 0.5);
    clip.finalize_segment(index, 0.5);
    // Coarse filesystem clocks could otherwise tie with the flattened file
    touch_future(&appended);

    let rebuilt = flattener.flatten(&mut clip).unwrap().unwrap();
    assert_eq!(decoded_ms(&rebuilt), 1250);
    assert!(clip.segments.iter().all(|s| s.path != rebuilt));
}

#[test]
fn missing_flattened_file_is_rebuilt() {
    let dir = tempfile::tempdir().unwrap();
    let mut clip = recorded_clip(dir.path(), StreamFormat::speech(), &[0.5]);
    let flattener = concatenator();

    let first = flattener.flatten(&mut clip).unwrap().unwrap();
    std::fs::remove_file(&first).unwrap();

    let rebuilt = flattener.flatten(&mut clip).unwrap().unwrap();
    assert!(rebuilt.exists());
    assert_eq!(decoded_ms(&rebuilt), 500);
}

#[test]
fn unreadable_segments_are_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let mut clip = recorded_clip(dir.path(), StreamFormat::speech(), &[0.5, 0.5, 0.25]);
    std::fs::write(&clip.segments[1].path, b"not audio at all").unwrap();

    let path = concatenator().flatten(&mut clip).unwrap().unwrap();
    assert_eq!(decoded_ms(&path), 750);
}

#[test]
fn segments_in_another_format_are_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let mut clip = recorded_clip(dir.path(), StreamFormat::speech(), &[0.5]);
    let index = clip.open_segment();
    write_flac(
        &clip.segments[index].path,
        StreamFormat::new(44100, 2, 16),
        0.5,
        0.5,
    );
    clip.finalize_segment(index, 0.5);

    let path = concatenator().flatten(&mut clip).unwrap().unwrap();
    assert_eq!(decoded_ms(&path), 500);
}

#[test]
fn nothing_to_flatten() {
    let dir = tempfile::tempdir().unwrap();
    let mut empty = Clip::create_in(dir.path(), "empty");
    assert_eq!(concatenator().flatten(&mut empty).unwrap(), None);

    let mut broken = recorded_clip(dir.path(), StreamFormat::speech(), &[0.5]);
    std::fs::write(&broken.segments[0].path, b"garbage").unwrap();
    let result: Option<PathBuf> = concatenator().flatten(&mut broken).unwrap();
    assert_eq!(result, None);
    assert!(broken.flattened_path.is_none());
}
