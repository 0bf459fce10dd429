//! Clip entity

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::layout::{self, DATA_DIR_SUFFIX};
use super::segment::Segment;

/// Stable clip identity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClipId(Uuid);

impl ClipId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ClipId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClipId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ClipId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Where a clip stands in the upload pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadState {
    #[default]
    Draft,
    Queued,
    Uploaded,
}

/// Where a clip was recorded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    pub description: Option<String>,
}

/// A recorded or remote audio clip.
///
/// Locally recorded clips own an ordered list of segments living in
/// `data_dir`; their duration is the sum of segment durations. Remote clips
/// carry a `source` URI and a server-provided duration instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clip {
    pub id: ClipId,
    #[serde(default)]
    pub title: String,
    pub recorded_at: DateTime<Utc>,
    #[serde(default)]
    pub upload_state: UploadState,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Remote URI or local file path for clips not recorded here
    pub source: Option<String>,
    /// Seconds, as reported by the server for remote clips
    pub remote_duration: Option<f64>,
    pub data_dir: PathBuf,
    pub flattened_path: Option<PathBuf>,
    pub flattened_source_timestamp: Option<DateTime<Utc>>,
    pub location: Option<Location>,
    #[serde(default)]
    pub segments: Vec<Segment>,
}

impl Clip {
    /// New empty clip recording into `data_dir`
    pub fn new(title: impl Into<String>, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            id: ClipId::new(),
            title: title.into(),
            recorded_at: Utc::now(),
            upload_state: UploadState::Draft,
            tags: Vec::new(),
            source: None,
            remote_duration: None,
            data_dir: data_dir.into(),
            flattened_path: None,
            flattened_source_timestamp: None,
            location: None,
            segments: Vec::new(),
        }
    }

    /// New clip whose data directory is `<root>/<id>.data`
    pub fn create_in(root: &Path, title: impl Into<String>) -> Self {
        let id = ClipId::new();
        let mut clip = Self::new(title, root.join(format!("{}.{}", id, DATA_DIR_SUFFIX)));
        clip.id = id;
        clip
    }

    /// Clip played from a URI or file that was not recorded here
    pub fn from_source(
        title: impl Into<String>,
        source: impl Into<String>,
        duration: Option<f64>,
        data_dir: impl Into<PathBuf>,
    ) -> Self {
        let mut clip = Self::new(title, data_dir);
        clip.source = Some(source.into());
        clip.remote_duration = duration;
        clip
    }

    /// Total duration in seconds
    pub fn duration(&self) -> f64 {
        if self.segments.is_empty() {
            if let Some(remote) = self.remote_duration {
                return remote;
            }
        }
        self.segments.iter().map(|s| s.duration).sum()
    }

    /// Recorded here rather than fetched from a source
    pub fn is_local_recording(&self) -> bool {
        !self.segments.is_empty()
    }

    pub fn has_audio(&self) -> bool {
        self.segments.iter().any(|s| !s.is_empty()) || self.source.is_some()
    }

    /// Index of the segment the next recording session writes to.
    ///
    /// The last segment is reused when it never captured anything,
    /// otherwise a new one is appended with the next free file number.
    pub fn open_segment(&mut self) -> usize {
        if let Some(last) = self.segments.last() {
            if last.is_empty() {
                return self.segments.len() - 1;
            }
        }
        let sequence = self.next_sequence();
        let path = layout::recording_path(&self.data_dir, sequence);
        self.segments.push(Segment::new(path, sequence));
        self.segments.len() - 1
    }

    /// Record the final duration of segment `index`
    pub fn finalize_segment(&mut self, index: usize, duration_secs: f64) {
        if let Some(segment) = self.segments.get_mut(index) {
            segment.duration = duration_secs.max(0.0);
        }
    }

    /// Next free recording file in the data directory
    pub fn next_recording_path(&self) -> PathBuf {
        layout::recording_path(&self.data_dir, self.next_sequence())
    }

    fn next_sequence(&self) -> u32 {
        let known = self
            .segments
            .iter()
            .map(|s| s.path.as_path())
            .chain(self.flattened_path.as_deref());
        layout::next_sequence(&self.data_dir, known)
    }

    /// Forget the flattened file and where it came from
    pub fn clear_flattened(&mut self) {
        self.flattened_path = None;
        self.flattened_source_timestamp = None;
    }

    /// Drop every segment and the flattened file reference
    pub fn clear_recording(&mut self) {
        self.segments.clear();
        self.clear_flattened();
    }

    /// Paths of every file this clip owns in its data directory
    pub fn owned_files(&self) -> Vec<PathBuf> {
        self.segments
            .iter()
            .map(|s| s.path.clone())
            .chain(self.flattened_path.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_sums_segments() {
        let mut clip = Clip::new("walk", "/tmp/walk.data");
        let a = clip.open_segment();
        clip.finalize_segment(a, 2.5);
        let b = clip.open_segment();
        clip.finalize_segment(b, 1.5);

        assert_eq!(clip.segments.len(), 2);
        assert!((clip.duration() - 4.0).abs() < 1e-9);
    }

    #[test]
    fn remote_clip_uses_server_duration() {
        let clip = Clip::from_source("talk", "https://example.com/a.mp3", Some(12.0), "/tmp/t");
        assert!(!clip.is_local_recording());
        assert!((clip.duration() - 12.0).abs() < 1e-9);
    }

    #[test]
    fn open_segment_reuses_empty_last_segment() {
        let mut clip = Clip::new("walk", "/nonexistent/walk.data");
        let first = clip.open_segment();
        let again = clip.open_segment();
        assert_eq!(first, again);
        assert_eq!(clip.segments.len(), 1);

        clip.finalize_segment(first, 1.0);
        let next = clip.open_segment();
        assert_eq!(next, 1);
        assert_eq!(clip.segments[1].sequence, 2);
        assert!(clip.segments[1].path.ends_with("2.flac"));
    }

    #[test]
    fn next_path_skips_flattened_number() {
        let mut clip = Clip::new("walk", "/nonexistent/walk.data");
        let i = clip.open_segment();
        clip.finalize_segment(i, 1.0);
        clip.flattened_path = Some(PathBuf::from("/nonexistent/walk.data/2.flac"));
        assert!(clip.next_recording_path().ends_with("3.flac"));
    }

    #[test]
    fn create_in_names_data_dir_after_id() {
        let clip = Clip::create_in(Path::new("/clips"), "walk");
        assert_eq!(
            clip.data_dir,
            PathBuf::from(format!("/clips/{}.data", clip.id))
        );
    }

    #[test]
    fn clear_recording_forgets_everything() {
        let mut clip = Clip::new("walk", "/tmp/walk.data");
        let i = clip.open_segment();
        clip.finalize_segment(i, 3.0);
        clip.flattened_path = Some(PathBuf::from("/tmp/walk.data/2.flac"));
        clip.flattened_source_timestamp = Some(Utc::now());

        clip.clear_recording();
        assert!(clip.segments.is_empty());
        assert!(clip.flattened_path.is_none());
        assert!(clip.flattened_source_timestamp.is_none());
        assert_eq!(clip.duration(), 0.0);
    }

    #[test]
    fn id_round_trips_through_string() {
        let id = ClipId::new();
        let parsed: ClipId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
    }
}
