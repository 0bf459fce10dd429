//! Recorded segment entity

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// One contiguous recorded audio file belonging to a clip.
///
/// `duration` stays zero until the recording session that produced the
/// segment stops.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub path: PathBuf,
    /// Seconds
    #[serde(default)]
    pub duration: f64,
    pub sequence: u32,
}

impl Segment {
    pub fn new(path: PathBuf, sequence: u32) -> Self {
        Self {
            path,
            duration: 0.0,
            sequence,
        }
    }

    /// A segment that was armed but never captured anything
    pub fn is_empty(&self) -> bool {
        self.duration <= 0.0
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn duration_ms(&self) -> u64 {
        (self.duration * 1000.0).round().max(0.0) as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_segment_is_empty() {
        let seg = Segment::new(PathBuf::from("/tmp/1.flac"), 1);
        assert!(seg.is_empty());
        assert_eq!(seg.duration_ms(), 0);
    }

    #[test]
    fn finalized_segment_reports_millis() {
        let mut seg = Segment::new(PathBuf::from("/tmp/1.flac"), 1);
        seg.duration = 2.5;
        assert!(!seg.is_empty());
        assert_eq!(seg.duration_ms(), 2500);
    }
}
