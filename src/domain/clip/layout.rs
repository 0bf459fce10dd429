//! On-disk naming of recording files inside a clip data directory

use std::fs;
use std::path::{Path, PathBuf};

/// Extension of recording and flattened files
pub const RECORDING_EXTENSION: &str = "flac";

/// Suffix of a clip's data directory name
pub const DATA_DIR_SUFFIX: &str = "data";

/// Sequence number encoded in a `<n>.flac` file name
pub fn sequence_of(path: &Path) -> Option<u32> {
    if path.extension()?.to_str()? != RECORDING_EXTENSION {
        return None;
    }
    path.file_stem()?.to_str()?.parse().ok()
}

/// Path for recording number `sequence` in `dir`
pub fn recording_path(dir: &Path, sequence: u32) -> PathBuf {
    dir.join(format!("{}.{}", sequence, RECORDING_EXTENSION))
}

/// Next free sequence number in `dir`: one higher than the highest numbered
/// recording file on disk or in `known`. A missing directory counts as empty.
pub fn next_sequence<'a>(dir: &Path, known: impl IntoIterator<Item = &'a Path>) -> u32 {
    let on_disk = fs::read_dir(dir)
        .into_iter()
        .flatten()
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| sequence_of(&entry.path()));
    let in_memory = known.into_iter().filter_map(sequence_of);

    on_disk.chain(in_memory).max().map_or(1, |max| max + 1)
}
