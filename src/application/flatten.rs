//! Segment concatenation ("flatten")
//!
//! Merges a clip's segments into one stream, lazily: the flattened file is
//! reused for as long as it is at least as new as every segment file.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use thiserror::Error;

use super::ports::{CodecError, StreamCodec, StreamDecoder, StreamEncoder};
use crate::domain::clip::Clip;

/// Errors that abort flattening.
/// Unreadable segments are skipped rather than reported.
#[derive(Debug, Clone, Error)]
pub enum FlattenError {
    #[error("Flatten I/O failed: {0}")]
    Io(String),

    #[error("Failed to write flattened stream: {0}")]
    Codec(#[from] CodecError),
}

fn modified(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Concatenates clip segments through the streaming codec
pub struct SegmentConcatenator {
    codec: Arc<dyn StreamCodec>,
}

impl SegmentConcatenator {
    pub fn new(codec: Arc<dyn StreamCodec>) -> Self {
        Self { codec }
    }

    /// Return the clip's flattened file, building it if it is missing or
    /// older than any segment.
    ///
    /// `Ok(None)` means no segment could be read. Blocking; run it off any
    /// interactive thread.
    pub fn flatten(&self, clip: &mut Clip) -> Result<Option<PathBuf>, FlattenError> {
        let newest = clip
            .segments
            .iter()
            .filter_map(|s| modified(&s.path))
            .max();

        if let Some(existing) = clip.flattened_path.clone() {
            match modified(&existing) {
                None => {
                    log::debug!("Flattened file {} is gone", existing.display());
                    clip.clear_flattened();
                }
                Some(flat_time) if newest.map_or(true, |newest| flat_time >= newest) => {
                    return Ok(Some(existing));
                }
                Some(_) => {
                    log::debug!("Flattened file {} is stale", existing.display());
                    match fs::remove_file(&existing) {
                        Ok(()) => {}
                        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                        Err(e) => {
                            return Err(FlattenError::Io(format!(
                                "{}: {}",
                                existing.display(),
                                e
                            )))
                        }
                    }
                    clip.clear_flattened();
                }
            }
        }

        if clip.segments.is_empty() {
            return Ok(None);
        }

        fs::create_dir_all(&clip.data_dir)
            .map_err(|e| FlattenError::Io(format!("{}: {}", clip.data_dir.display(), e)))?;
        let target = clip.next_recording_path();

        let mut encoder: Option<Box<dyn StreamEncoder>> = None;
        for segment in &clip.segments {
            let mut decoder = match self.codec.open_decoder(&segment.path) {
                Ok(decoder) => decoder,
                Err(e) => {
                    log::warn!("Skipping segment {}: {}", segment.path.display(), e);
                    continue;
                }
            };

            if encoder.is_none() {
                encoder = Some(self.codec.open_encoder(&target, decoder.format())?);
            }
            let Some(enc) = encoder.as_mut() else {
                continue;
            };
            if enc.format() != decoder.format() {
                log::warn!(
                    "Skipping segment {}: format {} does not match {}",
                    segment.path.display(),
                    decoder.format(),
                    enc.format()
                );
                decoder.close();
                continue;
            }

            Self::copy_stream(decoder.as_mut(), enc.as_mut(), &segment.path)?;
            enc.flush()?;
            decoder.close();
        }

        let Some(mut encoder) = encoder else {
            log::warn!("No readable segments in clip {}", clip.id);
            return Ok(None);
        };
        encoder.close()?;

        clip.flattened_path = Some(target.clone());
        clip.flattened_source_timestamp = newest.map(DateTime::<Utc>::from);
        log::info!(
            "Flattened {} segments of clip {} into {}",
            clip.segments.len(),
            clip.id,
            target.display()
        );
        Ok(Some(target))
    }

    /// Stream every block of `decoder` into `encoder`. A read failure ends
    /// the segment early; write failures abort.
    fn copy_stream(
        decoder: &mut dyn StreamDecoder,
        encoder: &mut dyn StreamEncoder,
        path: &Path,
    ) -> Result<(), FlattenError> {
        let mut buf = vec![0u8; decoder.min_block_size().max(decoder.format().frame_size())];
        loop {
            match decoder.read_block(&mut buf) {
                Ok(0) => return Ok(()),
                Ok(n) => {
                    encoder.write_block(&buf[..n])?;
                }
                Err(e) => {
                    log::warn!("Segment {} ended early: {}", path.display(), e);
                    return Ok(());
                }
            }
        }
    }
}
