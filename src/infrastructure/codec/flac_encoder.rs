//! Streaming FLAC encoder
//!
//! FLAC gives lossless segments at roughly half the size of raw PCM.
//! The flacenc stream writer works on complete sample buffers, so the
//! encoder keeps every accepted sample and re-emits the whole stream on
//! each flush. The file on disk is therefore always a complete, decodable
//! stream of everything flushed so far.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use flacenc::bitsink::ByteSink;
use flacenc::component::BitRepr;
use flacenc::config;
use flacenc::error::Verify;
use flacenc::source::MemSource;

use crate::application::ports::{CodecError, StreamEncoder};
use crate::domain::recording::{pcm_to_samples, AmplitudeMeter, StreamFormat};

/// Encode interleaved samples into a complete FLAC stream
pub fn encode_to_flac(samples: &[i32], format: StreamFormat) -> Result<Vec<u8>, CodecError> {
    let config = config::Encoder::default()
        .into_verified()
        .map_err(|(_, e)| CodecError::Configuration(format!("{:?}", e)))?;

    let source = MemSource::from_samples(
        samples,
        format.channels as usize,
        format.bits_per_sample as usize,
        format.sample_rate as usize,
    );

    let flac_stream = flacenc::encode_with_fixed_block_size(&config, source, config.block_size)
        .map_err(|e| CodecError::Format(format!("{:?}", e)))?;

    let mut sink = ByteSink::new();
    flac_stream
        .write(&mut sink)
        .map_err(|e| CodecError::Io(e.to_string()))?;

    Ok(sink.into_inner())
}

/// FLAC encoder writing one file
pub struct FlacStreamEncoder {
    path: PathBuf,
    format: StreamFormat,
    samples: Vec<i32>,
    flushed_len: usize,
    frames: u64,
    meter: AmplitudeMeter,
    closed: bool,
}

impl FlacStreamEncoder {
    /// Validate `format` and create (truncate) the target file
    pub fn create(path: &Path, format: StreamFormat) -> Result<Self, CodecError> {
        format.validate()?;
        File::create(path)
            .map_err(|e| CodecError::Io(format!("{}: {}", path.display(), e)))?;

        Ok(Self {
            path: path.to_path_buf(),
            format,
            samples: Vec::new(),
            flushed_len: 0,
            frames: 0,
            meter: AmplitudeMeter::new(),
            closed: false,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StreamEncoder for FlacStreamEncoder {
    fn format(&self) -> StreamFormat {
        self.format
    }

    fn write_block(&mut self, pcm: &[u8]) -> Result<usize, CodecError> {
        if self.closed {
            return Err(CodecError::Closed);
        }

        let frame_size = self.format.frame_size();
        let whole = pcm.len() / frame_size * frame_size;
        let samples = pcm_to_samples(&pcm[..whole], self.format.bits_per_sample);

        self.meter.observe(
            &samples,
            self.format.channels as usize,
            self.format.full_scale(),
        );
        self.samples.extend_from_slice(&samples);
        self.frames += (whole / frame_size) as u64;

        if whole != pcm.len() {
            return Err(CodecError::ShortWrite {
                requested: pcm.len(),
                written: whole,
            });
        }
        Ok(whole)
    }

    fn flush(&mut self) -> Result<(), CodecError> {
        if self.closed || self.samples.len() == self.flushed_len {
            return Ok(());
        }

        let bytes = encode_to_flac(&self.samples, self.format)?;
        fs::write(&self.path, bytes)
            .map_err(|e| CodecError::Io(format!("{}: {}", self.path.display(), e)))?;
        self.flushed_len = self.samples.len();
        Ok(())
    }

    fn close(&mut self) -> Result<(), CodecError> {
        if self.closed {
            return Ok(());
        }
        let result = self.flush();
        self.closed = true;
        self.samples = Vec::new();
        result
    }

    fn peak_amplitude(&self) -> f32 {
        self.meter.peak()
    }

    fn average_amplitude(&self) -> f32 {
        self.meter.average()
    }

    fn position_ms(&self) -> u64 {
        self.format.frames_to_ms(self.frames)
    }
}

impl Drop for FlacStreamEncoder {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::warn!("Failed to finish {}: {}", self.path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::recording::samples_to_pcm;

    fn pcm(samples: &[i32]) -> Vec<u8> {
        let mut out = Vec::new();
        samples_to_pcm(samples, 16, &mut out);
        out
    }

    #[test]
    fn encode_silence() {
        let silence = vec![0i32; 22050];
        let flac_data = encode_to_flac(&silence, StreamFormat::speech()).unwrap();
        assert!(flac_data.len() > 50);
        assert_eq!(&flac_data[0..4], b"fLaC");
    }

    #[test]
    fn encode_compresses_signal() {
        let samples: Vec<i32> = (0..22050)
            .map(|i| {
                let t = i as f32 / 22050.0;
                (f32::sin(2.0 * std::f32::consts::PI * 440.0 * t) * 16000.0) as i32
            })
            .collect();
        let flac_data = encode_to_flac(&samples, StreamFormat::speech()).unwrap();
        assert!(flac_data.len() < samples.len() * 2);
    }

    #[test]
    fn create_rejects_unsupported_format() {
        let dir = tempfile::tempdir().unwrap();
        let result =
            FlacStreamEncoder::create(&dir.path().join("a.flac"), StreamFormat::new(22050, 3, 16));
        assert!(matches!(result, Err(CodecError::Configuration(_))));
    }

    #[test]
    fn create_fails_on_unwritable_path() {
        let dir = tempfile::tempdir().unwrap();
        let result = FlacStreamEncoder::create(
            &dir.path().join("missing").join("a.flac"),
            StreamFormat::speech(),
        );
        assert!(matches!(result, Err(CodecError::Io(_))));
    }

    #[test]
    fn partial_frame_is_a_short_write() {
        let dir = tempfile::tempdir().unwrap();
        let format = StreamFormat::new(22050, 2, 16);
        let mut encoder = FlacStreamEncoder::create(&dir.path().join("a.flac"), format).unwrap();

        let mut block = pcm(&[1, 2, 3, 4]);
        block.push(0);
        let err = encoder.write_block(&block).unwrap_err();
        assert!(matches!(
            err,
            CodecError::ShortWrite {
                requested: 9,
                written: 8
            }
        ));
        assert_eq!(encoder.frames, 2);
    }

    #[test]
    fn statistics_track_written_blocks() {
        let dir = tempfile::tempdir().unwrap();
        let mut encoder =
            FlacStreamEncoder::create(&dir.path().join("a.flac"), StreamFormat::speech()).unwrap();
        assert_eq!(encoder.peak_amplitude(), 0.0);

        encoder.write_block(&pcm(&vec![16383; 2205])).unwrap();
        assert!((encoder.peak_amplitude() - 0.5).abs() < 0.001);
        assert_eq!(encoder.position_ms(), 100);

        encoder.write_block(&pcm(&vec![0; 2205])).unwrap();
        assert!((encoder.average_amplitude() - 0.25).abs() < 0.001);
        assert_eq!(encoder.position_ms(), 200);
    }

    #[test]
    fn flush_is_repeatable_and_close_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.flac");
        let mut encoder = FlacStreamEncoder::create(&path, StreamFormat::speech()).unwrap();
        assert_eq!(fs::metadata(&path).unwrap().len(), 0);

        encoder.write_block(&pcm(&vec![100; 4410])).unwrap();
        encoder.flush().unwrap();
        let first = fs::read(&path).unwrap();
        assert_eq!(&first[0..4], b"fLaC");

        encoder.flush().unwrap();
        assert_eq!(fs::read(&path).unwrap(), first);

        encoder.close().unwrap();
        encoder.close().unwrap();
        assert!(matches!(
            encoder.write_block(&pcm(&[1])),
            Err(CodecError::Closed)
        ));
    }
}
