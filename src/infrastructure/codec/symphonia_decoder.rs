//! Block decoder built on symphonia
//!
//! Reads FLAC segments from disk and, for remote clips, any container
//! symphonia can detect (MP3, Ogg, WAV) from an arbitrary byte source.
//! Decoded audio is handed out as interleaved little-endian PCM in the
//! stream's own sample rate and channel layout.

use std::fs::File;
use std::io;
use std::path::Path;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::{MediaSource, MediaSourceStream};
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::application::ports::{CodecError, StreamDecoder};
use crate::domain::recording::{pcm_to_samples, AmplitudeMeter, StreamFormat};

/// Frames per packet assumed when the stream does not declare a maximum
const DEFAULT_MAX_FRAMES: u64 = 4096;

/// Decoder over one audio stream
pub struct SymphoniaDecoder {
    reader: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    format: StreamFormat,
    max_frames: u64,
    /// Frames the stream declares; the last FLAC block is padded past it
    total_frames: Option<u64>,
    /// Frames moved into `pending` so far
    frames_decoded: u64,
    pending: Vec<u8>,
    pending_pos: usize,
    frames_out: u64,
    meter: AmplitudeMeter,
    finished: bool,
    closed: bool,
}

impl SymphoniaDecoder {
    /// Open a file, using its extension as a format hint
    pub fn open(path: &Path) -> Result<Self, CodecError> {
        let file =
            File::open(path).map_err(|e| CodecError::Io(format!("{}: {}", path.display(), e)))?;
        let extension = path.extension().and_then(|e| e.to_str());
        Self::from_source(Box::new(file), extension)
    }

    /// Probe and open any media source
    pub fn from_source(
        source: Box<dyn MediaSource>,
        extension: Option<&str>,
    ) -> Result<Self, CodecError> {
        let stream = MediaSourceStream::new(source, Default::default());
        let mut hint = Hint::new();
        if let Some(ext) = extension {
            hint.with_extension(ext);
        }

        let detected = symphonia::default::get_probe()
            .format(
                &hint,
                stream,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| CodecError::Format(e.to_string()))?;
        let reader = detected.format;

        let track = reader
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| CodecError::Format("no audio track".to_string()))?;
        let params = track.codec_params.clone();
        let track_id = track.id;

        let sample_rate = params
            .sample_rate
            .ok_or_else(|| CodecError::Format("stream declares no sample rate".to_string()))?;
        let channels = params
            .channels
            .map(|c| c.count() as u16)
            .ok_or_else(|| CodecError::Format("stream declares no channel layout".to_string()))?;
        let bits_per_sample = match params.bits_per_sample {
            Some(8) => 8,
            _ => 16,
        };
        let format = StreamFormat::new(sample_rate, channels, bits_per_sample);
        format
            .validate()
            .map_err(|e| CodecError::Format(e.to_string()))?;

        let decoder = symphonia::default::get_codecs()
            .make(&params, &DecoderOptions::default())
            .map_err(|e| CodecError::Format(e.to_string()))?;

        Ok(Self {
            reader,
            decoder,
            track_id,
            format,
            max_frames: params.max_frames_per_packet.unwrap_or(DEFAULT_MAX_FRAMES),
            total_frames: params.n_frames,
            frames_decoded: 0,
            pending: Vec::new(),
            pending_pos: 0,
            frames_out: 0,
            meter: AmplitudeMeter::new(),
            finished: false,
            closed: false,
        })
    }

    /// Decode the next packet of our track into `pending`.
    /// Returns `false` at end of stream.
    fn decode_next(&mut self) -> Result<bool, CodecError> {
        loop {
            if self
                .total_frames
                .is_some_and(|total| self.frames_decoded >= total)
            {
                return Ok(false);
            }

            let packet = match self.reader.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e)) if e.kind() == io::ErrorKind::UnexpectedEof => {
                    return Ok(false);
                }
                Err(SymphoniaError::ResetRequired) => return Ok(false),
                Err(SymphoniaError::IoError(e)) => return Err(CodecError::Io(e.to_string())),
                Err(e) => return Err(CodecError::Format(e.to_string())),
            };
            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = match self.decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::DecodeError(e)) => {
                    log::warn!("Skipping undecodable packet: {}", e);
                    continue;
                }
                Err(e) => return Err(CodecError::Format(e.to_string())),
            };
            if decoded.frames() == 0 {
                continue;
            }

            let spec = *decoded.spec();
            let mut samples = SampleBuffer::<i16>::new(decoded.capacity() as u64, spec);
            samples.copy_interleaved_ref(decoded);

            self.pending.clear();
            self.pending_pos = 0;
            if self.format.bits_per_sample == 8 {
                self.pending
                    .extend(samples.samples().iter().map(|&s| ((s >> 8) as i8) as u8));
            } else {
                for &s in samples.samples() {
                    self.pending.extend_from_slice(&s.to_le_bytes());
                }
            }

            let frame_size = self.format.frame_size();
            let mut frames = (self.pending.len() / frame_size) as u64;
            if let Some(total) = self.total_frames {
                let remaining = total.saturating_sub(self.frames_decoded);
                if frames > remaining {
                    frames = remaining;
                    self.pending.truncate(remaining as usize * frame_size);
                }
            }
            self.frames_decoded += frames;
            if frames == 0 {
                continue;
            }
            return Ok(true);
        }
    }
}

impl StreamDecoder for SymphoniaDecoder {
    fn format(&self) -> StreamFormat {
        self.format
    }

    fn min_block_size(&self) -> usize {
        self.max_frames as usize * self.format.frame_size()
    }

    fn read_block(&mut self, buf: &mut [u8]) -> Result<usize, CodecError> {
        if self.closed {
            return Err(CodecError::Closed);
        }
        let frame_size = self.format.frame_size();
        if buf.len() < frame_size {
            return Err(CodecError::Configuration(format!(
                "buffer of {} bytes cannot hold one {} byte frame",
                buf.len(),
                frame_size
            )));
        }

        while self.pending_pos >= self.pending.len() {
            if self.finished || !self.decode_next()? {
                self.finished = true;
                return Ok(0);
            }
        }

        let available = self.pending.len() - self.pending_pos;
        let n = available.min(buf.len()) / frame_size * frame_size;
        let block = &self.pending[self.pending_pos..self.pending_pos + n];
        buf[..n].copy_from_slice(block);
        self.pending_pos += n;

        let samples = pcm_to_samples(block, self.format.bits_per_sample);
        self.meter.observe(
            &samples,
            self.format.channels as usize,
            self.format.full_scale(),
        );
        self.frames_out += (n / frame_size) as u64;
        Ok(n)
    }

    fn close(&mut self) {
        self.closed = true;
        self.pending = Vec::new();
        self.pending_pos = 0;
    }

    fn peak_amplitude(&self) -> f32 {
        self.meter.peak()
    }

    fn average_amplitude(&self) -> f32 {
        self.meter.average()
    }

    fn position_ms(&self) -> u64 {
        self.format.frames_to_ms(self.frames_out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::StreamEncoder;
    use crate::domain::recording::samples_to_pcm;
    use crate::infrastructure::codec::FlacStreamEncoder;

    fn write_tone(path: &Path, format: StreamFormat, frames: usize, level: i32) {
        let mut encoder = FlacStreamEncoder::create(path, format).unwrap();
        let samples = vec![level; frames * format.channels as usize];
        let mut pcm = Vec::new();
        samples_to_pcm(&samples, format.bits_per_sample, &mut pcm);
        encoder.write_block(&pcm).unwrap();
        encoder.close().unwrap();
    }

    fn drain(decoder: &mut SymphoniaDecoder) -> Vec<u8> {
        let mut out = Vec::new();
        let mut buf = vec![0u8; decoder.min_block_size()];
        loop {
            let n = decoder.read_block(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        out
    }

    #[test]
    fn decodes_what_was_encoded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("1.flac");
        write_tone(&path, StreamFormat::speech(), 11025, 8000);

        let mut decoder = SymphoniaDecoder::open(&path).unwrap();
        assert_eq!(decoder.format(), StreamFormat::speech());
        let pcm = drain(&mut decoder);

        assert_eq!(pcm.len(), 11025 * 2);
        assert!(pcm_to_samples(&pcm, 16).iter().all(|&s| s == 8000));
        assert_eq!(decoder.position_ms(), 500);
        assert!((decoder.peak_amplitude() - 8000.0 / 32767.0).abs() < 0.001);
    }

    #[test]
    fn block_padding_is_not_decoded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("1.flac");
        let format = StreamFormat::new(22050, 2, 16);
        // Neither a multiple of the encoder block size nor of a read buffer
        write_tone(&path, format, 4096 * 2 + 77, 1200);

        let mut decoder = SymphoniaDecoder::open(&path).unwrap();
        let mut total = 0;
        let mut buf = vec![0u8; 1000 * format.frame_size()];
        loop {
            let n = decoder.read_block(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            assert!(pcm_to_samples(&buf[..n], 16).iter().all(|&s| s == 1200));
            total += n;
        }

        assert_eq!(total, (4096 * 2 + 77) * format.frame_size());
        assert_eq!(decoder.position_ms(), format.frames_to_ms(4096 * 2 + 77));
    }

    #[test]
    fn stereo_stream_keeps_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("1.flac");
        let format = StreamFormat::new(16000, 2, 16);
        write_tone(&path, format, 1600, -300);

        let mut decoder = SymphoniaDecoder::open(&path).unwrap();
        assert_eq!(decoder.format(), format);
        assert_eq!(drain(&mut decoder).len(), 1600 * 4);
    }

    #[test]
    fn end_of_stream_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("1.flac");
        write_tone(&path, StreamFormat::speech(), 100, 1);

        let mut decoder = SymphoniaDecoder::open(&path).unwrap();
        drain(&mut decoder);
        let mut buf = vec![0u8; 64];
        assert_eq!(decoder.read_block(&mut buf).unwrap(), 0);
        assert_eq!(decoder.read_block(&mut buf).unwrap(), 0);
    }

    #[test]
    fn tiny_buffer_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("1.flac");
        write_tone(&path, StreamFormat::new(22050, 2, 16), 100, 1);

        let mut decoder = SymphoniaDecoder::open(&path).unwrap();
        let mut buf = [0u8; 3];
        assert!(matches!(
            decoder.read_block(&mut buf),
            Err(CodecError::Configuration(_))
        ));
    }

    #[test]
    fn foreign_file_is_a_format_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("1.flac");
        std::fs::write(&path, b"definitely not audio data at all").unwrap();
        assert!(matches!(
            SymphoniaDecoder::open(&path),
            Err(CodecError::Format(_))
        ));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            SymphoniaDecoder::open(&dir.path().join("none.flac")),
            Err(CodecError::Io(_))
        ));
    }

    #[test]
    fn closed_decoder_refuses_reads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("1.flac");
        write_tone(&path, StreamFormat::speech(), 100, 1);

        let mut decoder = SymphoniaDecoder::open(&path).unwrap();
        decoder.close();
        decoder.close();
        let mut buf = vec![0u8; 64];
        assert!(matches!(
            decoder.read_block(&mut buf),
            Err(CodecError::Closed)
        ));
    }
}
