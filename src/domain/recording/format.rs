//! PCM stream format value object

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::error::UnsupportedFormatError;

/// Sample rate used for recording when nothing else is configured
pub const DEFAULT_SAMPLE_RATE: u32 = 22050;

/// Interleaved PCM layout shared by capture, codec and render.
///
/// Samples are signed and little-endian: `i8` for 8-bit, `i16` for 16-bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
}

impl StreamFormat {
    pub const fn new(sample_rate: u32, channels: u16, bits_per_sample: u16) -> Self {
        Self {
            sample_rate,
            channels,
            bits_per_sample,
        }
    }

    /// Mono 16-bit at the default recording rate
    pub const fn speech() -> Self {
        Self::new(DEFAULT_SAMPLE_RATE, 1, 16)
    }

    /// Check the format against what the codec and devices support:
    /// one or two channels, 8 or 16 bits per sample.
    pub fn validate(&self) -> Result<(), UnsupportedFormatError> {
        let fail = |reason: &str| UnsupportedFormatError {
            format: self.to_string(),
            reason: reason.to_string(),
        };
        if self.sample_rate == 0 {
            return Err(fail("sample rate must be positive"));
        }
        if !(1..=2).contains(&self.channels) {
            return Err(fail("only mono and stereo are supported"));
        }
        if self.bits_per_sample != 8 && self.bits_per_sample != 16 {
            return Err(fail("only 8 and 16 bit samples are supported"));
        }
        Ok(())
    }

    pub const fn bytes_per_sample(&self) -> usize {
        (self.bits_per_sample / 8) as usize
    }

    /// Bytes per interleaved frame (one sample for every channel)
    pub const fn frame_size(&self) -> usize {
        self.bytes_per_sample() * self.channels as usize
    }

    /// Largest positive sample value, used to normalize amplitudes
    pub const fn full_scale(&self) -> i32 {
        if self.bits_per_sample == 8 {
            i8::MAX as i32
        } else {
            i16::MAX as i32
        }
    }

    pub fn frames_to_ms(&self, frames: u64) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        frames * 1000 / self.sample_rate as u64
    }

    pub fn bytes_to_ms(&self, bytes: usize) -> u64 {
        let frame = self.frame_size();
        if frame == 0 {
            return 0;
        }
        self.frames_to_ms((bytes / frame) as u64)
    }

    pub fn ms_to_frames(&self, ms: u64) -> u64 {
        ms * self.sample_rate as u64 / 1000
    }
}

impl Default for StreamFormat {
    fn default() -> Self {
        Self::speech()
    }
}

impl fmt::Display for StreamFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}Hz/{}ch/{}bit",
            self.sample_rate, self.channels, self.bits_per_sample
        )
    }
}

/// Decode interleaved little-endian PCM bytes into widened samples.
/// Trailing bytes that do not form a whole sample are ignored.
pub fn pcm_to_samples(pcm: &[u8], bits_per_sample: u16) -> Vec<i32> {
    if bits_per_sample == 8 {
        pcm.iter().map(|&b| b as i8 as i32).collect()
    } else {
        pcm.chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as i32)
            .collect()
    }
}

/// Encode samples as interleaved little-endian PCM bytes, appending to `out`.
pub fn samples_to_pcm(samples: &[i32], bits_per_sample: u16, out: &mut Vec<u8>) {
    if bits_per_sample == 8 {
        out.extend(samples.iter().map(|&s| s.clamp(i8::MIN as i32, i8::MAX as i32) as i8 as u8));
    } else {
        for &s in samples {
            let s = s.clamp(i16::MIN as i32, i16::MAX as i32) as i16;
            out.extend_from_slice(&s.to_le_bytes());
        }
    }
}
