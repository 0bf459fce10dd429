//! Microphone capture using cpal
//!
//! The device is opened in exactly the requested rate and channel count.
//! Sample formats are converted in the callback: the device may deliver
//! i16, f32 or i8 while blocks are always handed out as the little-endian
//! PCM layout of the requested format.

use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration as StdDuration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SampleRate, StreamConfig};

use crate::application::ports::{AudioInput, CaptureError, CaptureStream};
use crate::domain::recording::{samples_to_pcm, StreamFormat};

/// How long `read` waits for the callback before reporting no data
const READ_WAIT: StdDuration = StdDuration::from_millis(20);

/// Milliseconds of audio a minimal read buffer holds (doubled, as the
/// platform minimum is rarely enough)
const MIN_BUFFER_MS: u64 = 100;

/// Bytes captured by the device callback and not yet read
#[derive(Default)]
struct CaptureQueue {
    bytes: Vec<u8>,
    error: Option<CaptureError>,
}

type SharedQueue = Arc<(Mutex<CaptureQueue>, Condvar)>;

/// Audio input backed by the default cpal host
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalInput;

impl CpalInput {
    pub fn new() -> Self {
        Self
    }

    /// Get the default input device
    fn get_input_device() -> Result<cpal::Device, CaptureError> {
        let host = cpal::default_host();
        host.default_input_device().ok_or(CaptureError::Unavailable)
    }

    /// Find a device sample format able to deliver `format` exactly
    fn find_sample_format(
        device: &cpal::Device,
        format: StreamFormat,
    ) -> Result<SampleFormat, CaptureError> {
        let supported = device
            .supported_input_configs()
            .map_err(|e| CaptureError::Configuration(format!("Failed to get configs: {}", e)))?;

        let preferred: &[SampleFormat] = if format.bits_per_sample == 8 {
            &[SampleFormat::I8, SampleFormat::I16, SampleFormat::F32]
        } else {
            &[SampleFormat::I16, SampleFormat::F32]
        };

        let candidates: Vec<SampleFormat> = supported
            .filter(|range| {
                range.channels() == format.channels
                    && range.min_sample_rate().0 <= format.sample_rate
                    && range.max_sample_rate().0 >= format.sample_rate
            })
            .map(|range| range.sample_format())
            .collect();

        preferred
            .iter()
            .copied()
            .find(|f| candidates.contains(f))
            .ok_or_else(|| {
                CaptureError::Configuration(format!("input device does not support {}", format))
            })
    }

    fn push_samples(queue: &SharedQueue, samples: &[i32], bits_per_sample: u16) {
        let (lock, ready) = &**queue;
        let mut q = lock.lock().unwrap_or_else(PoisonError::into_inner);
        samples_to_pcm(samples, bits_per_sample, &mut q.bytes);
        ready.notify_one();
    }

    fn build_stream(
        device: &cpal::Device,
        format: StreamFormat,
        sample_format: SampleFormat,
        queue: &SharedQueue,
    ) -> Result<cpal::Stream, CaptureError> {
        let config = StreamConfig {
            channels: format.channels,
            sample_rate: SampleRate(format.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };
        let bits = format.bits_per_sample;
        let shift = if bits == 8 { 8 } else { 0 };
        let scale = format.full_scale() as f32;

        let err_queue = Arc::clone(queue);
        let on_error = move |err: cpal::StreamError| {
            log::error!("Audio input stream error: {}", err);
            let (lock, ready) = &*err_queue;
            let mut q = lock.lock().unwrap_or_else(PoisonError::into_inner);
            q.error = Some(match err {
                cpal::StreamError::DeviceNotAvailable => {
                    CaptureError::InvalidOperation(err.to_string())
                }
                cpal::StreamError::BackendSpecific { .. } => CaptureError::BadValue(err.to_string()),
            });
            ready.notify_one();
        };

        let data_queue = Arc::clone(queue);
        let result = match sample_format {
            SampleFormat::I16 => device.build_input_stream(
                &config,
                move |data: &[i16], _: &cpal::InputCallbackInfo| {
                    let samples: Vec<i32> = data.iter().map(|&s| (s as i32) >> shift).collect();
                    Self::push_samples(&data_queue, &samples, bits);
                },
                on_error,
                None,
            ),
            SampleFormat::F32 => device.build_input_stream(
                &config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let samples: Vec<i32> = data
                        .iter()
                        .map(|&s| (s.clamp(-1.0, 1.0) * scale) as i32)
                        .collect();
                    Self::push_samples(&data_queue, &samples, bits);
                },
                on_error,
                None,
            ),
            SampleFormat::I8 => device.build_input_stream(
                &config,
                move |data: &[i8], _: &cpal::InputCallbackInfo| {
                    let samples: Vec<i32> = data.iter().map(|&s| s as i32).collect();
                    Self::push_samples(&data_queue, &samples, bits);
                },
                on_error,
                None,
            ),
            other => {
                return Err(CaptureError::Configuration(format!(
                    "unsupported device sample format {:?}",
                    other
                )))
            }
        };

        result.map_err(|e| CaptureError::Configuration(e.to_string()))
    }
}

impl AudioInput for CpalInput {
    fn open_capture(&self, format: StreamFormat) -> Result<Box<dyn CaptureStream>, CaptureError> {
        format.validate()?;
        let device = Self::get_input_device()?;
        let sample_format = Self::find_sample_format(&device, format)?;
        let queue: SharedQueue = Arc::new((Mutex::new(CaptureQueue::default()), Condvar::new()));
        let stream = Self::build_stream(&device, format, sample_format, &queue)?;
        // Some hosts start streams on creation
        let _ = stream.pause();

        log::debug!("Opened input device in {} ({:?})", format, sample_format);
        Ok(Box::new(CpalCaptureStream {
            stream,
            format,
            queue,
        }))
    }
}

/// An opened cpal input stream
struct CpalCaptureStream {
    stream: cpal::Stream,
    format: StreamFormat,
    queue: SharedQueue,
}

impl CaptureStream for CpalCaptureStream {
    fn format(&self) -> StreamFormat {
        self.format
    }

    fn min_buffer_size(&self) -> usize {
        let frames = self.format.ms_to_frames(MIN_BUFFER_MS) as usize;
        frames * self.format.frame_size() * 2
    }

    fn start(&mut self) -> Result<(), CaptureError> {
        self.stream
            .play()
            .map_err(|e| CaptureError::InvalidOperation(e.to_string()))
    }

    fn stop(&mut self) -> Result<(), CaptureError> {
        self.stream
            .pause()
            .map_err(|e| CaptureError::InvalidOperation(e.to_string()))?;
        let (lock, _) = &*self.queue;
        lock.lock()
            .unwrap_or_else(PoisonError::into_inner)
            .bytes
            .clear();
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, CaptureError> {
        let (lock, ready) = &*self.queue;
        let guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        let (mut q, _) = ready
            .wait_timeout_while(guard, READ_WAIT, |q| q.bytes.is_empty() && q.error.is_none())
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(err) = q.error.take() {
            return Err(err);
        }

        let frame_size = self.format.frame_size();
        let n = q.bytes.len().min(buf.len()) / frame_size * frame_size;
        buf[..n].copy_from_slice(&q.bytes[..n]);
        q.bytes.drain(..n);
        Ok(n)
    }
}
