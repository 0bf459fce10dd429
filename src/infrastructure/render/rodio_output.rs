//! Rodio-based audio output adapter
//!
//! Each PCM block becomes one `SamplesBuffer` appended to a sink, so the
//! sink's queue length tells how many blocks are still pending.

use std::collections::VecDeque;

use rodio::buffer::SamplesBuffer;
use rodio::{OutputStream, OutputStreamHandle, Sink};

use crate::application::ports::{AudioOutput, RenderError, RenderStream};
use crate::domain::recording::{pcm_to_samples, StreamFormat};

/// Audio output on the default rodio device
#[derive(Debug, Default, Clone, Copy)]
pub struct RodioOutput;

impl RodioOutput {
    pub fn new() -> Self {
        Self
    }
}

impl AudioOutput for RodioOutput {
    fn open_render(&self, format: StreamFormat) -> Result<Box<dyn RenderStream>, RenderError> {
        format
            .validate()
            .map_err(|e| RenderError::Configuration(e.to_string()))?;

        let (stream, handle) =
            OutputStream::try_default().map_err(|e| RenderError::Unavailable(e.to_string()))?;
        let sink = Sink::try_new(&handle).map_err(|e| RenderError::Playback(e.to_string()))?;
        sink.pause();

        Ok(Box::new(RodioRenderStream {
            _stream: stream,
            _handle: handle,
            sink,
            format,
            blocks: VecDeque::new(),
        }))
    }
}

/// An opened rodio sink
struct RodioRenderStream {
    _stream: OutputStream,
    _handle: OutputStreamHandle,
    sink: Sink,
    format: StreamFormat,
    /// Duration in ms of each block still in the sink
    blocks: VecDeque<u64>,
}

impl RenderStream for RodioRenderStream {
    fn write(&mut self, pcm: &[u8]) -> Result<(), RenderError> {
        let samples: Vec<i16> = if self.format.bits_per_sample == 8 {
            pcm_to_samples(pcm, 8)
                .into_iter()
                .map(|s| (s << 8) as i16)
                .collect()
        } else {
            pcm_to_samples(pcm, 16).into_iter().map(|s| s as i16).collect()
        };
        if samples.is_empty() {
            return Ok(());
        }

        self.blocks.push_back(self.format.bytes_to_ms(pcm.len()));
        self.sink.append(SamplesBuffer::new(
            self.format.channels,
            self.format.sample_rate,
            samples,
        ));
        Ok(())
    }

    fn queued_ms(&mut self) -> u64 {
        while self.blocks.len() > self.sink.len() {
            self.blocks.pop_front();
        }
        self.blocks.iter().sum()
    }

    fn set_paused(&mut self, paused: bool) {
        if paused {
            self.sink.pause();
        } else {
            self.sink.play();
        }
    }

    fn stop(&mut self) {
        self.sink.stop();
        self.blocks.clear();
    }
}
