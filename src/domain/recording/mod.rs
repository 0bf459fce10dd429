//! Recording value objects

mod amplitudes;
mod duration;
mod format;

pub use amplitudes::{AmplitudeMeter, AmplitudeSnapshot};
pub use duration::{
    Duration, DEFAULT_IDLE_WAIT_MS, DEFAULT_PROGRESS_INTERVAL_MS, DEFAULT_RETRY_WAIT_MS,
};
pub use format::{pcm_to_samples, samples_to_pcm, StreamFormat, DEFAULT_SAMPLE_RATE};
