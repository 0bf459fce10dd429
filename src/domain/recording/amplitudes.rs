//! Amplitude snapshots and running amplitude statistics

/// Amplitude statistics at a point in a recording or decoded stream.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AmplitudeSnapshot {
    /// Position in milliseconds
    pub position_ms: u64,
    /// Peak amplitude, normalized to 0..1
    pub peak: f32,
    /// Average amplitude, normalized to 0..1
    pub average: f32,
}

impl AmplitudeSnapshot {
    pub const fn new(position_ms: u64, peak: f32, average: f32) -> Self {
        Self {
            position_ms,
            peak,
            average,
        }
    }

    /// The same snapshot shifted by `base_ms`
    pub fn offset(self, base_ms: u64) -> Self {
        Self {
            position_ms: self.position_ms + base_ms,
            ..self
        }
    }

    pub fn position_secs(&self) -> f64 {
        self.position_ms as f64 / 1000.0
    }

    /// Merge the statistics of the segment that followed this one.
    ///
    /// Positions add up, the peak is the maximum, and the average is weighted
    /// by elapsed time against the new cumulative position. The weights are
    /// only correct when segments are merged in the order they were recorded.
    pub fn accumulate(&mut self, next: &AmplitudeSnapshot) {
        let old_pos = self.position_ms as f64;
        let delta = next.position_ms as f64;
        let new_pos = old_pos + delta;

        self.peak = self.peak.max(next.peak);
        if new_pos > 0.0 {
            let average =
                self.average as f64 * (old_pos / new_pos) + next.average as f64 * (delta / new_pos);
            self.average = average as f32;
        }
        self.position_ms += next.position_ms;
    }
}

/// Running peak/average statistics over PCM samples.
///
/// Each sample is folded to its magnitude (negative values via `-(v + 1)` so
/// the asymmetric range stays inside full scale) and normalized. The peak
/// covers every sample, the average only the first channel of each frame.
#[derive(Debug, Clone, Default)]
pub struct AmplitudeMeter {
    peak: f32,
    sum: f64,
    count: u64,
}

impl AmplitudeMeter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, samples: &[i32], channels: usize, full_scale: i32) {
        let channels = channels.max(1);
        let scale = full_scale.max(1) as f32;
        for (i, &sample) in samples.iter().enumerate() {
            let magnitude = if sample < 0 { -(sample + 1) } else { sample };
            let amp = magnitude as f32 / scale;
            if amp > self.peak {
                self.peak = amp;
            }
            if i % channels == 0 {
                self.sum += amp as f64;
                self.count += 1;
            }
        }
    }

    pub fn peak(&self) -> f32 {
        self.peak
    }

    pub fn average(&self) -> f32 {
        if self.count == 0 {
            return 0.0;
        }
        (self.sum / self.count as f64) as f32
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
