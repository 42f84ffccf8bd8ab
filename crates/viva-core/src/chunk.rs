//! Audio chunks - ordered units of PCM produced by the speech producer
//!
//! A chunk is immutable once created. Samples live behind an `Arc` so the
//! playback engine, the analyzer and the session recording can all hold the
//! same chunk without copying it.

use std::sync::Arc;
use std::time::Duration;

/// Sample rate used by the speech producer
pub const DEFAULT_SAMPLE_RATE: u32 = 24_000;

/// One ordered unit of 32-bit float PCM audio
#[derive(Clone, Debug, PartialEq)]
pub struct AudioChunk {
    /// Position in the session, starting at 0
    pub sequence_index: u64,
    /// Mono samples in [-1, 1]
    samples: Arc<[f32]>,
    /// Samples per second, fixed for a session
    pub sample_rate: u32,
}

impl AudioChunk {
    /// Create a chunk. Samples outside [-1, 1] are clamped and NaN becomes silence.
    pub fn new(sequence_index: u64, samples: Vec<f32>, sample_rate: u32) -> Self {
        let samples: Vec<f32> = samples.into_iter().map(sanitize_sample).collect();
        Self {
            sequence_index,
            samples: samples.into(),
            sample_rate,
        }
    }

    /// A chunk of `duration` silence
    pub fn silence(sequence_index: u64, duration: Duration, sample_rate: u32) -> Self {
        let len = (duration.as_secs_f64() * sample_rate as f64).round() as usize;
        Self::new(sequence_index, vec![0.0; len], sample_rate)
    }

    #[inline]
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Shared handle to the sample storage
    #[inline]
    pub fn shared_samples(&self) -> Arc<[f32]> {
        Arc::clone(&self.samples)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Playback length of the chunk
    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_nanos(self.samples.len() as u64 * 1_000_000_000 / u64::from(self.sample_rate))
    }

    /// Sample offset corresponding to `elapsed` playback time, clamped to the chunk
    pub fn offset_at(&self, elapsed: Duration) -> usize {
        let offset = (elapsed.as_secs_f64() * self.sample_rate as f64) as usize;
        offset.min(self.samples.len())
    }

    /// Up to `len` samples ending at the playback position `elapsed`
    ///
    /// This is what a listener has just heard, the input for spectral analysis.
    pub fn window_ending_at(&self, elapsed: Duration, len: usize) -> &[f32] {
        let end = self.offset_at(elapsed).max(len.min(self.samples.len()));
        let start = end.saturating_sub(len);
        &self.samples[start..end]
    }

    /// Peak absolute amplitude
    pub fn peak(&self) -> f32 {
        self.samples.iter().fold(0.0f32, |acc, s| acc.max(s.abs()))
    }

    /// Root-mean-square amplitude
    pub fn rms(&self) -> f32 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let sum: f32 = self.samples.iter().map(|s| s * s).sum();
        (sum / self.samples.len() as f32).sqrt()
    }
}

#[inline]
fn sanitize_sample(sample: f32) -> f32 {
    if sample.is_nan() {
        0.0
    } else {
        sample.clamp(-1.0, 1.0)
    }
}
