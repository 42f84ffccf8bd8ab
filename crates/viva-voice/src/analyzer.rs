//! Signal Analyzer - mouth movement from speech audio
//!
//! Two strategies, chosen by `AnalysisMode`:
//!
//! - `Spectral`: every frame the window the listener is hearing goes through
//!   a Hann-windowed FFT. Bin magnitudes are smoothed over time and mapped to
//!   a 0..1 decibel scale. Mean energy drives mouth opening. Low band minus
//!   mid band energy drives the form.
//! - `ChunkAccumulation`: everything received so far is periodically
//!   re-encoded as one WAV so the render target can run its own audio-driven
//!   lip sync. The local signal stays neutral.

use std::sync::Arc;
use std::time::Duration;

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use serde::{Deserialize, Serialize};

use viva_core::{AudioChunk, MediaTime, MouthSignal, VivaError, VivaResult, DEFAULT_SAMPLE_RATE};
use viva_wire::encode_chunks;

use crate::{AudioOutput, PlaybackEngine};

/// How the mouth signal is produced
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisMode {
    /// Local FFT of the audible window
    #[default]
    Spectral,
    /// Periodic WAV hand-off to the render target
    ChunkAccumulation,
}

/// Analyzer configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    pub mode: AnalysisMode,
    /// Multiplier from mean bin energy to mouth opening
    pub gain: f32,
    /// Multiplier from band difference to mouth form
    pub form_gain: f32,
    /// FFT length, a power of two
    pub fft_size: usize,
    /// Per-bin temporal smoothing in [0, 1)
    pub smoothing: f32,
    pub min_db: f32,
    pub max_db: f32,
    /// Low band [from, to) in Hz
    pub low_band_hz: (f32, f32),
    /// Mid band [from, to) in Hz
    pub mid_band_hz: (f32, f32),
    /// Minimum time between two accumulated hand-offs
    pub accumulation_interval_ms: u64,
    /// Volume the render target plays the accumulated audio at
    pub accumulation_volume: f32,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            mode: AnalysisMode::Spectral,
            gain: 3.0,
            form_gain: 2.0,
            fft_size: 256,
            smoothing: 0.8,
            min_db: -100.0,
            max_db: -30.0,
            low_band_hz: (80.0, 500.0),
            mid_band_hz: (500.0, 2500.0),
            accumulation_interval_ms: 250,
            accumulation_volume: 0.0,
        }
    }
}

impl AnalyzerConfig {
    pub fn validate(&self) -> VivaResult<()> {
        if !self.fft_size.is_power_of_two() || self.fft_size < 32 {
            return Err(VivaError::Config(format!(
                "fft_size must be a power of two >= 32, got {}",
                self.fft_size
            )));
        }
        if !(0.0..1.0).contains(&self.smoothing) {
            return Err(VivaError::Config(format!(
                "smoothing must be in [0, 1), got {}",
                self.smoothing
            )));
        }
        if self.min_db >= self.max_db {
            return Err(VivaError::Config(format!(
                "min_db ({}) must be below max_db ({})",
                self.min_db, self.max_db
            )));
        }
        if !(self.gain >= 0.0 && self.form_gain >= 0.0) {
            return Err(VivaError::Config("gains must be non-negative".into()));
        }
        for (name, (from, to)) in [("low_band_hz", self.low_band_hz), ("mid_band_hz", self.mid_band_hz)] {
            if !(from >= 0.0 && from < to) {
                return Err(VivaError::Config(format!("{name} must be an increasing range")));
            }
        }
        if !(0.0..=1.0).contains(&self.accumulation_volume) {
            return Err(VivaError::Config(format!(
                "accumulation_volume must be in [0, 1], got {}",
                self.accumulation_volume
            )));
        }
        Ok(())
    }

    pub fn accumulation_interval(&self) -> Duration {
        Duration::from_millis(self.accumulation_interval_ms)
    }
}

/// Audio assembled for the render target's own lip sync
#[derive(Clone, Debug, PartialEq)]
pub struct AccumulatedAudio {
    /// Complete WAV file of every chunk received so far
    pub wav: Vec<u8>,
    pub volume: f32,
    pub chunk_count: usize,
    pub duration: Duration,
}

/// Mouth signal producer
pub struct SignalAnalyzer {
    config: AnalyzerConfig,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    scratch: Vec<Complex<f32>>,
    /// Smoothed linear magnitudes, one per bin
    smoothed: Vec<f32>,
    /// Normalized 0..1 levels of the last analysis
    levels: Vec<f32>,

    accumulated: Vec<AudioChunk>,
    accumulated_duration: Duration,
    dirty: bool,
    last_handoff: Option<MediaTime>,
}

impl SignalAnalyzer {
    pub fn new(config: AnalyzerConfig) -> VivaResult<Self> {
        config.validate()?;
        let n = config.fft_size;
        let fft = FftPlanner::new().plan_fft_forward(n);
        let window = (0..n)
            .map(|i| 0.5 - 0.5 * (2.0 * std::f32::consts::PI * i as f32 / n as f32).cos())
            .collect();

        Ok(Self {
            fft,
            window,
            scratch: vec![Complex::new(0.0, 0.0); n],
            smoothed: vec![0.0; n / 2],
            levels: vec![0.0; n / 2],
            accumulated: Vec::new(),
            accumulated_duration: Duration::ZERO,
            dirty: false,
            last_handoff: None,
            config,
        })
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    pub fn mode(&self) -> AnalysisMode {
        self.config.mode
    }

    /// Normalized bin levels from the last spectral analysis
    pub fn levels(&self) -> &[f32] {
        &self.levels
    }

    /// Signal for whatever the engine is playing at `now`
    pub fn analyze_engine<D: AudioOutput>(&mut self, engine: &PlaybackEngine<D>, now: MediaTime) -> MouthSignal {
        match engine.audible_window(now, self.config.fft_size) {
            Some(window) => {
                let rate = engine.cursor_sample_rate().unwrap_or(DEFAULT_SAMPLE_RATE);
                self.analyze(window, rate)
            }
            None => self.silence(),
        }
    }

    /// Signal for a window of audible samples
    ///
    /// An empty window means nothing is audible: the result is neutral and
    /// the smoothing history is dropped.
    pub fn analyze(&mut self, samples: &[f32], sample_rate: u32) -> MouthSignal {
        if self.config.mode != AnalysisMode::Spectral || samples.is_empty() || sample_rate == 0 {
            return self.silence();
        }

        let n = self.config.fft_size;
        let take = samples.len().min(n);
        let tail = &samples[samples.len() - take..];
        for (i, slot) in self.scratch.iter_mut().enumerate() {
            let sample = tail.get(i).copied().unwrap_or(0.0);
            *slot = Complex::new(sample * self.window[i], 0.0);
        }
        self.fft.process(&mut self.scratch);

        let k = self.config.smoothing;
        let range = self.config.max_db - self.config.min_db;
        for (bin, value) in self.scratch[..n / 2].iter().enumerate() {
            let magnitude = value.norm() / n as f32;
            let smoothed = k * self.smoothed[bin] + (1.0 - k) * magnitude;
            self.smoothed[bin] = smoothed;

            let db = if smoothed > 0.0 {
                20.0 * smoothed.log10()
            } else {
                self.config.min_db
            };
            self.levels[bin] = ((db - self.config.min_db) / range).clamp(0.0, 1.0);
        }

        let energy = mean(&self.levels);
        let bin_hz = sample_rate as f32 / n as f32;
        let low = self.band_level(self.config.low_band_hz, bin_hz);
        let mid = self.band_level(self.config.mid_band_hz, bin_hz);

        MouthSignal::new(energy * self.config.gain, (low - mid) * self.config.form_gain)
    }

    /// Keep a chunk for the next accumulated hand-off
    pub fn feed(&mut self, chunk: &AudioChunk) {
        if self.config.mode != AnalysisMode::ChunkAccumulation {
            return;
        }
        self.accumulated_duration += chunk.duration();
        self.accumulated.push(chunk.clone());
        self.dirty = true;
    }

    /// Everything received so far as one WAV, at most once per interval
    ///
    /// Nothing is returned unless new audio arrived since the last hand-off.
    pub fn poll_accumulated(&mut self, now: MediaTime) -> Option<AccumulatedAudio> {
        if let Some(last) = self.last_handoff {
            if now.since(last) < self.config.accumulation_interval() {
                return None;
            }
        }
        self.take_accumulated(now)
    }

    /// Hand off pending audio regardless of the interval
    pub fn flush_accumulated(&mut self, now: MediaTime) -> Option<AccumulatedAudio> {
        self.take_accumulated(now)
    }

    /// Drop smoothing and accumulation state for a new session
    pub fn reset(&mut self) {
        self.clear_spectrum();
        self.accumulated.clear();
        self.accumulated_duration = Duration::ZERO;
        self.dirty = false;
        self.last_handoff = None;
    }

    fn take_accumulated(&mut self, now: MediaTime) -> Option<AccumulatedAudio> {
        if !self.dirty {
            return None;
        }
        self.dirty = false;
        self.last_handoff = Some(now);

        let wav = encode_chunks(&self.accumulated, DEFAULT_SAMPLE_RATE);
        tracing::debug!(
            chunks = self.accumulated.len(),
            bytes = wav.len(),
            "accumulated audio ready"
        );
        Some(AccumulatedAudio {
            wav,
            volume: self.config.accumulation_volume,
            chunk_count: self.accumulated.len(),
            duration: self.accumulated_duration,
        })
    }

    fn silence(&mut self) -> MouthSignal {
        self.clear_spectrum();
        MouthSignal::NEUTRAL
    }

    fn clear_spectrum(&mut self) {
        self.smoothed.iter_mut().for_each(|m| *m = 0.0);
        self.levels.iter_mut().for_each(|l| *l = 0.0);
    }

    fn band_level(&self, (from, to): (f32, f32), bin_hz: f32) -> f32 {
        let bins: Vec<f32> = self
            .levels
            .iter()
            .enumerate()
            .filter(|(bin, _)| {
                let hz = *bin as f32 * bin_hz;
                hz >= from && hz < to
            })
            .map(|(_, level)| *level)
            .collect();
        mean(&bins)
    }
}

fn mean(values: &[f32]) -> f32 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f32>() / values.len() as f32
    }
}
