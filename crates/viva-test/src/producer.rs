//! Simulated speech producer
//!
//! Stands in for the TTS worker. It synthesizes a sine tone per chunk,
//! spends one credit per chunk and gets one back for every
//! `buffer_processed`. Faults can be injected at a given chunk index.

use std::collections::VecDeque;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use viva_core::{MediaTime, DEFAULT_SAMPLE_RATE};
use viva_wire::{ProducerEvent, ProducerRequest};

/// Producer behavior
#[derive(Clone, Debug)]
pub struct ProducerConfig {
    pub chunk_count: u64,
    pub chunk_duration: Duration,
    /// Random variation of each chunk's length, as a fraction
    pub duration_jitter: f32,
    pub frequency: f32,
    pub amplitude: f32,
    pub sample_rate: u32,
    /// Time to generate one chunk
    pub generation_latency: Duration,
    /// Chunks that may be sent before the first credit returns
    pub initial_credits: u32,
    /// Send `chunk_count` before the first chunk
    pub announce_count: bool,
    /// Tag every chunk with its index
    pub tag_indices: bool,
    /// Report an error instead of this chunk
    pub fail_at: Option<u64>,
    /// Tag this chunk one index too high
    pub skip_at: Option<u64>,
    pub seed: u64,
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            chunk_count: 3,
            chunk_duration: Duration::from_millis(500),
            duration_jitter: 0.0,
            frequency: 220.0,
            amplitude: 0.5,
            sample_rate: DEFAULT_SAMPLE_RATE,
            generation_latency: Duration::from_millis(20),
            initial_credits: 1,
            announce_count: true,
            tag_indices: false,
            fail_at: None,
            skip_at: None,
            seed: 0x5eed,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct ProducerStats {
    pub generations: u64,
    pub chunks_sent: u64,
    pub credits_received: u64,
    pub stops_received: u64,
}

/// Credit-driven producer running on the scenario clock
pub struct SimulatedProducer {
    config: ProducerConfig,
    rng: StdRng,
    words: Vec<String>,
    active: bool,
    next_index: u64,
    credits: u32,
    next_ready: MediaTime,
    sample_clock: u64,
    pending: VecDeque<ProducerEvent>,
    requests: Vec<ProducerRequest>,
    stats: ProducerStats,
}

impl SimulatedProducer {
    pub fn new(config: ProducerConfig) -> Self {
        Self {
            rng: StdRng::seed_from_u64(config.seed),
            config,
            words: Vec::new(),
            active: false,
            next_index: 0,
            credits: 0,
            next_ready: MediaTime::ZERO,
            sample_clock: 0,
            pending: VecDeque::new(),
            requests: Vec::new(),
            stats: ProducerStats::default(),
        }
    }

    pub fn config(&self) -> &ProducerConfig {
        &self.config
    }

    /// True between `generate` and the final `complete`/`error`/`stop`
    pub fn is_generating(&self) -> bool {
        self.active
    }

    /// Every request received, in order
    pub fn requests(&self) -> &[ProducerRequest] {
        &self.requests
    }

    pub fn stats(&self) -> &ProducerStats {
        &self.stats
    }

    pub fn handle_request(&mut self, request: ProducerRequest, now: MediaTime) {
        match &request {
            ProducerRequest::Generate { text, .. } => {
                self.stats.generations += 1;
                self.words = text.split_whitespace().map(str::to_string).collect();
                self.active = true;
                self.next_index = 0;
                self.credits = self.config.initial_credits;
                self.next_ready = now + self.config.generation_latency;
                self.sample_clock = 0;
                self.pending.clear();
                if self.config.announce_count {
                    self.pending.push_back(ProducerEvent::ChunkCount {
                        count: self.config.chunk_count,
                    });
                }
            }
            ProducerRequest::Stop => {
                self.stats.stops_received += 1;
                self.active = false;
                self.pending.clear();
            }
            ProducerRequest::BufferProcessed => {
                self.stats.credits_received += 1;
                self.credits += 1;
            }
        }
        self.requests.push(request);
    }

    /// Events ready at `now`
    pub fn poll(&mut self, now: MediaTime) -> Vec<ProducerEvent> {
        while self.active && self.credits > 0 && self.next_ready <= now {
            if self.next_index >= self.config.chunk_count {
                self.pending.push_back(ProducerEvent::Complete);
                self.active = false;
                break;
            }
            if self.config.fail_at == Some(self.next_index) {
                self.pending.push_back(ProducerEvent::error("synthesis failed"));
                self.active = false;
                break;
            }

            let event = self.synthesize();
            self.pending.push_back(event);
            self.stats.chunks_sent += 1;
            self.credits -= 1;
            self.next_index += 1;
            self.next_ready = self.next_ready + self.config.generation_latency;
        }

        // Completion does not need a credit
        if self.active && self.next_index >= self.config.chunk_count && self.next_ready <= now {
            self.pending.push_back(ProducerEvent::Complete);
            self.active = false;
        }

        self.pending.drain(..).collect()
    }

    fn synthesize(&mut self) -> ProducerEvent {
        let seconds = self.config.chunk_duration.as_secs_f32();
        let jitter = self.config.duration_jitter;
        let scale = if jitter > 0.0 {
            1.0 + self.rng.gen_range(-jitter..=jitter)
        } else {
            1.0
        };
        let len = (seconds * scale * self.config.sample_rate as f32).round() as usize;

        let rate = self.config.sample_rate as f32;
        let step = 2.0 * std::f32::consts::PI * self.config.frequency / rate;
        let samples: Vec<f32> = (0..len)
            .map(|i| self.config.amplitude * (step * (self.sample_clock + i as u64) as f32).sin())
            .collect();
        self.sample_clock += len as u64;

        let text = if self.words.is_empty() {
            String::new()
        } else {
            self.words[(self.next_index as usize) % self.words.len()].clone()
        };

        let index = self.next_index;
        if self.config.skip_at == Some(index) {
            ProducerEvent::indexed_audio(index + 1, &samples, text)
        } else if self.config.tag_indices {
            ProducerEvent::indexed_audio(index, &samples, text)
        } else {
            ProducerEvent::audio(&samples, text)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn generate(producer: &mut SimulatedProducer) {
        producer.handle_request(ProducerRequest::generate("one two three", "v"), MediaTime::ZERO);
    }

    #[test]
    fn test_waits_for_credits() {
        let mut producer = SimulatedProducer::new(ProducerConfig::default());
        generate(&mut producer);

        let events = producer.poll(MediaTime::from_millis(100));
        assert!(matches!(events[0], ProducerEvent::ChunkCount { count: 3 }));
        assert_eq!(events.len(), 2);
        assert!(producer.poll(MediaTime::from_millis(200)).is_empty());

        producer.handle_request(ProducerRequest::BufferProcessed, MediaTime::from_millis(200));
        let events = producer.poll(MediaTime::from_millis(200));
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_completes_after_last_chunk() {
        let mut producer = SimulatedProducer::new(ProducerConfig {
            initial_credits: 10,
            ..Default::default()
        });
        generate(&mut producer);
        let events = producer.poll(MediaTime::from_millis(1000));
        let names: Vec<_> = events.iter().map(|e| e.name()).collect();
        assert_eq!(
            names,
            vec!["chunk_count", "stream_audio_data", "stream_audio_data", "stream_audio_data", "complete"]
        );
        assert!(!producer.is_generating());
    }

    #[test]
    fn test_chunk_audio_and_text() {
        let mut producer = SimulatedProducer::new(ProducerConfig {
            announce_count: false,
            ..Default::default()
        });
        generate(&mut producer);
        let events = producer.poll(MediaTime::from_millis(20));
        let chunk = events[0].to_chunk(0, DEFAULT_SAMPLE_RATE).unwrap().unwrap();
        assert_eq!(chunk.duration(), Duration::from_millis(500));
        assert!(chunk.peak() > 0.45);
        let ProducerEvent::StreamAudioData { text, .. } = &events[0] else {
            panic!("expected audio");
        };
        assert_eq!(text, "one");
    }

    #[test]
    fn test_stop_silences() {
        let mut producer = SimulatedProducer::new(ProducerConfig::default());
        generate(&mut producer);
        producer.handle_request(ProducerRequest::Stop, MediaTime::from_millis(1));
        assert!(producer.poll(MediaTime::from_secs_f64(10.0)).is_empty());
        assert_eq!(producer.stats().stops_received, 1);
    }

    #[test]
    fn test_fault_injection() {
        let mut producer = SimulatedProducer::new(ProducerConfig {
            fail_at: Some(0),
            ..Default::default()
        });
        generate(&mut producer);
        let events = producer.poll(MediaTime::from_millis(50));
        assert!(matches!(events.last(), Some(ProducerEvent::Error { .. })));

        let mut producer = SimulatedProducer::new(ProducerConfig {
            skip_at: Some(0),
            announce_count: false,
            ..Default::default()
        });
        generate(&mut producer);
        let events = producer.poll(MediaTime::from_millis(50));
        assert!(matches!(
            events[0],
            ProducerEvent::StreamAudioData { index: Some(1), .. }
        ));
    }

    #[test]
    fn test_jitter_varies_length() {
        let mut producer = SimulatedProducer::new(ProducerConfig {
            duration_jitter: 0.5,
            initial_credits: 10,
            chunk_count: 8,
            announce_count: false,
            ..Default::default()
        });
        generate(&mut producer);
        let lengths: Vec<usize> = producer
            .poll(MediaTime::from_secs_f64(1.0))
            .iter()
            .filter_map(|e| e.to_chunk(0, DEFAULT_SAMPLE_RATE).ok().flatten())
            .map(|c| c.len())
            .collect();
        assert_eq!(lengths.len(), 8);
        assert!(lengths.iter().any(|l| *l != lengths[0]));
    }
}
