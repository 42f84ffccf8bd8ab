//! Scenario runner
//!
//! Steps the coordinator, the simulated producer, the simulated device and
//! the frame clock together on one virtual clock, the way the stage loop
//! does with real timers.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use viva_core::{MediaTime, MouthSignal, SessionState, VivaResult};
use viva_runtime::{RuntimeConfig, SessionHandle, SessionOutcome, StreamCoordinator, StreamOptions};
use viva_visual::FrameRequest;

use crate::device::{DeviceProbe, SimulatedOutput};
use crate::producer::{ProducerConfig, SimulatedProducer};
use crate::target::{RecordingTarget, MOUTH_FORM, MOUTH_OPEN};

#[derive(Clone, Debug)]
pub struct ScenarioConfig {
    pub runtime: RuntimeConfig,
    pub producer: ProducerConfig,
    /// Virtual time per step
    pub step: Duration,
    /// `run_to_outcome` gives up after this much virtual time
    pub time_limit: Duration,
    pub suspended_device: bool,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            runtime: RuntimeConfig::default(),
            producer: ProducerConfig::default(),
            step: Duration::from_millis(1),
            time_limit: Duration::from_secs(30),
            suspended_device: false,
        }
    }
}

/// One fired frame
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameSample {
    pub at: MediaTime,
    /// Chunk audible when the frame fired
    pub chunk: Option<u64>,
    pub signal: MouthSignal,
}

/// What a scenario observed
#[derive(Clone, Debug)]
pub struct ScenarioReport {
    pub outcome: Option<SessionOutcome>,
    pub elapsed: Duration,
    pub played: Vec<u64>,
    pub audible_time: Duration,
    pub frames: u64,
    pub max_open: f32,
    pub nonzero_open_writes: usize,
    pub final_mouth: (f32, f32),
    pub motions: usize,
    pub max_concurrent: usize,
    pub credits_sent: u64,
    /// Frames fired while each chunk was audible
    pub frames_by_chunk: BTreeMap<u64, usize>,
    /// Of those, frames with an open mouth
    pub open_frames_by_chunk: BTreeMap<u64, usize>,
}

pub struct Scenario {
    config: ScenarioConfig,
    now: MediaTime,
    coordinator: StreamCoordinator<SimulatedOutput>,
    producer: SimulatedProducer,
    probe: DeviceProbe,
    target: Arc<Mutex<RecordingTarget>>,
    next_frame: Option<MediaTime>,
    frame_interval: Duration,
    samples: Vec<FrameSample>,
}

impl Scenario {
    pub fn new(config: ScenarioConfig) -> VivaResult<Self> {
        Self::with_target(config, RecordingTarget::new())
    }

    pub fn with_target(config: ScenarioConfig, target: RecordingTarget) -> VivaResult<Self> {
        let (device, probe) = if config.suspended_device {
            SimulatedOutput::suspended()
        } else {
            SimulatedOutput::new()
        };
        let target = Arc::new(Mutex::new(target));
        let coordinator = StreamCoordinator::new(&config.runtime, device, target.clone())?;

        Ok(Self {
            frame_interval: config.runtime.stage.frame_interval(),
            producer: SimulatedProducer::new(config.producer.clone()),
            config,
            now: MediaTime::ZERO,
            coordinator,
            probe,
            target,
            next_frame: None,
            samples: Vec::new(),
        })
    }

    pub fn now(&self) -> MediaTime {
        self.now
    }

    pub fn coordinator(&self) -> &StreamCoordinator<SimulatedOutput> {
        &self.coordinator
    }

    pub fn coordinator_mut(&mut self) -> &mut StreamCoordinator<SimulatedOutput> {
        &mut self.coordinator
    }

    pub fn producer(&self) -> &SimulatedProducer {
        &self.producer
    }

    pub fn probe(&self) -> &DeviceProbe {
        &self.probe
    }

    pub fn target(&self) -> &Arc<Mutex<RecordingTarget>> {
        &self.target
    }

    /// Every frame fired so far
    pub fn samples(&self) -> &[FrameSample] {
        &self.samples
    }

    pub fn start(&mut self, text: &str) -> VivaResult<SessionHandle> {
        self.probe.set_now(self.now);
        let handle = self
            .coordinator
            .start_streaming(text, StreamOptions::default(), self.now)?;
        self.flush_requests();
        Ok(handle)
    }

    /// Cancel through the coordinator and pass the stop on
    pub fn stop(&mut self) -> bool {
        self.probe.set_now(self.now);
        let stopped = self.coordinator.stop();
        self.flush_requests();
        stopped
    }

    /// Advance one step
    pub fn step(&mut self) {
        self.now = self.now + self.config.step;
        let now = self.now;

        for event in self.probe.advance(now) {
            self.coordinator.handle_output_event(event, now);
        }
        self.flush_requests();

        for event in self.producer.poll(now) {
            self.coordinator.handle_producer_event(event, now);
            self.flush_requests();
        }

        if self.coordinator.take_frame_request() && self.next_frame.is_none() {
            self.next_frame = Some(now + self.frame_interval);
        }
        if let Some(at) = self.next_frame {
            if at <= now {
                self.next_frame = None;
                let chunk = self.coordinator.engine().cursor().current;
                if self.coordinator.on_frame(now) == FrameRequest::Reschedule {
                    self.next_frame = Some(now + self.frame_interval);
                }
                self.samples.push(FrameSample {
                    at: now,
                    chunk,
                    signal: self.coordinator.signal(),
                });
            }
        }
        self.flush_requests();
    }

    /// Step until `done` holds or `duration` passes; returns whether it held
    pub fn run_until(&mut self, duration: Duration, mut done: impl FnMut(&Self) -> bool) -> bool {
        let deadline = self.now + duration;
        while self.now < deadline {
            if done(self) {
                return true;
            }
            self.step();
        }
        done(self)
    }

    pub fn run_for(&mut self, duration: Duration) {
        self.run_until(duration, |_| false);
    }

    /// Step until the session ends, then report
    pub fn run_to_outcome(&mut self, mut handle: SessionHandle) -> ScenarioReport {
        let started = self.coordinator.session_started_at().unwrap_or(self.now);
        let limit = self.config.time_limit;
        let mut outcome = None;
        let ended = self.run_until(limit, |_| {
            if outcome.is_none() {
                outcome = handle.try_outcome();
            }
            outcome.is_some()
        });
        if !ended {
            tracing::warn!(?limit, state = %self.coordinator.state(), "scenario hit its time limit");
        }
        // Let an already scheduled frame fire
        self.run_for(self.frame_interval * 2);
        self.report(outcome, self.now.since(started))
    }

    pub fn report(&self, outcome: Option<SessionOutcome>, elapsed: Duration) -> ScenarioReport {
        let target = self.target.lock();
        let engine = self.coordinator.engine();
        let mut frames_by_chunk = BTreeMap::new();
        let mut open_frames_by_chunk = BTreeMap::new();
        for sample in &self.samples {
            let Some(chunk) = sample.chunk else { continue };
            *frames_by_chunk.entry(chunk).or_insert(0) += 1;
            if sample.signal.open() > 0.0 {
                *open_frames_by_chunk.entry(chunk).or_insert(0) += 1;
            }
        }
        ScenarioReport {
            outcome,
            elapsed,
            played: engine.played_sequence().to_vec(),
            audible_time: engine.stats().audible_time,
            frames: self.coordinator.stats().frames,
            max_open: target.max_written(MOUTH_OPEN),
            nonzero_open_writes: target.nonzero_writes(MOUTH_OPEN),
            final_mouth: (target.param(MOUTH_OPEN), target.param(MOUTH_FORM)),
            motions: target.motions.len(),
            max_concurrent: self.probe.max_concurrent(),
            credits_sent: self.coordinator.stats().credits_sent,
            frames_by_chunk,
            open_frames_by_chunk,
        }
    }

    pub fn state(&self) -> SessionState {
        self.coordinator.state()
    }

    fn flush_requests(&mut self) {
        while let Some(request) = self.coordinator.pop_outgoing() {
            self.producer.handle_request(request, self.now);
        }
    }
}
