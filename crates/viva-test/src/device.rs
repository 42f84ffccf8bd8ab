//! Simulated audio device on a virtual clock
//!
//! The engine owns the `SimulatedOutput`; the scenario keeps a
//! `DeviceProbe` to move the clock, collect completions and inject faults.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;

use viva_core::{AudioChunk, MediaTime, SourceId, VivaError, VivaResult};
use viva_voice::{AudioOutput, OutputEvent, OutputState};

#[derive(Clone, Debug)]
struct Playing {
    source: SourceId,
    index: u64,
    ends_at: MediaTime,
}

/// One `start_source` call as seen by the device
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StartRecord {
    pub source: SourceId,
    pub index: u64,
    pub at: MediaTime,
}

#[derive(Debug)]
struct DeviceState {
    now: MediaTime,
    state: OutputState,
    resume_pending: bool,
    refuse_resume: bool,
    resume_requests: u64,
    playing: Vec<Playing>,
    started: Vec<StartRecord>,
    stopped: Vec<SourceId>,
    fail_start: HashSet<u64>,
    fail_during: HashSet<u64>,
    max_concurrent: usize,
}

impl DeviceState {
    fn new(state: OutputState) -> Self {
        Self {
            now: MediaTime::ZERO,
            state,
            resume_pending: false,
            refuse_resume: false,
            resume_requests: 0,
            playing: Vec::new(),
            started: Vec::new(),
            stopped: Vec::new(),
            fail_start: HashSet::new(),
            fail_during: HashSet::new(),
            max_concurrent: 0,
        }
    }
}

/// Device half handed to the playback engine
pub struct SimulatedOutput {
    shared: Arc<Mutex<DeviceState>>,
}

/// Scenario half of the simulated device
#[derive(Clone)]
pub struct DeviceProbe {
    shared: Arc<Mutex<DeviceState>>,
}

impl SimulatedOutput {
    pub fn new() -> (Self, DeviceProbe) {
        Self::with_state(OutputState::Running)
    }

    /// Device that needs a resume before it makes sound
    pub fn suspended() -> (Self, DeviceProbe) {
        Self::with_state(OutputState::Suspended)
    }

    fn with_state(state: OutputState) -> (Self, DeviceProbe) {
        let shared = Arc::new(Mutex::new(DeviceState::new(state)));
        (
            SimulatedOutput {
                shared: Arc::clone(&shared),
            },
            DeviceProbe { shared },
        )
    }
}

impl AudioOutput for SimulatedOutput {
    fn state(&self) -> OutputState {
        self.shared.lock().state
    }

    fn request_resume(&mut self) -> VivaResult<()> {
        let mut device = self.shared.lock();
        device.resume_requests += 1;
        device.resume_pending = true;
        Ok(())
    }

    fn start_source(&mut self, source: SourceId, chunk: &AudioChunk) -> VivaResult<()> {
        let mut device = self.shared.lock();
        if device.fail_start.contains(&chunk.sequence_index) {
            return Err(VivaError::PlaybackDevice(format!(
                "cannot start chunk {}",
                chunk.sequence_index
            )));
        }

        let now = device.now;
        device.playing.push(Playing {
            source,
            index: chunk.sequence_index,
            ends_at: now + chunk.duration(),
        });
        device.started.push(StartRecord {
            source,
            index: chunk.sequence_index,
            at: now,
        });
        device.max_concurrent = device.max_concurrent.max(device.playing.len());
        Ok(())
    }

    fn stop_source(&mut self, source: SourceId) {
        let mut device = self.shared.lock();
        device.playing.retain(|p| p.source != source);
        device.stopped.push(source);
    }
}

impl DeviceProbe {
    /// Move the clock to `now` and collect every completion due
    pub fn advance(&self, now: MediaTime) -> Vec<OutputEvent> {
        let mut device = self.shared.lock();
        device.now = now;
        let mut events = Vec::new();

        if device.resume_pending {
            device.resume_pending = false;
            if device.refuse_resume {
                events.push(OutputEvent::ResumeFailed {
                    reason: "resume not allowed".to_string(),
                });
            } else {
                device.state = OutputState::Running;
                events.push(OutputEvent::Resumed);
            }
        }

        device.playing.sort_by_key(|p| p.ends_at);
        let due = device.playing.iter().take_while(|p| p.ends_at <= now).count();
        let finished: Vec<Playing> = device.playing.drain(..due).collect();
        for playing in finished {
            if device.fail_during.contains(&playing.index) {
                events.push(OutputEvent::Failed {
                    source: playing.source,
                    reason: format!("underflow in chunk {}", playing.index),
                });
            } else {
                events.push(OutputEvent::Ended {
                    source: playing.source,
                });
            }
        }
        events
    }

    /// Set the clock without collecting completions
    pub fn set_now(&self, now: MediaTime) {
        self.shared.lock().now = now;
    }

    pub fn fail_start_of(&self, index: u64) {
        self.shared.lock().fail_start.insert(index);
    }

    pub fn fail_during(&self, index: u64) {
        self.shared.lock().fail_during.insert(index);
    }

    pub fn refuse_resume(&self, refuse: bool) {
        self.shared.lock().refuse_resume = refuse;
    }

    pub fn state(&self) -> OutputState {
        self.shared.lock().state
    }

    pub fn started(&self) -> Vec<StartRecord> {
        self.shared.lock().started.clone()
    }

    pub fn stopped(&self) -> Vec<SourceId> {
        self.shared.lock().stopped.clone()
    }

    /// Sources audible right now
    pub fn playing(&self) -> usize {
        self.shared.lock().playing.len()
    }

    /// Most sources ever audible at once
    pub fn max_concurrent(&self) -> usize {
        self.shared.lock().max_concurrent
    }

    pub fn resume_requests(&self) -> u64 {
        self.shared.lock().resume_requests
    }
}
