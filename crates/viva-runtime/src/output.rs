//! Headless clocked output device
//!
//! Plays nothing. Each source "ends" after its real duration on the tokio
//! timer, which makes the host loop behave exactly as with a sound card,
//! and lets tests run in paused time.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use viva_core::{AudioChunk, SourceId, VivaError, VivaResult};
use viva_voice::{AudioOutput, OutputEvent, OutputState};

/// Device clocked by the tokio timer
///
/// Must be used from within a tokio runtime.
pub struct ClockedOutput {
    events: mpsc::UnboundedSender<OutputEvent>,
    state: Arc<Mutex<OutputState>>,
    resume_delay: Duration,
    playing: HashMap<SourceId, JoinHandle<()>>,
}

impl ClockedOutput {
    /// A running device and the receiver for its completions
    pub fn new() -> (Self, mpsc::UnboundedReceiver<OutputEvent>) {
        Self::with_state(OutputState::Running, Duration::ZERO)
    }

    /// A device that starts suspended and resumes after `resume_delay`
    pub fn suspended(resume_delay: Duration) -> (Self, mpsc::UnboundedReceiver<OutputEvent>) {
        Self::with_state(OutputState::Suspended, resume_delay)
    }

    fn with_state(
        state: OutputState,
        resume_delay: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<OutputEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let output = Self {
            events,
            state: Arc::new(Mutex::new(state)),
            resume_delay,
            playing: HashMap::new(),
        };
        (output, rx)
    }

    /// Sources currently counting down
    pub fn playing(&self) -> usize {
        self.playing.values().filter(|h| !h.is_finished()).count()
    }
}

impl AudioOutput for ClockedOutput {
    fn state(&self) -> OutputState {
        *self.state.lock()
    }

    fn request_resume(&mut self) -> VivaResult<()> {
        if self.events.is_closed() {
            return Err(VivaError::ChannelClosed("output events"));
        }
        let state = Arc::clone(&self.state);
        let events = self.events.clone();
        let delay = self.resume_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            *state.lock() = OutputState::Running;
            let _ = events.send(OutputEvent::Resumed);
        });
        Ok(())
    }

    fn start_source(&mut self, source: SourceId, chunk: &AudioChunk) -> VivaResult<()> {
        if self.events.is_closed() {
            return Err(VivaError::PlaybackDevice("output event receiver dropped".into()));
        }
        self.playing.retain(|_, handle| !handle.is_finished());

        let events = self.events.clone();
        let duration = chunk.duration();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            let _ = events.send(OutputEvent::Ended { source });
        });
        self.playing.insert(source, handle);
        Ok(())
    }

    fn stop_source(&mut self, source: SourceId) {
        if let Some(handle) = self.playing.remove(&source) {
            handle.abort();
        }
    }
}

impl Drop for ClockedOutput {
    fn drop(&mut self) {
        for (_, handle) in self.playing.drain() {
            handle.abort();
        }
    }
}
