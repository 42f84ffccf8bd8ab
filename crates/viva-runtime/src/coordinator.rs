//! Stream Coordinator - one speech session from request to last sample
//!
//! ```text
//! Idle -> Awaiting -> Streaming -> Draining -> Finished
//!            |            |           |
//!            +------------+-----------+-> Cancelled | Errored
//! ```
//!
//! Chunks are acknowledged to the producer as soon as they are accepted,
//! not when they finish playing, so generation can run ahead of playback.
//! When the engine already holds `max_buffered_chunks` the credit is held
//! back until a slot frees.
//!
//! Once a session reaches a terminal state its outcome is delivered through
//! the `SessionHandle` and the coordinator is Idle again.

use std::collections::VecDeque;

use tokio::sync::oneshot;

use viva_core::{AudioChunk, MediaTime, MouthSignal, SessionId, SessionState, VivaError, VivaResult};
use viva_visual::{FrameGate, FrameRequest, LipSyncDriver, SharedTarget};
use viva_voice::{
    AccumulatedAudio, AnalysisMode, AudioOutput, ChunkBuffer, OutputEvent, PlaybackEngine,
    PlaybackNotice, SignalAnalyzer,
};
use viva_wire::{encode_chunks, ProducerEvent, ProducerRequest};

use crate::{CoordinatorConfig, PlaybackConfig, RuntimeConfig};

/// Per-session options
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StreamOptions {
    /// Producer voice; the configured default when `None`
    pub voice: Option<String>,
}

impl StreamOptions {
    pub fn voice(voice: impl Into<String>) -> Self {
        Self {
            voice: Some(voice.into()),
        }
    }
}

/// How a session ended
#[derive(Clone, Debug, PartialEq)]
pub enum SessionOutcome {
    Finished {
        /// WAV of the whole session, when recording export is enabled
        recording: Option<Vec<u8>>,
        transcript: String,
    },
    Cancelled,
    Errored(VivaError),
}

impl SessionOutcome {
    pub fn state(&self) -> SessionState {
        match self {
            SessionOutcome::Finished { .. } => SessionState::Finished,
            SessionOutcome::Cancelled => SessionState::Cancelled,
            SessionOutcome::Errored(_) => SessionState::Errored,
        }
    }
}

/// Caller's side of a started session
#[derive(Debug)]
pub struct SessionHandle {
    id: SessionId,
    outcome: oneshot::Receiver<SessionOutcome>,
}

impl SessionHandle {
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Wait for the session to end
    pub async fn outcome(self) -> VivaResult<SessionOutcome> {
        self.outcome
            .await
            .map_err(|_| VivaError::ChannelClosed("session outcome"))
    }

    /// The outcome, if the session has already ended
    pub fn try_outcome(&mut self) -> Option<SessionOutcome> {
        self.outcome.try_recv().ok()
    }
}

#[derive(Clone, Debug, Default)]
pub struct CoordinatorStats {
    pub sessions_started: u64,
    pub sessions_finished: u64,
    pub sessions_cancelled: u64,
    pub sessions_errored: u64,
    pub starts_rejected: u64,
    pub chunks_accepted: u64,
    pub chunks_invalid: u64,
    pub credits_sent: u64,
    pub credits_withheld: u64,
    pub events_dropped: u64,
    pub underruns: u64,
    pub frames: u64,
}

struct ActiveSession {
    id: SessionId,
    outcome: Option<oneshot::Sender<SessionOutcome>>,
    transcript: String,
    recording: Vec<AudioChunk>,
    started_at: MediaTime,
    motion_played: bool,
}

/// Session state machine over the voice and visual pipelines
pub struct StreamCoordinator<D: AudioOutput = Box<dyn AudioOutput>> {
    config: CoordinatorConfig,
    playback: PlaybackConfig,
    buffer: ChunkBuffer,
    engine: PlaybackEngine<D>,
    analyzer: SignalAnalyzer,
    driver: LipSyncDriver,
    gate: FrameGate,
    frame_requested: bool,
    state: SessionState,
    session: Option<ActiveSession>,
    next_session: SessionId,
    last_outcome: Option<SessionState>,
    outgoing: VecDeque<ProducerRequest>,
    withheld_credits: u64,
    signal: MouthSignal,
    stats: CoordinatorStats,
}

impl<D: AudioOutput> StreamCoordinator<D> {
    pub fn new(config: &RuntimeConfig, device: D, target: SharedTarget) -> VivaResult<Self> {
        config.validate()?;
        let analyzer = SignalAnalyzer::new(config.analyzer.clone())?;

        // The model animates its own mouth from accumulated audio
        let mut lipsync = config.lipsync.clone();
        if analyzer.mode() == AnalysisMode::ChunkAccumulation {
            lipsync.write_mouth = false;
        }

        Ok(Self {
            config: config.coordinator.clone(),
            playback: config.playback.clone(),
            buffer: ChunkBuffer::new(),
            engine: PlaybackEngine::new(device),
            analyzer,
            driver: LipSyncDriver::new(lipsync, target),
            gate: FrameGate::new(),
            frame_requested: false,
            state: SessionState::Idle,
            session: None,
            next_session: SessionId::new(1),
            last_outcome: None,
            outgoing: VecDeque::new(),
            withheld_credits: 0,
            signal: MouthSignal::NEUTRAL,
            stats: CoordinatorStats::default(),
        })
    }

    /// Ask the producer for speech and open a session
    ///
    /// Rejected while another session is active; that session is not touched.
    pub fn start_streaming(
        &mut self,
        text: impl Into<String>,
        options: StreamOptions,
        now: MediaTime,
    ) -> VivaResult<SessionHandle> {
        if self.state.is_active() {
            self.stats.starts_rejected += 1;
            return Err(VivaError::SessionActive(self.state));
        }

        let id = self.next_session;
        self.next_session = id.next();

        self.buffer.clear();
        self.analyzer.reset();
        self.engine.reset_history();
        self.withheld_credits = 0;
        self.signal = MouthSignal::NEUTRAL;

        let (tx, rx) = oneshot::channel();
        self.session = Some(ActiveSession {
            id,
            outcome: Some(tx),
            transcript: String::new(),
            recording: Vec::new(),
            started_at: now,
            motion_played: false,
        });
        self.state = SessionState::Awaiting;

        let voice = options
            .voice
            .unwrap_or_else(|| self.config.default_voice.clone());
        let text = text.into();
        tracing::info!(session = %id, %voice, chars = text.len(), "session started");
        self.outgoing.push_back(ProducerRequest::generate(text, voice));
        self.stats.sessions_started += 1;

        Ok(SessionHandle { id, outcome: rx })
    }

    /// Process one message from the producer
    pub fn handle_producer_event(&mut self, event: ProducerEvent, now: MediaTime) {
        if !self.state.is_active() {
            self.stats.events_dropped += 1;
            tracing::debug!(event = event.name(), "no active session, event dropped");
            return;
        }

        match event {
            ProducerEvent::ChunkCount { count } => {
                if let Err(error) = self.buffer.set_expected_total(count) {
                    tracing::warn!(%error, "conflicting chunk count ignored");
                }
            }
            ProducerEvent::StreamAudioData { .. } => self.on_audio(&event, now),
            ProducerEvent::Complete => self.on_complete(now),
            ProducerEvent::Error { message } => {
                self.fail(VivaError::ProducerError(message), false);
            }
        }
    }

    /// Process a completion from the audio device
    pub fn handle_output_event(&mut self, event: OutputEvent, now: MediaTime) {
        let notices = self.engine.handle_output_event(event, now);
        self.apply_notices(notices);
        if self.state.is_active() {
            self.check_progress();
        }
    }

    /// Run one display frame
    ///
    /// `Reschedule` asks for exactly one more frame. Frames that fire after
    /// the driver left Active are refused with `Stop`.
    pub fn on_frame(&mut self, now: MediaTime) -> FrameRequest {
        if !self.gate.fire() {
            return FrameRequest::Stop;
        }
        self.stats.frames += 1;

        if let Some(audio) = self.analyzer.poll_accumulated(now) {
            self.hand_off(audio);
        }

        self.signal = match self.state {
            SessionState::Streaming | SessionState::Draining => {
                self.analyzer.analyze_engine(&self.engine, now)
            }
            _ => MouthSignal::NEUTRAL,
        };

        match self.driver.tick(self.signal) {
            FrameRequest::Reschedule if self.gate.request() => FrameRequest::Reschedule,
            _ => {
                self.gate.close();
                FrameRequest::Stop
            }
        }
    }

    /// Cancel the active session
    ///
    /// Audio stops before this returns. Returns false when there was nothing
    /// to cancel.
    pub fn stop(&mut self) -> bool {
        if !self.state.is_active() {
            return false;
        }

        let discarded = self.engine.stop();
        self.halt_visuals();
        self.driver.stop_motions();
        self.withheld_credits = 0;
        self.outgoing.push_back(ProducerRequest::Stop);
        tracing::debug!(discarded, "playback halted for cancel");

        if let Some(session) = self.session.take() {
            self.conclude(session, SessionOutcome::Cancelled);
        }
        true
    }

    /// Next request for the producer
    pub fn pop_outgoing(&mut self) -> Option<ProducerRequest> {
        self.outgoing.pop_front()
    }

    /// Whether the host must schedule a first frame
    ///
    /// Set when the driver becomes Active; cleared by this call.
    pub fn take_frame_request(&mut self) -> bool {
        std::mem::take(&mut self.frame_requested)
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Terminal state of the most recent session
    pub fn last_outcome(&self) -> Option<SessionState> {
        self.last_outcome
    }

    pub fn session_id(&self) -> Option<SessionId> {
        self.session.as_ref().map(|s| s.id)
    }

    /// Media time when the active session started
    pub fn session_started_at(&self) -> Option<MediaTime> {
        self.session.as_ref().map(|s| s.started_at)
    }

    pub fn transcript(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.transcript.as_str())
    }

    /// Mouth signal computed in the last frame
    pub fn signal(&self) -> MouthSignal {
        self.signal
    }

    pub fn withheld_credits(&self) -> u64 {
        self.withheld_credits
    }

    pub fn stats(&self) -> &CoordinatorStats {
        &self.stats
    }

    pub fn buffer(&self) -> &ChunkBuffer {
        &self.buffer
    }

    pub fn engine(&self) -> &PlaybackEngine<D> {
        &self.engine
    }

    pub fn driver(&self) -> &LipSyncDriver {
        &self.driver
    }

    pub fn analyzer(&self) -> &SignalAnalyzer {
        &self.analyzer
    }

    fn on_audio(&mut self, event: &ProducerEvent, now: MediaTime) {
        if !self.state.accepts_chunks() {
            self.stats.events_dropped += 1;
            tracing::warn!(state = %self.state, "audio after complete dropped");
            return;
        }

        let chunk = match event.to_chunk(self.buffer.next_index(), self.playback.sample_rate) {
            Ok(Some(chunk)) => chunk,
            Ok(None) => return,
            Err(error) => {
                tracing::warn!(%error, "undecodable audio dropped");
                self.stats.chunks_invalid += 1;
                self.grant_credit();
                return;
            }
        };

        if let Err(error) = self.buffer.push(chunk) {
            self.fail(error, true);
            return;
        }
        self.stats.chunks_accepted += 1;

        if let (Some(session), ProducerEvent::StreamAudioData { text, .. }) = (self.session.as_mut(), event) {
            if self.config.keep_transcript && !text.is_empty() {
                if !session.transcript.is_empty() {
                    session.transcript.push(' ');
                }
                session.transcript.push_str(text.trim());
            }
        }

        if self.state == SessionState::Awaiting {
            self.state = SessionState::Streaming;
            tracing::debug!("first chunk accepted, streaming");
        }

        for chunk in self.buffer.drain() {
            if self.config.export_recording {
                if let Some(session) = self.session.as_mut() {
                    session.recording.push(chunk.clone());
                }
            }
            tracing::trace!(index = chunk.sequence_index, rms = chunk.rms(), "chunk to playback");
            self.analyzer.feed(&chunk);
            let notices = self.engine.enqueue(chunk, now);
            self.apply_notices(notices);
        }

        self.activate_driver();

        if self.is_throttled() {
            self.withheld_credits += 1;
            self.stats.credits_withheld += 1;
            tracing::debug!(occupancy = self.engine.occupancy(), "credit withheld");
        } else {
            self.grant_credit();
        }

        // A device that refused every chunk leaves nothing audible
        self.check_progress();
    }

    fn on_complete(&mut self, now: MediaTime) {
        if self.state == SessionState::Draining {
            tracing::debug!("repeated complete ignored");
            return;
        }

        if let Some(audio) = self.analyzer.flush_accumulated(now) {
            self.hand_off(audio);
        }

        if self.engine.is_active() {
            self.state = SessionState::Draining;
            tracing::debug!(queued = self.engine.queued_len(), "producer complete, draining");
        } else {
            self.finish();
        }
    }

    fn check_progress(&mut self) {
        if self.engine.is_active() {
            return;
        }
        match self.state {
            SessionState::Draining => self.finish(),
            SessionState::Streaming if self.driver.is_active() => {
                self.stats.underruns += 1;
                self.halt_visuals();
                tracing::debug!("playback underrun, waiting for audio");
            }
            _ => {}
        }
    }

    fn apply_notices(&mut self, notices: Vec<PlaybackNotice>) {
        for notice in notices {
            match notice {
                PlaybackNotice::SlotFreed { .. } => {
                    if self.withheld_credits > 0 && !self.is_throttled() {
                        self.withheld_credits -= 1;
                        self.grant_credit();
                    }
                }
                PlaybackNotice::Dropped { index, error } => {
                    tracing::debug!(index, %error, "chunk dropped by playback");
                }
                PlaybackNotice::Started { index, source } => {
                    tracing::trace!(index, %source, "chunk audible");
                }
                PlaybackNotice::Drained => {}
            }
        }
    }

    fn activate_driver(&mut self) {
        if self.driver.is_active() {
            return;
        }
        let Some(session) = self.session.as_mut() else {
            return;
        };
        let with_motion = !session.motion_played;
        session.motion_played = true;
        if let Some(choice) = self.driver.start(with_motion) {
            tracing::debug!(group = %choice.group, motion = %choice.name, "talking motion");
        }
        if self.gate.open() {
            self.frame_requested = true;
        }
    }

    fn halt_visuals(&mut self) {
        self.driver.stop();
        self.gate.close();
        self.signal = MouthSignal::NEUTRAL;
    }

    fn hand_off(&mut self, audio: AccumulatedAudio) {
        match self.driver.feed_target_audio(&audio.wav, audio.volume) {
            Ok(()) => tracing::trace!(chunks = audio.chunk_count, "accumulated audio handed to model"),
            Err(error) if error.is_routine() => tracing::debug!(%error, "model cannot speak"),
            Err(error) => tracing::warn!(%error, "accumulated audio hand-off failed"),
        }
    }

    fn is_throttled(&self) -> bool {
        let max = self.playback.max_buffered_chunks;
        max > 0 && self.engine.occupancy() >= max
    }

    fn grant_credit(&mut self) {
        self.stats.credits_sent += 1;
        self.outgoing.push_back(ProducerRequest::BufferProcessed);
    }

    fn finish(&mut self) {
        self.halt_visuals();
        let Some(mut session) = self.session.take() else {
            return;
        };
        let recording = self
            .config
            .export_recording
            .then(|| encode_chunks(&session.recording, self.playback.sample_rate));
        let transcript = std::mem::take(&mut session.transcript);
        self.conclude(session, SessionOutcome::Finished { recording, transcript });
    }

    fn fail(&mut self, error: VivaError, stop_producer: bool) {
        self.engine.stop();
        self.halt_visuals();
        self.withheld_credits = 0;
        if stop_producer {
            self.outgoing.push_back(ProducerRequest::Stop);
        }
        tracing::warn!(%error, "session failed");
        if let Some(session) = self.session.take() {
            self.conclude(session, SessionOutcome::Errored(error));
        }
    }

    fn conclude(&mut self, mut session: ActiveSession, outcome: SessionOutcome) {
        let terminal = outcome.state();
        match terminal {
            SessionState::Finished => self.stats.sessions_finished += 1,
            SessionState::Cancelled => self.stats.sessions_cancelled += 1,
            _ => self.stats.sessions_errored += 1,
        }
        tracing::info!(
            session = %session.id,
            outcome = %terminal,
            chunks = self.buffer.received_count(),
            "session ended"
        );

        if let Some(tx) = session.outcome.take() {
            // The caller may have dropped its handle
            let _ = tx.send(outcome);
        }
        self.last_outcome = Some(terminal);
        self.state = SessionState::Idle;
    }
}
