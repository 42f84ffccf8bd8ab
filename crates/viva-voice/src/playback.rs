//! Playback Engine - gapless sequential playback of ordered chunks
//!
//! At most one source is audible at a time. The next queued chunk is
//! started only when the device reports the current one `Ended`, so chunks
//! never overlap, and it is started right then, so there is no silence
//! between them unless the queue is actually empty.
//!
//! The first chunk starts the moment it is enqueued. If the device is
//! suspended the engine asks it to resume and keeps queueing meanwhile.

use std::collections::VecDeque;
use std::time::Duration;

use viva_core::{AudioChunk, MediaTime, SourceId, VivaError};

use crate::{AudioOutput, OutputEvent, OutputState};

/// Engine state
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngineState {
    /// Nothing audible, nothing pending on the device
    Idle,
    /// Waiting for the device to resume
    Resuming,
    /// A source is audible
    Playing,
}

/// Something the engine wants its owner to know about
#[derive(Clone, Debug, PartialEq)]
pub enum PlaybackNotice {
    /// A chunk became audible
    Started { index: u64, source: SourceId },
    /// A chunk left the engine and its buffer slot is free
    SlotFreed { index: u64 },
    /// A chunk was skipped because the device failed
    Dropped { index: u64, error: VivaError },
    /// The engine ran out of audio
    Drained,
}

/// Which chunk is audible and what is waiting
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct PlaybackCursor {
    /// Sequence index of the audible chunk
    pub current: Option<u64>,
    /// Chunks queued behind it
    pub queued: usize,
    /// Anything audible or about to be
    pub active: bool,
}

#[derive(Clone, Debug, Default)]
pub struct PlaybackStats {
    pub chunks_enqueued: u64,
    pub chunks_started: u64,
    pub chunks_played: u64,
    pub chunks_dropped: u64,
    pub chunks_discarded: u64,
    pub resume_requests: u64,
    /// Total duration of fully played chunks
    pub audible_time: Duration,
}

#[derive(Debug)]
struct ActiveSource {
    source: SourceId,
    chunk: AudioChunk,
    started_at: MediaTime,
}

/// Gapless chunk scheduler over an output device
pub struct PlaybackEngine<D: AudioOutput = Box<dyn AudioOutput>> {
    device: D,
    queue: VecDeque<AudioChunk>,
    current: Option<ActiveSource>,
    resuming: bool,
    next_source: u64,
    played: Vec<u64>,
    stats: PlaybackStats,
}

impl<D: AudioOutput> PlaybackEngine<D> {
    pub fn new(device: D) -> Self {
        Self {
            device,
            queue: VecDeque::new(),
            current: None,
            resuming: false,
            next_source: 1,
            played: Vec::new(),
            stats: PlaybackStats::default(),
        }
    }

    /// Schedule a chunk; starts it right away if nothing is audible
    pub fn enqueue(&mut self, chunk: AudioChunk, now: MediaTime) -> Vec<PlaybackNotice> {
        let mut notices = Vec::new();
        self.stats.chunks_enqueued += 1;
        self.queue.push_back(chunk);
        self.pump(now, &mut notices);
        notices
    }

    /// Process a completion reported by the device
    pub fn handle_output_event(&mut self, event: OutputEvent, now: MediaTime) -> Vec<PlaybackNotice> {
        let mut notices = Vec::new();
        let was_active = self.is_active();

        match event {
            OutputEvent::Resumed => {
                if !self.resuming {
                    tracing::debug!("resume completed with nothing waiting");
                    return notices;
                }
                self.resuming = false;
            }
            OutputEvent::ResumeFailed { reason } => {
                if !self.resuming {
                    return notices;
                }
                self.resuming = false;
                tracing::warn!(%reason, "output device refused to resume");
                if let Some(chunk) = self.queue.pop_front() {
                    self.drop_chunk(&chunk, VivaError::PlaybackDevice(reason), &mut notices);
                }
            }
            OutputEvent::Ended { source } => {
                let Some(active) = self.take_current(source) else {
                    tracing::debug!(%source, "ignoring completion of a stale source");
                    return notices;
                };
                let index = active.chunk.sequence_index;
                self.played.push(index);
                self.stats.chunks_played += 1;
                self.stats.audible_time += active.chunk.duration();
                notices.push(PlaybackNotice::SlotFreed { index });
            }
            OutputEvent::Failed { source, reason } => {
                let Some(active) = self.take_current(source) else {
                    return notices;
                };
                tracing::warn!(%source, %reason, "output device failed mid-chunk");
                self.drop_chunk(&active.chunk, VivaError::PlaybackDevice(reason), &mut notices);
            }
        }

        self.pump(now, &mut notices);
        if was_active && !self.is_active() {
            notices.push(PlaybackNotice::Drained);
        }
        notices
    }

    /// Halt the audible source and discard everything queued
    ///
    /// Safe to call at any time; returns how many chunks were thrown away.
    pub fn stop(&mut self) -> usize {
        let mut discarded = self.queue.len();
        if let Some(active) = self.current.take() {
            self.device.stop_source(active.source);
            discarded += 1;
        }
        self.queue.clear();
        self.resuming = false;
        self.stats.chunks_discarded += discarded as u64;
        if discarded > 0 {
            tracing::debug!(discarded, "playback stopped");
        }
        discarded
    }

    pub fn state(&self) -> EngineState {
        if self.current.is_some() {
            EngineState::Playing
        } else if self.resuming {
            EngineState::Resuming
        } else {
            EngineState::Idle
        }
    }

    /// Anything audible, queued, or waiting on the device
    pub fn is_active(&self) -> bool {
        self.current.is_some() || self.resuming || !self.queue.is_empty()
    }

    pub fn is_audible(&self) -> bool {
        self.current.is_some()
    }

    pub fn queued_len(&self) -> usize {
        self.queue.len()
    }

    /// Chunks held by the engine, audible one included
    pub fn occupancy(&self) -> usize {
        self.queue.len() + usize::from(self.current.is_some())
    }

    pub fn cursor(&self) -> PlaybackCursor {
        PlaybackCursor {
            current: self.current.as_ref().map(|a| a.chunk.sequence_index),
            queued: self.queue.len(),
            active: self.is_active(),
        }
    }

    /// Up to `len` samples the listener has just heard
    ///
    /// This is the tap used for spectral analysis. `None` when nothing is
    /// audible at `now`.
    pub fn audible_window(&self, now: MediaTime, len: usize) -> Option<&[f32]> {
        let active = self.current.as_ref()?;
        let elapsed = now - active.started_at;
        if elapsed >= active.chunk.duration() {
            return None;
        }
        Some(active.chunk.window_ending_at(elapsed, len))
    }

    /// Sample rate of the audible chunk
    pub fn cursor_sample_rate(&self) -> Option<u32> {
        self.current.as_ref().map(|a| a.chunk.sample_rate)
    }

    /// Sequence indices of fully played chunks, in play order
    pub fn played_sequence(&self) -> &[u64] {
        &self.played
    }

    pub fn stats(&self) -> &PlaybackStats {
        &self.stats
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    /// Forget the play history of the previous session
    pub fn reset_history(&mut self) {
        self.played.clear();
    }

    fn take_current(&mut self, source: SourceId) -> Option<ActiveSource> {
        match &self.current {
            Some(active) if active.source == source => self.current.take(),
            _ => None,
        }
    }

    fn drop_chunk(&mut self, chunk: &AudioChunk, error: VivaError, notices: &mut Vec<PlaybackNotice>) {
        let index = chunk.sequence_index;
        self.stats.chunks_dropped += 1;
        notices.push(PlaybackNotice::Dropped { index, error });
        notices.push(PlaybackNotice::SlotFreed { index });
    }

    fn next_source_id(&mut self) -> SourceId {
        let id = SourceId::new(self.next_source);
        self.next_source += 1;
        id
    }

    /// Start the next queued chunk if nothing is audible
    fn pump(&mut self, now: MediaTime, notices: &mut Vec<PlaybackNotice>) {
        while self.current.is_none() && !self.resuming {
            let Some(chunk) = self.queue.pop_front() else {
                return;
            };

            if self.device.state() == OutputState::Suspended {
                self.stats.resume_requests += 1;
                match self.device.request_resume() {
                    Ok(()) => {
                        tracing::debug!("output device suspended, resume requested");
                        self.queue.push_front(chunk);
                        self.resuming = true;
                    }
                    Err(error) => {
                        tracing::warn!(%error, "output device resume request failed");
                        self.drop_chunk(&chunk, error, notices);
                    }
                }
                continue;
            }

            let source = self.next_source_id();
            match self.device.start_source(source, &chunk) {
                Ok(()) => {
                    self.stats.chunks_started += 1;
                    notices.push(PlaybackNotice::Started {
                        index: chunk.sequence_index,
                        source,
                    });
                    self.current = Some(ActiveSource {
                        source,
                        chunk,
                        started_at: now,
                    });
                }
                Err(error) => {
                    tracing::warn!(%error, index = chunk.sequence_index, "skipping chunk the device could not play");
                    self.drop_chunk(&chunk, error, notices);
                }
            }
        }
    }
}
