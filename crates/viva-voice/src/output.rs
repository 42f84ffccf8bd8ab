//! Audio output device seam
//!
//! The platform audio subsystem runs on its own threads. The engine talks to
//! it through `AudioOutput` calls that return immediately; the device reports
//! back later with `OutputEvent`s, delivered by the host to
//! `PlaybackEngine::handle_output_event`.

use viva_core::{AudioChunk, SourceId, VivaResult};

/// Power state of the output device
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputState {
    /// Producing sound
    Running,
    /// Held back, e.g. by an autoplay policy, until resumed
    Suspended,
}

/// Asynchronous completion reported by the device
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OutputEvent {
    /// A requested resume completed
    Resumed,
    /// A requested resume was refused
    ResumeFailed { reason: String },
    /// A source played to its end
    Ended { source: SourceId },
    /// A source broke off while playing
    Failed { source: SourceId, reason: String },
}

/// An audio output device
pub trait AudioOutput: Send {
    /// Current power state
    fn state(&self) -> OutputState;

    /// Ask the device to resume; completion arrives as `Resumed` or `ResumeFailed`
    fn request_resume(&mut self) -> VivaResult<()>;

    /// Start playing `chunk` immediately as `source`; completion arrives as
    /// `Ended` or `Failed`
    fn start_source(&mut self, source: SourceId, chunk: &AudioChunk) -> VivaResult<()>;

    /// Halt `source` now. No `Ended` is required afterwards.
    fn stop_source(&mut self, source: SourceId);
}

impl<T: AudioOutput + ?Sized> AudioOutput for Box<T> {
    fn state(&self) -> OutputState {
        (**self).state()
    }

    fn request_resume(&mut self) -> VivaResult<()> {
        (**self).request_resume()
    }

    fn start_source(&mut self, source: SourceId, chunk: &AudioChunk) -> VivaResult<()> {
        (**self).start_source(source, chunk)
    }

    fn stop_source(&mut self, source: SourceId) {
        (**self).stop_source(source)
    }
}
