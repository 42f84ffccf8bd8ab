//! VIVA Voice - From ordered PCM chunks to audio and mouth movement
//!
//! Chunks arrive from the producer one at a time. This crate owns:
//! - ordering and count bookkeeping (`ChunkBuffer`)
//! - gapless sequential playback through an output device (`PlaybackEngine`)
//! - the mouth signal derived from what is playing (`SignalAnalyzer`)
//!
//! Nothing here blocks or sleeps. Device completions come back as
//! `OutputEvent`s and the current time is always passed in.

pub mod analyzer;
pub mod buffer;
pub mod output;
pub mod playback;

pub use analyzer::*;
pub use buffer::*;
pub use output::*;
pub use playback::*;
