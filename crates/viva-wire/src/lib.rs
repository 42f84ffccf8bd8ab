//! VIVA Wire - Producer protocol and audio container formats
//!
//! - `message`: requests to and events from the speech producer
//! - `pcm`: raw float PCM payloads carried by `stream_audio_data`
//! - `wav`: canonical 44-byte RIFF/WAVE container, mono 16-bit

pub mod message;
pub mod pcm;
pub mod wav;

pub use message::*;
pub use pcm::*;
pub use wav::*;
