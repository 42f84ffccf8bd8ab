//! Producer message protocol
//!
//! The speech producer lives behind an asynchronous message boundary. Every
//! interaction is one of the messages below; nothing is shared across it.
//!
//! | Direction  | Message           | Payload                          |
//! |------------|-------------------|----------------------------------|
//! | → producer | generate          | text, voice                      |
//! | → producer | stop              |                                  |
//! | → producer | buffer_processed  | one backpressure credit          |
//! | producer → | chunk_count       | advisory total                   |
//! | producer → | stream_audio_data | f32 LE PCM, source text, [index] |
//! | producer → | complete          |                                  |
//! | producer → | error             | message                          |
//!
//! The JSON form tags each message with `type` and carries audio as base64.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use viva_core::{AudioChunk, VivaError, VivaResult};

use crate::{decode_f32_le, encode_f32_le};

/// Message sent to the producer
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProducerRequest {
    /// Start generating speech for `text`
    Generate { text: String, voice: String },
    /// Cancel the current generation
    Stop,
    /// One backpressure credit returned
    BufferProcessed,
}

/// Message received from the producer
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProducerEvent {
    /// Advisory total number of chunks for the session
    ChunkCount { count: u64 },
    /// One ordered chunk of audio
    StreamAudioData {
        #[serde(with = "base64_audio")]
        audio: Bytes,
        /// Source substring the chunk was generated from
        #[serde(default)]
        text: String,
        /// Sequence position, when the producer tags its chunks
        #[serde(default, skip_serializing_if = "Option::is_none")]
        index: Option<u64>,
    },
    /// No more chunks will arrive
    Complete,
    /// Generation failed
    Error { message: String },
}

impl ProducerRequest {
    pub fn generate(text: impl Into<String>, voice: impl Into<String>) -> Self {
        ProducerRequest::Generate {
            text: text.into(),
            voice: voice.into(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ProducerRequest::Generate { .. } => "generate",
            ProducerRequest::Stop => "stop",
            ProducerRequest::BufferProcessed => "buffer_processed",
        }
    }

    pub fn to_json(&self) -> VivaResult<String> {
        serde_json::to_string(self).map_err(|e| VivaError::InvalidMessage(e.to_string()))
    }

    pub fn from_json(text: &str) -> VivaResult<Self> {
        serde_json::from_str(text).map_err(|e| VivaError::InvalidMessage(e.to_string()))
    }
}

impl ProducerEvent {
    /// Audio message carrying `samples` as f32 LE PCM
    pub fn audio(samples: &[f32], text: impl Into<String>) -> Self {
        ProducerEvent::StreamAudioData {
            audio: encode_f32_le(samples),
            text: text.into(),
            index: None,
        }
    }

    /// Audio message tagged with its sequence position
    pub fn indexed_audio(index: u64, samples: &[f32], text: impl Into<String>) -> Self {
        ProducerEvent::StreamAudioData {
            audio: encode_f32_le(samples),
            text: text.into(),
            index: Some(index),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        ProducerEvent::Error {
            message: message.into(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ProducerEvent::ChunkCount { .. } => "chunk_count",
            ProducerEvent::StreamAudioData { .. } => "stream_audio_data",
            ProducerEvent::Complete => "complete",
            ProducerEvent::Error { .. } => "error",
        }
    }

    /// Build the chunk carried by a `stream_audio_data` message
    ///
    /// `fallback_index` is used when the producer did not tag the chunk.
    pub fn to_chunk(&self, fallback_index: u64, sample_rate: u32) -> VivaResult<Option<AudioChunk>> {
        match self {
            ProducerEvent::StreamAudioData { audio, index, .. } => {
                let samples = decode_f32_le(audio)?;
                let sequence_index = index.unwrap_or(fallback_index);
                Ok(Some(AudioChunk::new(sequence_index, samples, sample_rate)))
            }
            _ => Ok(None),
        }
    }

    pub fn to_json(&self) -> VivaResult<String> {
        serde_json::to_string(self).map_err(|e| VivaError::InvalidMessage(e.to_string()))
    }

    pub fn from_json(text: &str) -> VivaResult<Self> {
        serde_json::from_str(text).map_err(|e| VivaError::InvalidMessage(e.to_string()))
    }
}

mod base64_audio {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(audio: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(audio))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map(Bytes::from)
            .map_err(serde::de::Error::custom)
    }
}
