//! WAV container - canonical 44-byte RIFF/WAVE header
//!
//! Layout (all integers LE):
//! - Bytes 0-3: "RIFF"
//! - Bytes 4-7: RIFF chunk size (file length - 8)
//! - Bytes 8-11: "WAVE"
//! - Bytes 12-15: "fmt "
//! - Bytes 16-19: fmt chunk size (16)
//! - Bytes 20-21: format tag (1 = PCM)
//! - Bytes 22-23: channels
//! - Bytes 24-27: sample rate
//! - Bytes 28-31: byte rate
//! - Bytes 32-33: block align
//! - Bytes 34-35: bits per sample
//! - Bytes 36-39: "data"
//! - Bytes 40-43: data length

use viva_core::{AudioChunk, VivaError, VivaResult};

use crate::{f32_to_i16, i16_to_f32};

/// Header size in bytes
pub const WAV_HEADER_SIZE: usize = 44;

const FORMAT_PCM: u16 = 1;
const FMT_CHUNK_SIZE: u32 = 16;

/// Format of a WAV container
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WavSpec {
    pub channels: u16,
    pub sample_rate: u32,
    pub bits_per_sample: u16,
}

impl WavSpec {
    /// Mono 16-bit PCM at `sample_rate`
    pub fn mono16(sample_rate: u32) -> Self {
        Self {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
        }
    }

    #[inline]
    pub fn block_align(&self) -> u16 {
        self.channels * (self.bits_per_sample / 8)
    }

    #[inline]
    pub fn byte_rate(&self) -> u32 {
        self.sample_rate * self.block_align() as u32
    }
}

/// Encode float samples as a mono 16-bit WAV file
pub fn encode_wav(samples: &[f32], sample_rate: u32) -> Vec<u8> {
    encode_wav_iter(samples.iter().copied(), samples.len(), sample_rate)
}

/// Encode a run of chunks as one mono 16-bit WAV file
///
/// Chunks are written in slice order; the sample rate of the first chunk is
/// used for the header.
pub fn encode_chunks(chunks: &[AudioChunk], default_rate: u32) -> Vec<u8> {
    let sample_rate = chunks.first().map(|c| c.sample_rate).unwrap_or(default_rate);
    let total: usize = chunks.iter().map(|c| c.len()).sum();
    let samples = chunks.iter().flat_map(|c| c.samples().iter().copied());
    encode_wav_iter(samples, total, sample_rate)
}

fn encode_wav_iter(samples: impl Iterator<Item = f32>, count: usize, sample_rate: u32) -> Vec<u8> {
    let spec = WavSpec::mono16(sample_rate);
    let data_len = (count * spec.block_align() as usize) as u32;

    let mut buf = Vec::with_capacity(WAV_HEADER_SIZE + data_len as usize);
    buf.extend_from_slice(b"RIFF");
    buf.extend_from_slice(&(36 + data_len).to_le_bytes());
    buf.extend_from_slice(b"WAVE");

    buf.extend_from_slice(b"fmt ");
    buf.extend_from_slice(&FMT_CHUNK_SIZE.to_le_bytes());
    buf.extend_from_slice(&FORMAT_PCM.to_le_bytes());
    buf.extend_from_slice(&spec.channels.to_le_bytes());
    buf.extend_from_slice(&spec.sample_rate.to_le_bytes());
    buf.extend_from_slice(&spec.byte_rate().to_le_bytes());
    buf.extend_from_slice(&spec.block_align().to_le_bytes());
    buf.extend_from_slice(&spec.bits_per_sample.to_le_bytes());

    buf.extend_from_slice(b"data");
    buf.extend_from_slice(&data_len.to_le_bytes());
    for sample in samples {
        buf.extend_from_slice(&f32_to_i16(sample).to_le_bytes());
    }

    buf
}

/// Decode a canonical mono or multi-channel 16-bit PCM WAV file
///
/// Returns the format and the interleaved samples as floats.
pub fn decode_wav(buf: &[u8]) -> VivaResult<(WavSpec, Vec<f32>)> {
    if buf.len() < WAV_HEADER_SIZE {
        return Err(VivaError::InvalidAudio(format!(
            "WAV too short: expected at least {}, got {}",
            WAV_HEADER_SIZE,
            buf.len()
        )));
    }
    if &buf[0..4] != b"RIFF" || &buf[8..12] != b"WAVE" {
        return Err(VivaError::InvalidAudio("missing RIFF/WAVE tags".into()));
    }
    if &buf[12..16] != b"fmt " || read_u32(buf, 16) != FMT_CHUNK_SIZE {
        return Err(VivaError::InvalidAudio("non-canonical fmt chunk".into()));
    }
    if read_u16(buf, 20) != FORMAT_PCM {
        return Err(VivaError::InvalidAudio("only integer PCM is supported".into()));
    }

    let spec = WavSpec {
        channels: read_u16(buf, 22),
        sample_rate: read_u32(buf, 24),
        bits_per_sample: read_u16(buf, 34),
    };
    if spec.bits_per_sample != 16 || spec.channels == 0 {
        return Err(VivaError::InvalidAudio(format!(
            "unsupported format: {} channels, {} bits",
            spec.channels, spec.bits_per_sample
        )));
    }
    if &buf[36..40] != b"data" {
        return Err(VivaError::InvalidAudio("missing data chunk".into()));
    }

    let data_len = read_u32(buf, 40) as usize;
    let data_end = WAV_HEADER_SIZE + data_len;
    if data_end > buf.len() {
        return Err(VivaError::InvalidAudio(format!(
            "data chunk truncated: expected {}, got {}",
            data_len,
            buf.len() - WAV_HEADER_SIZE
        )));
    }

    let samples = buf[WAV_HEADER_SIZE..data_end]
        .chunks_exact(2)
        .map(|pair| i16_to_f32(i16::from_le_bytes([pair[0], pair[1]])))
        .collect();

    Ok((spec, samples))
}

#[inline]
fn read_u16(buf: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([buf[offset], buf[offset + 1]])
}

#[inline]
fn read_u32(buf: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        buf[offset],
        buf[offset + 1],
        buf[offset + 2],
        buf[offset + 3],
    ])
}
