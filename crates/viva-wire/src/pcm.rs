//! Raw PCM payloads
//!
//! The producer ships each chunk as the little-endian bytes of a 32-bit float
//! sample array. Containers store 16-bit integers instead; the conversions
//! between the two live here as well.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use viva_core::{VivaError, VivaResult};

/// Bytes per f32 sample
pub const F32_SAMPLE_SIZE: usize = 4;

/// Decode little-endian f32 PCM bytes into samples
pub fn decode_f32_le(payload: &[u8]) -> VivaResult<Vec<f32>> {
    if payload.len() % F32_SAMPLE_SIZE != 0 {
        return Err(VivaError::InvalidAudio(format!(
            "PCM payload of {} bytes is not a whole number of f32 samples",
            payload.len()
        )));
    }

    let mut buf = payload;
    let mut samples = Vec::with_capacity(payload.len() / F32_SAMPLE_SIZE);
    while buf.has_remaining() {
        samples.push(buf.get_f32_le());
    }
    Ok(samples)
}

/// Encode samples as little-endian f32 PCM bytes
pub fn encode_f32_le(samples: &[f32]) -> Bytes {
    let mut buf = BytesMut::with_capacity(samples.len() * F32_SAMPLE_SIZE);
    for &sample in samples {
        buf.put_f32_le(sample);
    }
    buf.freeze()
}

/// Convert a float sample to 16-bit PCM, clamping to [-1, 1]
#[inline]
pub fn f32_to_i16(sample: f32) -> i16 {
    if sample.is_nan() {
        return 0;
    }
    let clamped = sample.clamp(-1.0, 1.0);
    if clamped < 0.0 {
        (clamped * 32768.0) as i16
    } else {
        (clamped * 32767.0) as i16
    }
}

/// Convert a 16-bit PCM sample to float
#[inline]
pub fn i16_to_f32(sample: i16) -> f32 {
    if sample < 0 {
        sample as f32 / 32768.0
    } else {
        sample as f32 / 32767.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_decode_payload() {
        let mut raw = Vec::new();
        raw.extend_from_slice(&0.5f32.to_le_bytes());
        raw.extend_from_slice(&(-0.25f32).to_le_bytes());

        let samples = decode_f32_le(&raw).unwrap();
        assert_eq!(samples, vec![0.5, -0.25]);
    }

    #[test]
    fn test_decode_rejects_partial_sample() {
        let err = decode_f32_le(&[0, 0, 128]).unwrap_err();
        assert!(matches!(err, VivaError::InvalidAudio(_)));
    }

    #[test]
    fn test_encode_matches_le_layout() {
        let bytes = encode_f32_le(&[1.0]);
        assert_eq!(&bytes[..], &1.0f32.to_le_bytes());
        assert!(decode_f32_le(&encode_f32_le(&[])).unwrap().is_empty());
    }

    #[test]
    fn test_i16_extremes() {
        assert_eq!(f32_to_i16(1.0), i16::MAX);
        assert_eq!(f32_to_i16(-1.0), i16::MIN);
        assert_eq!(f32_to_i16(7.0), i16::MAX);
        assert_eq!(f32_to_i16(f32::NAN), 0);
        assert_eq!(i16_to_f32(i16::MIN), -1.0);
        assert_eq!(i16_to_f32(i16::MAX), 1.0);
    }

    proptest! {
        #[test]
        fn prop_payload_round_trip(samples in prop::collection::vec(-1.0f32..=1.0, 0..512)) {
            let bytes = encode_f32_le(&samples);
            prop_assert_eq!(bytes.len(), samples.len() * F32_SAMPLE_SIZE);
            prop_assert_eq!(decode_f32_le(&bytes).unwrap(), samples);
        }

        #[test]
        fn prop_i16_round_trip_within_one_step(sample in -1.0f32..=1.0) {
            let back = i16_to_f32(f32_to_i16(sample));
            prop_assert!((back - sample).abs() <= 1.0 / 32767.0 + 1e-6);
        }
    }
}
