//! Chunk Buffer - ordering and count bookkeeping for incoming chunks
//!
//! Unlike a jitter buffer, reordering is never attempted: the producer
//! delivers in order, so any gap or repeat means the stream is broken and is
//! reported instead of played.

use std::collections::VecDeque;

use viva_core::{AudioChunk, VivaError, VivaResult};

/// Ordered, gap-checked chunk queue
#[derive(Debug, Default)]
pub struct ChunkBuffer {
    /// Accepted chunks not yet drained
    ready: VecDeque<AudioChunk>,

    /// Index of the last accepted chunk
    last_pushed: Option<u64>,

    /// Chunks accepted so far
    received: u64,

    /// Advisory total announced by the producer
    expected_total: Option<u64>,
}

impl ChunkBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index the next chunk must carry
    pub fn next_index(&self) -> u64 {
        self.last_pushed.map_or(0, |last| last + 1)
    }

    /// Append a chunk if it directly follows the last accepted one
    pub fn push(&mut self, chunk: AudioChunk) -> VivaResult<()> {
        let expected = self.next_index();
        if chunk.sequence_index != expected {
            return Err(VivaError::OutOfOrderChunk {
                expected,
                actual: chunk.sequence_index,
            });
        }

        if let Some(total) = self.expected_total {
            if chunk.sequence_index >= total {
                tracing::warn!(
                    index = chunk.sequence_index,
                    total,
                    "chunk beyond the advertised total"
                );
            }
        }

        self.last_pushed = Some(chunk.sequence_index);
        self.received += 1;
        self.ready.push_back(chunk);
        Ok(())
    }

    /// Remove and return every ready chunk, in order
    pub fn drain(&mut self) -> Vec<AudioChunk> {
        self.ready.drain(..).collect()
    }

    /// Record the advisory total
    ///
    /// Repeating the same value is harmless; a different value is rejected.
    pub fn set_expected_total(&mut self, total: u64) -> VivaResult<()> {
        match self.expected_total {
            Some(current) if current != total => Err(VivaError::AlreadySet {
                current,
                attempted: total,
            }),
            _ => {
                self.expected_total = Some(total);
                Ok(())
            }
        }
    }

    pub fn expected_total(&self) -> Option<u64> {
        self.expected_total
    }

    pub fn received_count(&self) -> u64 {
        self.received
    }

    /// Chunks accepted but not yet drained
    pub fn pending(&self) -> usize {
        self.ready.len()
    }

    /// All advertised chunks have arrived
    pub fn is_complete(&self) -> bool {
        self.expected_total
            .map_or(false, |total| self.received >= total)
    }

    /// Forget everything, ready for a new session
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use viva_core::DEFAULT_SAMPLE_RATE;

    fn chunk(index: u64) -> AudioChunk {
        AudioChunk::new(index, vec![0.1; 16], DEFAULT_SAMPLE_RATE)
    }

    #[test]
    fn test_push_in_order() {
        let mut buffer = ChunkBuffer::new();
        for i in 0..3 {
            buffer.push(chunk(i)).unwrap();
        }

        assert_eq!(buffer.received_count(), 3);
        assert_eq!(buffer.pending(), 3);
        let drained: Vec<u64> = buffer.drain().iter().map(|c| c.sequence_index).collect();
        assert_eq!(drained, vec![0, 1, 2]);
        assert_eq!(buffer.pending(), 0);
        assert_eq!(buffer.next_index(), 3);
    }

    #[test]
    fn test_first_chunk_must_be_zero() {
        let mut buffer = ChunkBuffer::new();
        assert_eq!(
            buffer.push(chunk(1)),
            Err(VivaError::OutOfOrderChunk {
                expected: 0,
                actual: 1
            })
        );
        assert_eq!(buffer.received_count(), 0);
    }

    #[test]
    fn test_gap_and_duplicate_rejected() {
        let mut buffer = ChunkBuffer::new();
        buffer.push(chunk(0)).unwrap();
        buffer.push(chunk(1)).unwrap();

        assert!(matches!(
            buffer.push(chunk(3)),
            Err(VivaError::OutOfOrderChunk { expected: 2, actual: 3 })
        ));
        assert!(matches!(
            buffer.push(chunk(1)),
            Err(VivaError::OutOfOrderChunk { expected: 2, actual: 1 })
        ));

        // A rejected chunk changes nothing
        buffer.push(chunk(2)).unwrap();
        assert_eq!(buffer.received_count(), 3);
    }

    #[test]
    fn test_expected_total_set_once() {
        let mut buffer = ChunkBuffer::new();

        // Chunks may arrive before the total is known
        buffer.push(chunk(0)).unwrap();
        assert!(!buffer.is_complete());

        buffer.set_expected_total(2).unwrap();
        buffer.set_expected_total(2).unwrap();
        assert_eq!(
            buffer.set_expected_total(5),
            Err(VivaError::AlreadySet {
                current: 2,
                attempted: 5
            })
        );
        assert_eq!(buffer.expected_total(), Some(2));

        buffer.push(chunk(1)).unwrap();
        assert!(buffer.is_complete());
    }

    #[test]
    fn test_more_chunks_than_advertised_tolerated() {
        let mut buffer = ChunkBuffer::new();
        buffer.set_expected_total(1).unwrap();
        buffer.push(chunk(0)).unwrap();
        buffer.push(chunk(1)).unwrap();
        assert_eq!(buffer.received_count(), 2);
    }

    #[test]
    fn test_clear() {
        let mut buffer = ChunkBuffer::new();
        buffer.set_expected_total(4).unwrap();
        buffer.push(chunk(0)).unwrap();
        buffer.clear();

        assert_eq!(buffer.next_index(), 0);
        assert_eq!(buffer.expected_total(), None);
        buffer.push(chunk(0)).unwrap();
    }

    proptest! {
        #[test]
        fn prop_drain_preserves_push_order(count in 0u64..64, batch in 1usize..8) {
            let mut buffer = ChunkBuffer::new();
            let mut out = Vec::new();
            for i in 0..count {
                buffer.push(chunk(i)).unwrap();
                if (i as usize) % batch == 0 {
                    out.extend(buffer.drain().into_iter().map(|c| c.sequence_index));
                }
            }
            out.extend(buffer.drain().into_iter().map(|c| c.sequence_index));
            prop_assert_eq!(out, (0..count).collect::<Vec<_>>());
        }

        #[test]
        fn prop_any_skip_is_detected(prefix in 0u64..32, skip in 2u64..16) {
            let mut buffer = ChunkBuffer::new();
            for i in 0..prefix {
                buffer.push(chunk(i)).unwrap();
            }
            let bad = prefix + skip - 1;
            let is_out_of_order = matches!(
                buffer.push(chunk(bad)),
                Err(VivaError::OutOfOrderChunk { .. })
            );
            prop_assert!(is_out_of_order);
        }
    }
}
