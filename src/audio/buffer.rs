//! Sample accumulation for a recording session
//!
//! Device callbacks hand over one [`AudioChunk`] each. Chunks are kept as-is
//! until the session stops, then merged once into a contiguous sequence.

/// One device callback's worth of normalized mono samples
#[derive(Clone, Debug, PartialEq)]
pub struct AudioChunk {
    samples: Box<[f32]>,
}

impl AudioChunk {
    pub fn new(samples: impl Into<Box<[f32]>>) -> Self {
        Self {
            samples: samples.into(),
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }
}

impl From<Vec<f32>> for AudioChunk {
    fn from(samples: Vec<f32>) -> Self {
        Self::new(samples)
    }
}

/// Ordered chunks plus a running sample count
#[derive(Debug, Default)]
pub struct SampleBuffer {
    chunks: Vec<AudioChunk>,
    total: usize,
}

impl SampleBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk, preserving arrival order
    pub fn push(&mut self, chunk: AudioChunk) {
        self.total += chunk.len();
        self.chunks.push(chunk);
    }

    /// Total number of samples across all chunks
    pub fn len(&self) -> usize {
        self.total
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Drop all buffered chunks
    pub fn clear(&mut self) {
        self.chunks.clear();
        self.total = 0;
    }

    /// Merge all chunks into one contiguous sequence
    pub fn merge(&self) -> Vec<f32> {
        let mut merged = Vec::with_capacity(self.total);
        for chunk in &self.chunks {
            merged.extend_from_slice(chunk.samples());
        }
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_tracks_chunk_lengths() {
        let mut buffer = SampleBuffer::new();
        let lengths = [4096, 0, 17, 1, 4096, 333];
        for &n in &lengths {
            buffer.push(AudioChunk::from(vec![0.25; n]));
        }
        assert_eq!(buffer.len(), lengths.iter().sum::<usize>());
        assert_eq!(buffer.chunk_count(), lengths.len());
        assert_eq!(buffer.merge().len(), buffer.len());
    }

    #[test]
    fn test_merge_preserves_arrival_order() {
        let mut buffer = SampleBuffer::new();
        buffer.push(AudioChunk::from(vec![0.1, 0.2]));
        buffer.push(AudioChunk::from(vec![0.3]));
        buffer.push(AudioChunk::from(vec![0.4, 0.5, 0.6]));
        assert_eq!(buffer.merge(), vec![0.1, 0.2, 0.3, 0.4, 0.5, 0.6]);
    }

    #[test]
    fn test_clear_resets_count() {
        let mut buffer = SampleBuffer::new();
        buffer.push(AudioChunk::from(vec![1.0; 10]));
        buffer.clear();
        assert_eq!(buffer.len(), 0);
        assert_eq!(buffer.chunk_count(), 0);
        assert!(buffer.merge().is_empty());
    }
}
