//! Raw PCM16 payload → playable planar float buffer

use crate::error::DecodeError;

/// Decoded audio ready to be scheduled on an output context
#[derive(Clone, Debug, PartialEq)]
pub struct PlaybackBuffer {
    sample_rate: u32,
    /// One plane per channel, all of equal length
    planes: Vec<Vec<f32>>,
}

impl PlaybackBuffer {
    /// Number of sample frames
    pub fn frames(&self) -> usize {
        self.planes.first().map_or(0, Vec::len)
    }

    /// Length in seconds
    pub fn duration(&self) -> f64 {
        self.frames() as f64 / self.sample_rate as f64
    }

    /// Average of all channels, for a mono output
    pub fn mixdown(&self) -> Vec<f32> {
        match self.planes.len() {
            0 => Vec::new(),
            1 => self.planes[0].clone(),
            n => (0..self.frames())
                .map(|i| self.planes.iter().map(|p| p[i]).sum::<f32>() / n as f32)
                .collect(),
        }
    }
}

/// Convert little-endian signed 16-bit samples to floats in [-1, 1).
///
/// A trailing odd byte is ignored; callers validate length first.
pub fn pcm16_to_f32(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0)
        .collect()
}

/// Synchronous decode of an interleaved PCM16 payload into planes
pub fn decode_pcm16(
    payload: &[u8],
    sample_rate: u32,
    channels: u16,
) -> Result<PlaybackBuffer, DecodeError> {
    if channels == 0 {
        return Err(DecodeError::NoChannels(channels));
    }
    let frame_bytes = 2 * channels as usize;
    if payload.len() % frame_bytes != 0 {
        return Err(DecodeError::OddLength {
            len: payload.len(),
            channels,
        });
    }

    let interleaved = pcm16_to_f32(payload);
    let n_channels = channels as usize;
    let frames = interleaved.len() / n_channels;
    let mut planes: Vec<Vec<f32>> = (0..n_channels).map(|_| Vec::with_capacity(frames)).collect();
    for frame in interleaved.chunks_exact(n_channels) {
        for (plane, &sample) in planes.iter_mut().zip(frame) {
            plane.push(sample);
        }
    }

    Ok(PlaybackBuffer {
        sample_rate,
        planes,
    })
}

/// Decodes service payloads at a fixed target format
#[derive(Clone, Copy, Debug)]
pub struct PlaybackDecoder {
    sample_rate: u32,
    channels: u16,
}

impl PlaybackDecoder {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
        }
    }

    /// Decode off the cooperative thread so rendering keeps going
    pub async fn decode(&self, payload: Vec<u8>) -> Result<PlaybackBuffer, DecodeError> {
        let (sample_rate, channels) = (self.sample_rate, self.channels);
        tokio::task::spawn_blocking(move || decode_pcm16(&payload, sample_rate, channels))
            .await
            .map_err(|e| DecodeError::Task(e.to_string()))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    impl PlaybackBuffer {
        /// Mono buffer from already-normalized samples
        pub(crate) fn mono(samples: Vec<f32>, sample_rate: u32) -> Self {
            Self {
                sample_rate,
                planes: vec![samples],
            }
        }

        pub(crate) fn sample_rate(&self) -> u32 {
            self.sample_rate
        }

        pub(crate) fn channel_count(&self) -> usize {
            self.planes.len()
        }

        pub(crate) fn channel(&self, index: usize) -> Option<&[f32]> {
            self.planes.get(index).map(Vec::as_slice)
        }
    }

    #[test]
    fn test_scaling() {
        let payload = [0x00, 0x80, 0xFF, 0x7F, 0x00, 0x00, 0x00, 0x40];
        let buffer = decode_pcm16(&payload, 24000, 1).unwrap();
        assert_eq!(buffer.channel(0).unwrap(), &[-1.0, 32767.0 / 32768.0, 0.0, 0.5]);
    }

    #[test]
    fn test_zero_payload_is_silence() {
        let buffer = decode_pcm16(&vec![0u8; 48000], 24000, 1).unwrap();
        assert_eq!(buffer.frames(), 24000);
        assert_eq!(buffer.duration(), 1.0);
        assert!(buffer.channel(0).unwrap().iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_deinterleaves_stereo() {
        // L = 0.5, R = -0.5, twice
        let payload = [0x00, 0x40, 0x00, 0xC0, 0x00, 0x40, 0x00, 0xC0];
        let buffer = decode_pcm16(&payload, 24000, 2).unwrap();
        assert_eq!(buffer.channel_count(), 2);
        assert_eq!(buffer.channel(0).unwrap(), &[0.5, 0.5]);
        assert_eq!(buffer.channel(1).unwrap(), &[-0.5, -0.5]);
        assert_eq!(buffer.mixdown(), vec![0.0, 0.0]);
    }

    #[test]
    fn test_odd_length_is_rejected() {
        assert_eq!(
            decode_pcm16(&[0, 0, 0], 24000, 1),
            Err(DecodeError::OddLength { len: 3, channels: 1 })
        );
        // Whole samples but not whole stereo frames
        assert_eq!(
            decode_pcm16(&[0, 0, 0, 0, 0, 0], 24000, 2),
            Err(DecodeError::OddLength { len: 6, channels: 2 })
        );
    }

    #[test]
    fn test_zero_channels_is_rejected() {
        assert_eq!(decode_pcm16(&[], 24000, 0), Err(DecodeError::NoChannels(0)));
    }

    #[test]
    fn test_empty_payload() {
        let buffer = decode_pcm16(&[], 24000, 1).unwrap();
        assert_eq!(buffer.frames(), 0);
        assert_eq!(buffer.duration(), 0.0);
    }

    #[tokio::test]
    async fn test_async_decode() {
        let decoder = PlaybackDecoder::new(24000, 1);
        let buffer = decoder.decode(vec![0u8; 480]).await.unwrap();
        assert_eq!(buffer.frames(), 240);
        assert_eq!(buffer.sample_rate(), 24000);

        let err = decoder.decode(vec![0u8; 481]).await.unwrap_err();
        assert!(matches!(err, DecodeError::OddLength { len: 481, .. }));
    }
}
