//! In-memory WAV encoding using hound
//!
//! Produces the canonical 44-byte-header, mono, 16-bit PCM container the
//! speech service expects. Output is byte-identical for identical input.

use crate::error::EncodeError;
use hound::{WavSpec, WavWriter};
use std::io::Cursor;

/// Size of the RIFF/fmt/data header hound writes for mono 16-bit PCM
pub const HEADER_LEN: usize = 44;

const BYTES_PER_SAMPLE: usize = 2;

/// Largest sample count whose payload still fits the 32-bit RIFF size field
const MAX_SAMPLES: usize = (u32::MAX as usize - (HEADER_LEN - 8)) / BYTES_PER_SAMPLE;

/// Mono 16-bit PCM WAV encoder
#[derive(Clone, Copy, Debug)]
pub struct WaveEncoder {
    spec: WavSpec,
}

impl WaveEncoder {
    /// Create an encoder for the given capture rate
    pub fn new(sample_rate: u32) -> Self {
        let spec = WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        Self { spec }
    }

    /// Length in bytes of the container for `sample_count` samples
    pub fn encoded_len(sample_count: usize) -> usize {
        HEADER_LEN + sample_count * BYTES_PER_SAMPLE
    }

    /// Encode float samples into a complete WAV byte sequence.
    ///
    /// Zero samples yield a bare header describing an empty data chunk.
    pub fn encode(&self, samples: &[f32]) -> Result<Vec<u8>, EncodeError> {
        if samples.len() > MAX_SAMPLES {
            return Err(EncodeError::TooLong(samples.len()));
        }

        let mut cursor = Cursor::new(Vec::with_capacity(Self::encoded_len(samples.len())));
        {
            let mut writer = WavWriter::new(&mut cursor, self.spec)?;
            let mut pcm = writer.get_i16_writer(samples.len() as u32);
            for &sample in samples {
                pcm.write_sample(to_pcm16(sample));
            }
            pcm.flush()?;
            writer.finalize()?;
        }

        Ok(cursor.into_inner())
    }
}

/// Quantize one normalized sample to signed 16-bit.
///
/// Negative values scale by 32768 and non-negative values by 32767, so -1.0
/// maps to -32768 and 1.0 to 32767. The fractional part is truncated toward
/// zero.
pub fn to_pcm16(sample: f32) -> i16 {
    let s = sample.clamp(-1.0, 1.0);
    if s < 0.0 {
        (s * 32768.0) as i16
    } else {
        (s * 32767.0) as i16
    }
}
