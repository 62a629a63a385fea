//! Audio capture, encoding, analysis and playback
//!
//! This module provides:
//! - Microphone capture at 16kHz mono via PipeWire
//! - Chunk accumulation and in-memory WAV encoding via hound
//! - PCM16 reply decoding and gapless scheduled playback at 24kHz
//! - Signal taps and FFT energy analysers for the visualizer

mod analyser;
mod buffer;
mod capture;
mod decoder;
mod output;
mod playback;
mod tap;
mod wav;

pub use analyser::{AnalyserConfig, EnergyAnalyser};
pub use buffer::{AudioChunk, SampleBuffer};
pub use capture::{AudioInput, CaptureConfig, CaptureEvent, ChunkSink, PendingGrant, PipeWireInput};
pub use decoder::{PlaybackBuffer, PlaybackDecoder};
pub use output::{OutputContext, PlaybackCursor, ScheduledSegment, SharedTimeline};
pub use playback::{AudioOutput, PipeWireOutput, PipeWirePlayback};
pub use tap::SignalTap;
pub use wav::WaveEncoder;
