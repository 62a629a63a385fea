//! Error taxonomy for the capture → encode → transport → playback pipeline

use thiserror::Error;

/// Microphone acquisition failures. Fatal to the current session.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("Microphone access denied: {0}")]
    PermissionDenied(String),

    #[error("No audio input device available")]
    NoDevice,

    #[error("Audio device is busy: {0}")]
    Busy(String),

    #[error("Audio backend error: {0}")]
    Backend(String),
}

/// Waveform container could not be written.
#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("Failed to write WAV container: {0}")]
    Wav(#[from] hound::Error),

    #[error("Recording too long for a WAV container ({0} samples)")]
    TooLong(usize),
}

/// Remote speech service failures.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Malformed response: {0}")]
    Malformed(String),
}

/// Playback payload could not be turned into a playable buffer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Payload of {len} bytes is not a whole number of {channels}-channel 16-bit frames")]
    OddLength { len: usize, channels: u16 },

    #[error("Invalid channel count: {0}")]
    NoChannels(u16),

    #[error("Invalid base64 payload: {0}")]
    Base64(String),

    #[error("Decode task failed: {0}")]
    Task(String),
}

/// Anything that can abort the guarded processing scope after recording stops.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Decode(#[from] DecodeError),
}

impl PipelineError {
    /// Short message for the status line
    pub fn user_message(&self) -> String {
        match self {
            PipelineError::Encode(_) => "Failed to process audio.".to_string(),
            PipelineError::Api(e) => format!("API error: {}", e),
            PipelineError::Decode(_) => "Could not play the reply audio.".to_string(),
        }
    }
}
