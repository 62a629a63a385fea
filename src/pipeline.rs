//! The guarded processing scope run after a recording stops
//!
//! encode → base64 → remote call → base64 decode → PCM decode. Any failure
//! aborts the rest of the scope; nothing is scheduled for playback unless
//! every step succeeded.

use log::{debug, info};
use std::time::Duration;

use crate::api::SpeechService;
use crate::audio::{PlaybackBuffer, PlaybackDecoder, WaveEncoder};
use crate::error::PipelineError;
use crate::session::CapturedAudio;
use crate::transport::Base64Codec;

/// Result of a successful processing scope
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Reply audio ready to schedule
    Reply {
        buffer: PlaybackBuffer,
        transcript: Option<String>,
    },
    /// The service answered without audio
    NoAudio { transcript: Option<String> },
    /// Recording shorter than the configured floor; nothing was sent
    Skipped { duration: Duration },
}

pub struct Pipeline<S: SpeechService> {
    encoder: WaveEncoder,
    decoder: PlaybackDecoder,
    service: S,
    min_duration: Option<Duration>,
}

impl<S: SpeechService> Pipeline<S> {
    pub fn new(capture_rate: u32, playback_rate: u32, service: S) -> Self {
        Self {
            encoder: WaveEncoder::new(capture_rate),
            decoder: PlaybackDecoder::new(playback_rate, 1),
            service,
            min_duration: None,
        }
    }

    /// Recordings shorter than `floor` are dropped instead of sent
    pub fn with_min_duration(mut self, floor: Option<Duration>) -> Self {
        self.min_duration = floor;
        self
    }

    pub async fn process(&self, audio: CapturedAudio) -> Result<Outcome, PipelineError> {
        let duration = Duration::from_secs_f64(audio.duration_seconds().max(0.0));
        if let Some(floor) = self.min_duration {
            if duration < floor {
                info!(
                    "Session {}: {} ms recording is below the {} ms floor, not sending",
                    audio.session,
                    duration.as_millis(),
                    floor.as_millis()
                );
                return Ok(Outcome::Skipped { duration });
            }
        }

        let wav = self.encoder.encode(&audio.samples)?;
        debug!(
            "Session {}: encoded {} samples into {} bytes",
            audio.session,
            audio.samples.len(),
            wav.len()
        );

        let reply = self.service.complete(Base64Codec::encode(&wav)).await?;
        let Some(audio_base64) = reply.audio_base64 else {
            info!("Session {}: reply has no audio", audio.session);
            return Ok(Outcome::NoAudio {
                transcript: reply.transcript,
            });
        };

        let payload = Base64Codec::decode(&audio_base64)?;
        let buffer = self.decoder.decode(payload).await?;
        debug!(
            "Session {}: decoded {:.2}s of reply audio",
            audio.session,
            buffer.duration()
        );

        Ok(Outcome::Reply {
            buffer,
            transcript: reply.transcript,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::{ApiError, DecodeError};
    use crate::models::SpeechReply;
    use crate::session::SessionId;
    use std::sync::{Arc, Mutex};

    /// Service that records requests and answers with a canned reply
    #[derive(Clone)]
    pub(crate) struct FakeService {
        pub(crate) reply: Arc<Mutex<Option<Result<SpeechReply, String>>>>,
        pub(crate) requests: Arc<Mutex<Vec<String>>>,
    }

    impl FakeService {
        pub(crate) fn replying(reply: SpeechReply) -> Self {
            Self {
                reply: Arc::new(Mutex::new(Some(Ok(reply)))),
                requests: Arc::default(),
            }
        }

        pub(crate) fn failing(message: &str) -> Self {
            Self {
                reply: Arc::new(Mutex::new(Some(Err(message.to_string())))),
                requests: Arc::default(),
            }
        }

        pub(crate) fn with_pcm(pcm: &[u8]) -> Self {
            Self::replying(SpeechReply {
                audio_base64: Some(Base64Codec::encode(pcm)),
                transcript: Some("ok".to_string()),
            })
        }
    }

    impl SpeechService for FakeService {
        async fn complete(&self, wav_base64: String) -> Result<SpeechReply, ApiError> {
            self.requests.lock().unwrap().push(wav_base64);
            match self.reply.lock().unwrap().clone() {
                Some(Ok(reply)) => Ok(reply),
                Some(Err(message)) => Err(ApiError::Malformed(message)),
                None => Ok(SpeechReply::default()),
            }
        }
    }

    pub(crate) fn captured(samples: Vec<f32>) -> CapturedAudio {
        CapturedAudio {
            session: SessionId::new(),
            samples,
            sample_rate: 16000,
        }
    }

    #[tokio::test]
    async fn test_reply_is_decoded() {
        let service = FakeService::with_pcm(&[0u8; 4800]);
        let pipeline = Pipeline::new(16000, 24000, service.clone());

        let outcome = pipeline.process(captured(vec![0.0; 16000])).await.unwrap();
        let Outcome::Reply { buffer, transcript } = outcome else {
            panic!("expected reply audio");
        };
        assert_eq!(buffer.frames(), 2400);
        assert_eq!(buffer.sample_rate(), 24000);
        assert!(buffer.channel(0).unwrap().iter().all(|&s| s == 0.0));
        assert_eq!(transcript.as_deref(), Some("ok"));
    }

    #[tokio::test]
    async fn test_request_carries_wav() {
        let service = FakeService::with_pcm(&[]);
        let pipeline = Pipeline::new(16000, 24000, service.clone());
        pipeline.process(captured(vec![0.0; 16000])).await.unwrap();

        let requests = service.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        let wav = Base64Codec::decode(&requests[0]).unwrap();
        assert_eq!(wav.len(), WaveEncoder::encoded_len(16000));
        assert_eq!(&wav[0..4], b"RIFF");
        assert!(wav[44..].iter().all(|&b| b == 0));
    }

    #[tokio::test]
    async fn test_no_audio_reply() {
        let service = FakeService::replying(SpeechReply {
            audio_base64: None,
            transcript: Some("text only".to_string()),
        });
        let pipeline = Pipeline::new(16000, 24000, service);
        let outcome = pipeline.process(captured(vec![0.1; 10])).await.unwrap();
        assert_eq!(
            outcome,
            Outcome::NoAudio {
                transcript: Some("text only".to_string())
            }
        );
    }

    #[tokio::test]
    async fn test_odd_payload_is_a_decode_error() {
        let pipeline = Pipeline::new(16000, 24000, FakeService::with_pcm(&[0u8; 7]));
        let err = pipeline.process(captured(vec![0.0; 100])).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Decode(DecodeError::OddLength { len: 7, .. })
        ));
    }

    #[tokio::test]
    async fn test_api_failure_surfaces() {
        let pipeline = Pipeline::new(16000, 24000, FakeService::failing("boom"));
        let err = pipeline.process(captured(vec![0.0; 100])).await.unwrap_err();
        assert!(matches!(err, PipelineError::Api(ApiError::Malformed(_))));
    }

    #[tokio::test]
    async fn test_bad_base64_is_a_decode_error() {
        let service = FakeService::replying(SpeechReply {
            audio_base64: Some("%%%".to_string()),
            transcript: None,
        });
        let pipeline = Pipeline::new(16000, 24000, service);
        let err = pipeline.process(captured(vec![0.0; 100])).await.unwrap_err();
        assert!(matches!(err, PipelineError::Decode(DecodeError::Base64(_))));
    }

    #[tokio::test]
    async fn test_short_recording_floor() {
        let service = FakeService::with_pcm(&[0u8; 2]);
        let pipeline = Pipeline::new(16000, 24000, service.clone())
            .with_min_duration(Some(Duration::from_millis(100)));

        let outcome = pipeline.process(captured(vec![0.0; 160])).await.unwrap();
        assert!(matches!(outcome, Outcome::Skipped { .. }));
        assert!(service.requests.lock().unwrap().is_empty());

        let outcome = pipeline.process(captured(vec![0.0; 1600])).await.unwrap();
        assert!(matches!(outcome, Outcome::Reply { .. }));
    }

    #[tokio::test]
    async fn test_empty_recording_is_sent_by_default() {
        let service = FakeService::with_pcm(&[]);
        let pipeline = Pipeline::new(16000, 24000, service.clone());
        let outcome = pipeline.process(captured(Vec::new())).await.unwrap();
        assert!(matches!(outcome, Outcome::Reply { .. }));
        let wav = Base64Codec::decode(&service.requests.lock().unwrap()[0]).unwrap();
        assert_eq!(wav.len(), 44);
    }
}
