//! Remote speech service client
//!
//! [`SpeechService`] is the opaque request/response boundary: a base64 WAV
//! goes in, an optional base64 audio reply comes out.

use log::{debug, info};
use std::future::Future;
use std::time::Duration;

use crate::error::ApiError;
use crate::models::{ChatRequest, ChatResponse, SpeechReply};
use crate::settings::ApiSettings;

pub trait SpeechService: Send + Sync + 'static {
    fn complete(
        &self,
        wav_base64: String,
    ) -> impl Future<Output = Result<SpeechReply, ApiError>> + Send;
}

/// Chat-completions client using reqwest
pub struct SpeechClient {
    http: reqwest::Client,
    settings: ApiSettings,
}

impl SpeechClient {
    pub fn new(settings: ApiSettings) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;
        Ok(Self { http, settings })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.settings.base_url.trim_end_matches('/')
        )
    }
}

impl SpeechService for SpeechClient {
    async fn complete(&self, wav_base64: String) -> Result<SpeechReply, ApiError> {
        let request = ChatRequest::voice_message(
            &self.settings.model,
            &self.settings.voice,
            &self.settings.output_format,
            wav_base64,
        );

        debug!("POST {} (model {})", self.endpoint(), self.settings.model);
        let mut builder = self.http.post(self.endpoint()).json(&request);
        if let Some(key) = &self.settings.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ApiError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let reply = parse_reply(&body)?;
        if let Some(transcript) = &reply.transcript {
            info!("Reply: {}", transcript);
        }
        Ok(reply)
    }
}

/// Extract the reply from a response body.
///
/// A first choice without audio is a text-only reply, not an error.
pub fn parse_reply(body: &str) -> Result<SpeechReply, ApiError> {
    let response: ChatResponse =
        serde_json::from_str(body).map_err(|e| ApiError::Malformed(e.to_string()))?;

    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| ApiError::Malformed("response has no choices".to_string()))?;

    let message = choice.message;
    let (audio_base64, transcript) = match message.audio {
        Some(audio) => (
            audio.data.filter(|data| !data.is_empty()),
            audio.transcript.or(message.content),
        ),
        None => (None, message.content),
    };

    Ok(SpeechReply {
        audio_base64,
        transcript,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_audio_reply() {
        let body = r#"{"choices":[{"message":{"audio":{"data":"AAA=","transcript":"hello"}}}]}"#;
        let reply = parse_reply(body).unwrap();
        assert_eq!(reply.audio_base64.as_deref(), Some("AAA="));
        assert_eq!(reply.transcript.as_deref(), Some("hello"));
    }

    #[test]
    fn test_missing_audio_is_not_an_error() {
        let body = r#"{"choices":[{"message":{"content":"just text"}}]}"#;
        let reply = parse_reply(body).unwrap();
        assert!(reply.audio_base64.is_none());
        assert_eq!(reply.transcript.as_deref(), Some("just text"));
    }

    #[test]
    fn test_empty_audio_data_means_no_playback() {
        let body = r#"{"choices":[{"message":{"audio":{"data":""}}}]}"#;
        assert!(parse_reply(body).unwrap().audio_base64.is_none());
    }

    #[test]
    fn test_malformed_bodies() {
        assert!(matches!(parse_reply("not json"), Err(ApiError::Malformed(_))));
        assert!(matches!(parse_reply(r#"{"choices":[]}"#), Err(ApiError::Malformed(_))));
        assert!(matches!(
            parse_reply(r#"{"choices":[{"nomessage":1}]}"#),
            Err(ApiError::Malformed(_))
        ));
    }

    #[test]
    fn test_endpoint_joins_base_url() {
        let settings = ApiSettings {
            base_url: "https://api.example.com/v1/".to_string(),
            ..ApiSettings::default()
        };
        let client = SpeechClient::new(settings).unwrap();
        assert_eq!(client.endpoint(), "https://api.example.com/v1/chat/completions");
    }
}
