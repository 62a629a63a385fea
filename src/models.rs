//! Wire types for the chat-completions speech API

use serde::{Deserialize, Serialize};

/// Request body for `POST /chat/completions`
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub modalities: Vec<String>,
    pub audio: AudioOutputOptions,
    pub messages: Vec<ChatMessage>,
}

/// Voice and codec of the spoken reply
#[derive(Debug, Clone, Serialize)]
pub struct AudioOutputOptions {
    pub voice: String,
    pub format: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: Vec<ContentPart>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    InputAudio { input_audio: InputAudio },
}

/// Base64 audio attached to a user message
#[derive(Debug, Clone, Serialize)]
pub struct InputAudio {
    pub data: String,
    pub format: String,
}

impl ChatRequest {
    /// One user message carrying a base64 WAV recording, asking for text
    /// and audio back
    pub fn voice_message(model: &str, voice: &str, output_format: &str, wav_base64: String) -> Self {
        Self {
            model: model.to_string(),
            modalities: vec!["text".to_string(), "audio".to_string()],
            audio: AudioOutputOptions {
                voice: voice.to_string(),
                format: output_format.to_string(),
            },
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: vec![ContentPart::InputAudio {
                    input_audio: InputAudio {
                        data: wav_base64,
                        format: "wav".to_string(),
                    },
                }],
            }],
        }
    }
}

/// Response body; only the fields we use
#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    #[serde(default)]
    pub choices: Vec<Choice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Choice {
    pub message: ResponseMessage,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResponseMessage {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub audio: Option<ResponseAudio>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResponseAudio {
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default)]
    pub transcript: Option<String>,
}

/// What the service said back
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpeechReply {
    /// Base64 audio in the requested output codec, if audio was returned
    pub audio_base64: Option<String>,
    pub transcript: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_shape() {
        let request = ChatRequest::voice_message("gpt-audio-mini", "alloy", "pcm16", "UklGRg==".into());
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            json!({
                "model": "gpt-audio-mini",
                "modalities": ["text", "audio"],
                "audio": { "voice": "alloy", "format": "pcm16" },
                "messages": [{
                    "role": "user",
                    "content": [{
                        "type": "input_audio",
                        "input_audio": { "data": "UklGRg==", "format": "wav" }
                    }]
                }]
            })
        );
    }

    #[test]
    fn test_response_with_audio() {
        let body = json!({
            "id": "chatcmpl-1",
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": null,
                    "audio": { "id": "audio_1", "data": "AAA=", "transcript": "hi", "expires_at": 1 }
                },
                "finish_reason": "stop"
            }]
        });
        let response: ChatResponse = serde_json::from_value(body).unwrap();
        let audio = response.choices[0].message.audio.as_ref().unwrap();
        assert_eq!(audio.data.as_deref(), Some("AAA="));
        assert_eq!(audio.transcript.as_deref(), Some("hi"));
    }

    #[test]
    fn test_response_without_audio() {
        let body = json!({ "choices": [{ "message": { "content": "text only" } }] });
        let response: ChatResponse = serde_json::from_value(body).unwrap();
        assert!(response.choices[0].message.audio.is_none());
        assert_eq!(response.choices[0].message.content.as_deref(), Some("text only"));
    }
}
