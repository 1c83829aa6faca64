//! Voice agent backed by HTTP speech services
//!
//! STT: POST raw audio, expect `{"text": "..."}`.
//! TTS: POST `{"text": "..."}`, expect audio bytes.

use crate::agents::VoiceAgent;
use crate::error::OrchestrationError;
use crate::models::AudioClip;
use crate::retry::unavailable;
use crate::Result;
use async_trait::async_trait;
use reqwest::{header, Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info};

const DEFAULT_AUDIO_CONTENT_TYPE: &str = "audio/wav";

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    #[serde(default)]
    text: String,
}

pub struct HttpVoiceAgent {
    client: Client,
    stt_url: Option<String>,
    tts_url: Option<String>,
}

impl HttpVoiceAgent {
    pub fn new(stt_url: Option<String>, tts_url: Option<String>) -> Result<Self> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(60))
            .timeout(Duration::from_secs(60))
            .build()?;

        Ok(Self {
            client,
            stt_url,
            tts_url,
        })
    }
}

#[async_trait]
impl VoiceAgent for HttpVoiceAgent {
    async fn speech_to_text(&self, audio: &[u8]) -> Result<String> {
        if audio.is_empty() {
            return Err(OrchestrationError::InputError("empty audio payload".to_string()));
        }

        let url = self.stt_url.as_deref().ok_or_else(|| {
            OrchestrationError::ConfigError("STT_ENDPOINT is not configured".to_string())
        })?;

        let response = self
            .client
            .post(url)
            .header(header::CONTENT_TYPE, DEFAULT_AUDIO_CONTENT_TYPE)
            .body(audio.to_vec())
            .send()
            .await
            .map_err(|e| unavailable("speech-to-text", e))?;

        let status = response.status();
        if status == StatusCode::BAD_REQUEST || status == StatusCode::UNPROCESSABLE_ENTITY {
            return Err(OrchestrationError::InputError(
                "audio could not be transcribed".to_string(),
            ));
        }
        if !status.is_success() {
            return Err(unavailable("speech-to-text", format!("returned {}", status)));
        }

        let transcription: TranscriptionResponse = response
            .json()
            .await
            .map_err(|e| unavailable("speech-to-text", format!("invalid response: {}", e)))?;

        let text = transcription.text.trim().to_string();
        if text.is_empty() {
            return Err(OrchestrationError::InputError("unintelligible audio".to_string()));
        }

        info!(chars = text.len(), "Audio transcribed");
        Ok(text)
    }

    async fn text_to_speech(&self, text: &str) -> Result<AudioClip> {
        let url = self.tts_url.as_deref().ok_or_else(|| {
            OrchestrationError::SynthesisFailure("TTS_ENDPOINT is not configured".to_string())
        })?;

        let response = self
            .client
            .post(url)
            .json(&json!({ "text": text }))
            .send()
            .await
            .map_err(|e| OrchestrationError::SynthesisFailure(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(OrchestrationError::SynthesisFailure(format!(
                "TTS endpoint returned {}",
                status
            )));
        }

        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or(DEFAULT_AUDIO_CONTENT_TYPE)
            .to_string();

        let bytes = response
            .bytes()
            .await
            .map_err(|e| OrchestrationError::SynthesisFailure(e.to_string()))?;

        if bytes.is_empty() {
            return Err(OrchestrationError::SynthesisFailure(
                "TTS endpoint returned no audio".to_string(),
            ));
        }

        debug!(bytes = bytes.len(), content_type = %content_type, "Speech synthesized");

        Ok(AudioClip {
            bytes: bytes.to_vec(),
            content_type,
        })
    }
}
