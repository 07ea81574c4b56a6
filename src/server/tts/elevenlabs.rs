//! ElevenLabs synthesis client

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::{SpeechSynthesizer, TtsError, Voice};
use crate::server::config::SharedConfig;

const API_BASE: &str = "https://api.elevenlabs.io/v1";

// Multilingual model, handles German without a per-language voice.
const MODEL_ID: &str = "eleven_multilingual_v2";

#[derive(Debug, Deserialize)]
struct VoicesResponse {
    voices: Vec<VoiceEntry>,
}

#[derive(Debug, Deserialize)]
struct VoiceEntry {
    voice_id: String,
    name: String,
}

#[derive(Clone)]
pub struct ElevenLabsClient {
    http: reqwest::Client,
    config: SharedConfig,
}

impl ElevenLabsClient {
    pub fn new(config: SharedConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for ElevenLabsClient {
    fn name(&self) -> &'static str {
        "elevenlabs"
    }

    async fn synthesize(&self, text: &str, _language: &str) -> Result<Vec<u8>, TtsError> {
        let elevenlabs = self.config.read().await.elevenlabs.clone();
        if elevenlabs.api_key.is_empty() {
            return Err(TtsError::NotConfigured("elevenlabs"));
        }

        let response = self
            .http
            .post(format!(
                "{API_BASE}/text-to-speech/{}",
                elevenlabs.voice_id
            ))
            .header("xi-api-key", &elevenlabs.api_key)
            .header("accept", "audio/mpeg")
            .json(&json!({
                "text": text,
                "model_id": MODEL_ID,
                "voice_settings": {
                    "stability": 0.5,
                    "similarity_boost": 0.75,
                },
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(TtsError::Api {
                provider: "elevenlabs",
                status,
                body,
            });
        }

        Ok(response.bytes().await?.to_vec())
    }

    async fn voices(&self) -> Result<Vec<Voice>, TtsError> {
        let elevenlabs = self.config.read().await.elevenlabs.clone();
        if elevenlabs.api_key.is_empty() {
            return Err(TtsError::NotConfigured("elevenlabs"));
        }

        let response = self
            .http
            .get(format!("{API_BASE}/voices"))
            .header("xi-api-key", &elevenlabs.api_key)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(TtsError::Api {
                provider: "elevenlabs",
                status,
                body,
            });
        }

        let listed: VoicesResponse = response.json().await?;
        Ok(listed
            .voices
            .into_iter()
            .map(|v| Voice {
                id: v.voice_id,
                name: v.name,
                language: "multilingual".into(),
            })
            .collect())
    }
}
