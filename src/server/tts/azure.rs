//! Azure Cognitive Services speech client
//!
//! Synthesis goes through the regional TTS endpoint with an SSML body.
//! Voice listing is a static set of German neural voices rather than the
//! full catalog query.

use async_trait::async_trait;

use super::{SpeechSynthesizer, TtsError, Voice};
use crate::server::config::SharedConfig;

const OUTPUT_FORMAT: &str = "audio-16khz-128kbitrate-mono-mp3";

fn escape_xml(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[derive(Clone)]
pub struct AzureSpeechClient {
    http: reqwest::Client,
    config: SharedConfig,
}

impl AzureSpeechClient {
    pub fn new(config: SharedConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for AzureSpeechClient {
    fn name(&self) -> &'static str {
        "azure"
    }

    async fn synthesize(&self, text: &str, language: &str) -> Result<Vec<u8>, TtsError> {
        let azure = self.config.read().await.azure.clone();
        if azure.key.is_empty() {
            return Err(TtsError::NotConfigured("azure"));
        }

        let ssml = format!(
            "<speak version='1.0' xml:lang='{language}'>\
             <voice xml:lang='{language}' name='{voice}'>{text}</voice>\
             </speak>",
            voice = azure.voice_id,
            text = escape_xml(text),
        );

        let response = self
            .http
            .post(format!(
                "https://{}.tts.speech.microsoft.com/cognitiveservices/v1",
                azure.region
            ))
            .header("Ocp-Apim-Subscription-Key", &azure.key)
            .header("Content-Type", "application/ssml+xml")
            .header("X-Microsoft-OutputFormat", OUTPUT_FORMAT)
            .body(ssml)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(TtsError::Api {
                provider: "azure",
                status,
                body,
            });
        }

        Ok(response.bytes().await?.to_vec())
    }

    async fn voices(&self) -> Result<Vec<Voice>, TtsError> {
        let german = |id: &str, name: &str| Voice {
            id: id.into(),
            name: name.into(),
            language: "de-DE".into(),
        };
        Ok(vec![
            german("de-DE-ConradNeural", "Conrad"),
            german("de-DE-KatjaNeural", "Katja"),
            german("de-DE-AmalaNeural", "Amala"),
            german("de-DE-BerndNeural", "Bernd"),
            german("de-DE-KlausNeural", "Klaus"),
            german("de-DE-LouisaNeural", "Louisa"),
        ])
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::sync::RwLock;

    use super::*;
    use crate::server::config::ProviderConfig;

    #[test]
    fn xml_escaping_covers_ssml_specials() {
        assert_eq!(
            escape_xml("Preis < 10.000 € & \"gut\""),
            "Preis &lt; 10.000 € &amp; &quot;gut&quot;"
        );
        assert_eq!(escape_xml("O'Brien"), "O&apos;Brien");
    }

    #[tokio::test]
    async fn voice_listing_offers_distinct_german_voices() {
        let config: SharedConfig = Arc::new(RwLock::new(ProviderConfig::from_env()));
        let client = AzureSpeechClient::new(config);

        let voices = client.voices().await.unwrap();
        assert!(!voices.is_empty());
        for voice in &voices {
            assert_eq!(voice.language, "de-DE");
        }
        let mut ids: Vec<&str> = voices.iter().map(|v| v.id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), voices.len());
    }
}
