//! Speech synthesis
//!
//! Turns dialogue text into an mp3 under the audio directory, served at
//! /audio/{filename} for the telephony provider to fetch. Backend selection
//! mirrors the telephony layer: read from the shared config per request.

pub mod azure;
pub mod elevenlabs;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::server::config::{SharedConfig, TtsKind};

#[derive(Error, Debug)]
pub enum TtsError {
    #[error("{0} is not configured")]
    NotConfigured(&'static str),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("{provider} API error {status}: {body}")]
    Api {
        provider: &'static str,
        status: u16,
        body: String,
    },
    #[error("writing audio file failed: {0}")]
    Io(#[from] std::io::Error),
}

/// A synthesized audio file ready to be played on a call.
#[derive(Debug, Clone, Serialize)]
pub struct AudioClip {
    pub filename: String,
    /// Publicly reachable URL for the provider's media fetcher.
    pub url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Voice {
    pub id: String,
    pub name: String,
    pub language: String,
}

#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    fn name(&self) -> &'static str;

    /// Synthesize `text` and return the raw mp3 bytes.
    async fn synthesize(&self, text: &str, language: &str) -> Result<Vec<u8>, TtsError>;

    async fn voices(&self) -> Result<Vec<Voice>, TtsError>;
}

#[derive(Clone)]
pub struct Speech {
    config: SharedConfig,
    elevenlabs: elevenlabs::ElevenLabsClient,
    azure: azure::AzureSpeechClient,
}

impl Speech {
    pub fn new(config: SharedConfig) -> Self {
        Self {
            elevenlabs: elevenlabs::ElevenLabsClient::new(config.clone()),
            azure: azure::AzureSpeechClient::new(config.clone()),
            config,
        }
    }

    async fn current(&self) -> &dyn SpeechSynthesizer {
        match self.config.read().await.tts {
            TtsKind::ElevenLabs => &self.elevenlabs,
            TtsKind::Azure => &self.azure,
        }
    }

    pub async fn voices(&self) -> Result<Vec<Voice>, TtsError> {
        self.current().await.voices().await
    }

    /// Synthesize `text` to a fresh mp3 in the audio directory and return
    /// the clip with its public URL.
    pub async fn speak(&self, text: &str, language: &str) -> Result<AudioClip, TtsError> {
        let audio = self.current().await.synthesize(text, language).await?;

        let (audio_dir, base_url) = {
            let config = self.config.read().await;
            (config.audio_dir.clone(), config.webhook_base_url.clone())
        };

        let filename = format!("{}.mp3", Uuid::new_v4());
        tokio::fs::create_dir_all(&audio_dir).await?;
        tokio::fs::write(format!("{audio_dir}/{filename}"), audio).await?;

        Ok(AudioClip {
            url: format!("{base_url}/audio/{filename}"),
            filename,
        })
    }
}
