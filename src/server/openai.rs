//! OpenAI API client
//!
//! Thin wrapper over the chat completions and audio transcription endpoints.
//! Credentials are read from the shared config on every request so settings
//! updates apply to in-flight campaigns.

use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::debug;

use crate::server::config::SharedConfig;

const API_BASE: &str = "https://api.openai.com/v1";

#[derive(Error, Debug)]
pub enum OpenAiError {
    #[error("OpenAI API key is not configured")]
    NotConfigured,
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("OpenAI API error {status}: {body}")]
    Api { status: u16, body: String },
    #[error("response contained no choices")]
    EmptyResponse,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".into(), content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".into(), content: content.into() }
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

#[derive(Clone)]
pub struct OpenAiClient {
    http: reqwest::Client,
    config: SharedConfig,
}

impl OpenAiClient {
    pub fn new(config: SharedConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    async fn credentials(&self) -> Result<(String, String), OpenAiError> {
        let config = self.config.read().await;
        if config.openai_api_key.is_empty() {
            return Err(OpenAiError::NotConfigured);
        }
        Ok((config.openai_api_key.clone(), config.openai_model.clone()))
    }

    /// Run a chat completion and return the assistant's reply text.
    pub async fn chat(
        &self,
        messages: &[ChatMessage],
        max_tokens: u32,
        temperature: f32,
    ) -> Result<String, OpenAiError> {
        let (api_key, model) = self.credentials().await?;

        debug!(model = %model, turns = messages.len(), "requesting chat completion");

        let response = self
            .http
            .post(format!("{API_BASE}/chat/completions"))
            .bearer_auth(&api_key)
            .json(&json!({
                "model": model,
                "messages": messages,
                "max_tokens": max_tokens,
                "temperature": temperature,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(OpenAiError::Api { status, body });
        }

        let completion: ChatCompletionResponse = response.json().await?;
        completion
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or(OpenAiError::EmptyResponse)
    }

    /// Transcribe recorded audio with Whisper. Used for post-call transcript
    /// refinement when a recording URL comes in.
    pub async fn transcribe(
        &self,
        audio: Vec<u8>,
        filename: &str,
        language: &str,
    ) -> Result<String, OpenAiError> {
        let (api_key, _) = self.credentials().await?;

        let part = reqwest::multipart::Part::bytes(audio).file_name(filename.to_string());
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("model", "whisper-1")
            .text("language", language.to_string());

        let response = self
            .http
            .post(format!("{API_BASE}/audio/transcriptions"))
            .bearer_auth(&api_key)
            .multipart(form)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(OpenAiError::Api { status, body });
        }

        let transcription: TranscriptionResponse = response.json().await?;
        Ok(transcription.text)
    }
}
