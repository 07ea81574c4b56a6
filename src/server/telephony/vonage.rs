//! Vonage voice client
//!
//! Authenticates with a short-lived RS256 application JWT signed by the
//! application's private key. The answer and event URLs point back at the
//! same webhook handlers the other providers use.

use async_trait::async_trait;
use chrono::Utc;
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use super::{TelephonyError, TelephonyProvider};
use crate::server::config::{SharedConfig, VonageConfig};

const API_BASE: &str = "https://api.nexmo.com/v1";
const TOKEN_TTL_SECS: i64 = 60;

#[derive(Debug, Serialize)]
struct AppTokenClaims {
    application_id: String,
    iat: i64,
    exp: i64,
    jti: String,
}

#[derive(Debug, Deserialize)]
struct CreateCallResponse {
    uuid: String,
}

#[derive(Clone)]
pub struct VonageClient {
    http: reqwest::Client,
    config: SharedConfig,
}

impl VonageClient {
    pub fn new(config: SharedConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    fn app_token(vonage: &VonageConfig) -> Result<String, TelephonyError> {
        let now = Utc::now().timestamp();
        let claims = AppTokenClaims {
            application_id: vonage.application_id.clone(),
            iat: now,
            exp: now + TOKEN_TTL_SECS,
            jti: Uuid::new_v4().to_string(),
        };
        let key = EncodingKey::from_rsa_pem(vonage.private_key.as_bytes())?;
        Ok(encode(&Header::new(Algorithm::RS256), &claims, &key)?)
    }
}

#[async_trait]
impl TelephonyProvider for VonageClient {
    fn name(&self) -> &'static str {
        "vonage"
    }

    async fn place_call(&self, to: &str) -> Result<String, TelephonyError> {
        let (vonage, base_url) = {
            let config = self.config.read().await;
            (config.vonage.clone(), config.webhook_base_url.clone())
        };
        if !vonage.is_configured() {
            return Err(TelephonyError::NotConfigured("vonage"));
        }

        let token = Self::app_token(&vonage)?;
        let response = self
            .http
            .post(format!("{API_BASE}/calls"))
            .bearer_auth(token)
            .json(&json!({
                "to": [{ "type": "phone", "number": to.trim_start_matches('+') }],
                "from": { "type": "phone", "number": vonage.phone_number.trim_start_matches('+') },
                "answer_url": [format!("{base_url}/webhooks/twilio/voice")],
                "answer_method": "POST",
                "event_url": [format!("{base_url}/webhooks/twilio/status")],
                "event_method": "POST",
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(TelephonyError::Api {
                provider: "vonage",
                status,
                body,
            });
        }

        let created: CreateCallResponse = response.json().await?;
        info!(call_uuid = %created.uuid, "placed outbound call");
        Ok(created.uuid)
    }

    async fn hangup(&self, provider_call_id: &str) -> Result<(), TelephonyError> {
        let vonage = self.config.read().await.vonage.clone();
        if !vonage.is_configured() {
            return Err(TelephonyError::NotConfigured("vonage"));
        }

        let token = Self::app_token(&vonage)?;
        let response = self
            .http
            .put(format!("{API_BASE}/calls/{provider_call_id}"))
            .bearer_auth(token)
            .json(&json!({ "action": "hangup" }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(TelephonyError::Api {
                provider: "vonage",
                status,
                body,
            });
        }
        Ok(())
    }
}
