//! Sipgate voice client
//!
//! Uses the sipgate.io REST API with personal access token auth. Sipgate
//! initiates the call from a registered device; webhook push must be
//! configured on the sipgate side to point at this server.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use super::{TelephonyError, TelephonyProvider};
use crate::server::config::SharedConfig;

const API_BASE: &str = "https://api.sipgate.com/v2";

#[derive(Debug, Deserialize)]
struct NewCallResponse {
    #[serde(rename = "sessionId")]
    session_id: String,
}

#[derive(Clone)]
pub struct SipgateClient {
    http: reqwest::Client,
    config: SharedConfig,
}

impl SipgateClient {
    pub fn new(config: SharedConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl TelephonyProvider for SipgateClient {
    fn name(&self) -> &'static str {
        "sipgate"
    }

    async fn place_call(&self, to: &str) -> Result<String, TelephonyError> {
        let sipgate = self.config.read().await.sipgate.clone();
        if !sipgate.is_configured() {
            return Err(TelephonyError::NotConfigured("sipgate"));
        }

        let response = self
            .http
            .post(format!("{API_BASE}/sessions/calls"))
            .basic_auth(&sipgate.token_id, Some(&sipgate.token))
            .json(&json!({
                "deviceId": sipgate.device_id,
                "caller": sipgate.device_id,
                "callerId": sipgate.phone_number,
                "callee": to,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(TelephonyError::Api {
                provider: "sipgate",
                status,
                body,
            });
        }

        let created: NewCallResponse = response.json().await?;
        info!(session_id = %created.session_id, "placed outbound call");
        Ok(created.session_id)
    }

    async fn hangup(&self, provider_call_id: &str) -> Result<(), TelephonyError> {
        let sipgate = self.config.read().await.sipgate.clone();
        if !sipgate.is_configured() {
            return Err(TelephonyError::NotConfigured("sipgate"));
        }

        let response = self
            .http
            .delete(format!("{API_BASE}/calls/{provider_call_id}"))
            .basic_auth(&sipgate.token_id, Some(&sipgate.token))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(TelephonyError::Api {
                provider: "sipgate",
                status,
                body,
            });
        }
        Ok(())
    }
}
