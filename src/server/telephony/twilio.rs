//! Twilio voice client
//!
//! Places calls through the 2010-04-01 REST API. Every call is created with
//! the full webhook wiring: voice URL, status callbacks, recording callback
//! and async answering machine detection.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

use super::{TelephonyError, TelephonyProvider};
use crate::server::config::SharedConfig;

const API_BASE: &str = "https://api.twilio.com/2010-04-01";

#[derive(Debug, Deserialize)]
struct CreateCallResponse {
    sid: String,
}

#[derive(Clone)]
pub struct TwilioClient {
    http: reqwest::Client,
    config: SharedConfig,
}

impl TwilioClient {
    pub fn new(config: SharedConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl TelephonyProvider for TwilioClient {
    fn name(&self) -> &'static str {
        "twilio"
    }

    async fn place_call(&self, to: &str) -> Result<String, TelephonyError> {
        let (twilio, base_url) = {
            let config = self.config.read().await;
            (config.twilio.clone(), config.webhook_base_url.clone())
        };
        if !twilio.is_configured() {
            return Err(TelephonyError::NotConfigured("twilio"));
        }

        let params = [
            ("To", to.to_string()),
            ("From", twilio.phone_number.clone()),
            ("Url", format!("{base_url}/webhooks/twilio/voice")),
            ("Method", "POST".into()),
            ("StatusCallback", format!("{base_url}/webhooks/twilio/status")),
            ("StatusCallbackEvent", "initiated ringing answered completed".into()),
            ("StatusCallbackMethod", "POST".into()),
            ("Record", "true".into()),
            (
                "RecordingStatusCallback",
                format!("{base_url}/webhooks/twilio/recording"),
            ),
            ("MachineDetection", "DetectMessageEnd".into()),
            ("AsyncAmd", "true".into()),
            (
                "AsyncAmdStatusCallback",
                format!("{base_url}/webhooks/twilio/amd"),
            ),
        ];

        let response = self
            .http
            .post(format!(
                "{API_BASE}/Accounts/{}/Calls.json",
                twilio.account_sid
            ))
            .basic_auth(&twilio.account_sid, Some(&twilio.auth_token))
            .form(&params)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(TelephonyError::Api {
                provider: "twilio",
                status,
                body,
            });
        }

        let created: CreateCallResponse = response.json().await?;
        info!(call_sid = %created.sid, "placed outbound call");
        Ok(created.sid)
    }

    async fn hangup(&self, provider_call_id: &str) -> Result<(), TelephonyError> {
        let twilio = self.config.read().await.twilio.clone();
        if !twilio.is_configured() {
            return Err(TelephonyError::NotConfigured("twilio"));
        }

        let response = self
            .http
            .post(format!(
                "{API_BASE}/Accounts/{}/Calls/{}.json",
                twilio.account_sid, provider_call_id
            ))
            .basic_auth(&twilio.account_sid, Some(&twilio.auth_token))
            .form(&[("Status", "completed")])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(TelephonyError::Api {
                provider: "twilio",
                status,
                body,
            });
        }
        Ok(())
    }
}
