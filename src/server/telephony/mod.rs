//! Telephony providers
//!
//! One trait, three backends. The active backend is chosen from the shared
//! config at call time, so switching providers through the settings API
//! affects the next dialed call without a restart.

pub mod sipgate;
pub mod twilio;
pub mod twiml;
pub mod vonage;

use async_trait::async_trait;
use thiserror::Error;

use crate::server::config::{SharedConfig, TelephonyKind};

#[derive(Error, Debug)]
pub enum TelephonyError {
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
    #[error("signing call token failed: {0}")]
    Token(#[from] jsonwebtoken::errors::Error),
}

/// An outbound calling backend. `place_call` returns the provider's call id,
/// which keys all subsequent webhooks for that call.
#[async_trait]
pub trait TelephonyProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn place_call(&self, to: &str) -> Result<String, TelephonyError>;

    async fn hangup(&self, provider_call_id: &str) -> Result<(), TelephonyError>;
}

/// Dispatches to the provider currently selected in the config.
#[derive(Clone)]
pub struct Telephony {
    config: SharedConfig,
    twilio: twilio::TwilioClient,
    sipgate: sipgate::SipgateClient,
    vonage: vonage::VonageClient,
}

impl Telephony {
    pub fn new(config: SharedConfig) -> Self {
        Self {
            twilio: twilio::TwilioClient::new(config.clone()),
            sipgate: sipgate::SipgateClient::new(config.clone()),
            vonage: vonage::VonageClient::new(config.clone()),
            config,
        }
    }

    async fn current(&self) -> &dyn TelephonyProvider {
        match self.config.read().await.telephony {
            TelephonyKind::Twilio => &self.twilio,
            TelephonyKind::Sipgate => &self.sipgate,
            TelephonyKind::Vonage => &self.vonage,
        }
    }

    pub async fn provider_name(&self) -> &'static str {
        self.current().await.name()
    }

    pub async fn place_call(&self, to: &str) -> Result<String, TelephonyError> {
        self.current().await.place_call(to).await
    }

    pub async fn hangup(&self, provider_call_id: &str) -> Result<(), TelephonyError> {
        self.current().await.hangup(provider_call_id).await
    }
}
