//! Provider configuration
//!
//! Credentials come from the environment at startup and can be overridden at
//! runtime through the settings API (current process only). Provider clients
//! hold the shared handle and read credentials per request, so a settings
//! update takes effect without a restart.

use std::env;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::models::{Settings, UpdateSettingsRequest};

pub type SharedConfig = Arc<RwLock<ProviderConfig>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TelephonyKind {
    Twilio,
    Sipgate,
    Vonage,
}

impl TelephonyKind {
    pub fn parse(s: &str) -> Self {
        match s {
            "sipgate" => TelephonyKind::Sipgate,
            "vonage" => TelephonyKind::Vonage,
            _ => TelephonyKind::Twilio,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TtsKind {
    ElevenLabs,
    Azure,
}

impl TtsKind {
    pub fn parse(s: &str) -> Self {
        match s {
            "azure" => TtsKind::Azure,
            _ => TtsKind::ElevenLabs,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TwilioConfig {
    pub account_sid: String,
    pub auth_token: String,
    pub phone_number: String,
}

impl TwilioConfig {
    pub fn is_configured(&self) -> bool {
        !self.account_sid.is_empty() && !self.auth_token.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct SipgateConfig {
    pub token_id: String,
    pub token: String,
    pub phone_number: String,
    pub device_id: String,
}

impl SipgateConfig {
    pub fn is_configured(&self) -> bool {
        !self.token_id.is_empty() && !self.token.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct VonageConfig {
    pub api_key: String,
    pub api_secret: String,
    pub application_id: String,
    pub private_key: String,
    pub phone_number: String,
}

impl VonageConfig {
    pub fn is_configured(&self) -> bool {
        !self.application_id.is_empty() && !self.private_key.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ElevenLabsConfig {
    pub api_key: String,
    pub voice_id: String,
}

#[derive(Debug, Clone, Default)]
pub struct AzureSpeechConfig {
    pub key: String,
    pub region: String,
    pub voice_id: String,
}

#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub telephony: TelephonyKind,
    pub twilio: TwilioConfig,
    pub sipgate: SipgateConfig,
    pub vonage: VonageConfig,
    pub tts: TtsKind,
    pub elevenlabs: ElevenLabsConfig,
    pub azure: AzureSpeechConfig,
    pub openai_api_key: String,
    pub openai_model: String,
    /// Public base URL the telephony provider uses to reach our webhooks.
    pub webhook_base_url: String,
    pub audio_dir: String,
    pub max_concurrent_calls: usize,
}

impl ProviderConfig {
    pub fn from_env() -> Self {
        let var = |key: &str| env::var(key).unwrap_or_default();

        Self {
            telephony: TelephonyKind::parse(&var("TELEPHONY_PROVIDER")),
            twilio: TwilioConfig {
                account_sid: var("TWILIO_ACCOUNT_SID"),
                auth_token: var("TWILIO_AUTH_TOKEN"),
                phone_number: var("TWILIO_PHONE_NUMBER"),
            },
            sipgate: SipgateConfig {
                token_id: var("SIPGATE_TOKEN_ID"),
                token: var("SIPGATE_TOKEN"),
                phone_number: var("SIPGATE_PHONE_NUMBER"),
                device_id: env::var("SIPGATE_DEVICE_ID").unwrap_or_else(|_| "p0".into()),
            },
            vonage: VonageConfig {
                api_key: var("VONAGE_API_KEY"),
                api_secret: var("VONAGE_API_SECRET"),
                application_id: var("VONAGE_APPLICATION_ID"),
                private_key: var("VONAGE_PRIVATE_KEY"),
                phone_number: var("VONAGE_PHONE_NUMBER"),
            },
            tts: TtsKind::parse(&var("TTS_PROVIDER")),
            elevenlabs: ElevenLabsConfig {
                api_key: var("ELEVENLABS_API_KEY"),
                voice_id: env::var("ELEVENLABS_VOICE_ID")
                    .unwrap_or_else(|_| "pNInz6obpgDQGcFmaJgB".into()),
            },
            azure: AzureSpeechConfig {
                key: var("AZURE_SPEECH_KEY"),
                region: env::var("AZURE_SPEECH_REGION")
                    .unwrap_or_else(|_| "germanywestcentral".into()),
                voice_id: env::var("AZURE_VOICE_ID")
                    .unwrap_or_else(|_| "de-DE-ConradNeural".into()),
            },
            openai_api_key: var("OPENAI_API_KEY"),
            openai_model: env::var("OPENAI_MODEL").unwrap_or_else(|_| "gpt-4-turbo-preview".into()),
            webhook_base_url: var("WEBHOOK_BASE_URL"),
            audio_dir: env::var("AUDIO_DIR").unwrap_or_else(|_| "./audio".into()),
            max_concurrent_calls: env::var("MAX_CONCURRENT_CALLS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(5),
        }
    }

    /// Apply a saved settings row on top of the current configuration.
    /// Empty/None fields leave the existing value untouched.
    pub fn apply_settings(&mut self, settings: &Settings) {
        self.telephony = TelephonyKind::parse(&settings.telephony_provider);
        self.tts = TtsKind::parse(&settings.tts_provider);

        let set = |target: &mut String, value: &Option<String>| {
            if let Some(v) = value {
                if !v.is_empty() {
                    *target = v.clone();
                }
            }
        };

        set(&mut self.twilio.account_sid, &settings.twilio_account_sid);
        set(&mut self.twilio.auth_token, &settings.twilio_auth_token);
        set(&mut self.twilio.phone_number, &settings.twilio_phone_number);
        set(&mut self.sipgate.token_id, &settings.sipgate_token_id);
        set(&mut self.sipgate.token, &settings.sipgate_token);
        set(&mut self.sipgate.phone_number, &settings.sipgate_phone_number);
        set(&mut self.sipgate.device_id, &settings.sipgate_device_id);
        set(&mut self.vonage.api_key, &settings.vonage_api_key);
        set(&mut self.vonage.api_secret, &settings.vonage_api_secret);
        set(&mut self.vonage.application_id, &settings.vonage_application_id);
        set(&mut self.vonage.private_key, &settings.vonage_private_key);
        set(&mut self.vonage.phone_number, &settings.vonage_phone_number);
        set(&mut self.elevenlabs.api_key, &settings.elevenlabs_api_key);
        set(&mut self.elevenlabs.voice_id, &settings.elevenlabs_voice_id);
        set(&mut self.azure.key, &settings.azure_speech_key);
        set(&mut self.azure.region, &settings.azure_speech_region);
        set(&mut self.azure.voice_id, &settings.azure_voice_id);
        set(&mut self.openai_api_key, &settings.openai_api_key);
        set(&mut self.openai_model, &settings.openai_model);
    }

    /// Apply a settings update request directly (used right after a PUT so
    /// the running process picks the new credentials up immediately).
    pub fn apply_update(&mut self, req: &UpdateSettingsRequest) {
        if let Some(p) = &req.telephony_provider {
            self.telephony = TelephonyKind::parse(p);
        }
        if let Some(p) = &req.tts_provider {
            self.tts = TtsKind::parse(p);
        }

        let set = |target: &mut String, value: &Option<String>| {
            if let Some(v) = value {
                if !v.is_empty() {
                    *target = v.clone();
                }
            }
        };

        set(&mut self.twilio.account_sid, &req.twilio_account_sid);
        set(&mut self.twilio.auth_token, &req.twilio_auth_token);
        set(&mut self.twilio.phone_number, &req.twilio_phone_number);
        set(&mut self.sipgate.token_id, &req.sipgate_token_id);
        set(&mut self.sipgate.token, &req.sipgate_token);
        set(&mut self.sipgate.phone_number, &req.sipgate_phone_number);
        set(&mut self.sipgate.device_id, &req.sipgate_device_id);
        set(&mut self.vonage.api_key, &req.vonage_api_key);
        set(&mut self.vonage.api_secret, &req.vonage_api_secret);
        set(&mut self.vonage.application_id, &req.vonage_application_id);
        set(&mut self.vonage.private_key, &req.vonage_private_key);
        set(&mut self.vonage.phone_number, &req.vonage_phone_number);
        set(&mut self.elevenlabs.api_key, &req.elevenlabs_api_key);
        set(&mut self.elevenlabs.voice_id, &req.elevenlabs_voice_id);
        set(&mut self.azure.key, &req.azure_speech_key);
        set(&mut self.azure.region, &req.azure_speech_region);
        set(&mut self.azure.voice_id, &req.azure_voice_id);
        set(&mut self.openai_api_key, &req.openai_api_key);
        set(&mut self.openai_model, &req.openai_model);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_kind_parsing_defaults_to_twilio() {
        assert_eq!(TelephonyKind::parse("sipgate"), TelephonyKind::Sipgate);
        assert_eq!(TelephonyKind::parse("vonage"), TelephonyKind::Vonage);
        assert_eq!(TelephonyKind::parse("whatever"), TelephonyKind::Twilio);
        assert_eq!(TtsKind::parse("azure"), TtsKind::Azure);
        assert_eq!(TtsKind::parse(""), TtsKind::ElevenLabs);
    }

    #[test]
    fn update_request_overrides_only_set_fields() {
        let mut config = ProviderConfig::from_env();
        config.twilio.account_sid = "AC_old".into();
        config.twilio.auth_token = "tok_old".into();

        let req = UpdateSettingsRequest {
            twilio_account_sid: Some("AC_new".into()),
            twilio_auth_token: Some(String::new()),
            ..Default::default()
        };
        config.apply_update(&req);

        assert_eq!(config.twilio.account_sid, "AC_new");
        assert_eq!(config.twilio.auth_token, "tok_old");
    }
}
