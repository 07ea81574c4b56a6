use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-user provider credential row. Values stored here override the
/// environment for the current process once saved (not distributed to
/// other instances).
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Settings {
    pub id: i64,
    pub user_id: Option<i64>,
    pub telephony_provider: String,
    pub twilio_account_sid: Option<String>,
    pub twilio_auth_token: Option<String>,
    pub twilio_phone_number: Option<String>,
    pub sipgate_token_id: Option<String>,
    pub sipgate_token: Option<String>,
    pub sipgate_phone_number: Option<String>,
    pub sipgate_device_id: Option<String>,
    pub vonage_api_key: Option<String>,
    pub vonage_api_secret: Option<String>,
    pub vonage_application_id: Option<String>,
    pub vonage_private_key: Option<String>,
    pub vonage_phone_number: Option<String>,
    pub tts_provider: String,
    pub elevenlabs_api_key: Option<String>,
    pub elevenlabs_voice_id: Option<String>,
    pub azure_speech_key: Option<String>,
    pub azure_speech_region: Option<String>,
    pub azure_voice_id: Option<String>,
    pub openai_api_key: Option<String>,
    pub openai_model: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct UpdateSettingsRequest {
    pub telephony_provider: Option<String>,
    pub twilio_account_sid: Option<String>,
    pub twilio_auth_token: Option<String>,
    pub twilio_phone_number: Option<String>,
    pub sipgate_token_id: Option<String>,
    pub sipgate_token: Option<String>,
    pub sipgate_phone_number: Option<String>,
    pub sipgate_device_id: Option<String>,
    pub vonage_api_key: Option<String>,
    pub vonage_api_secret: Option<String>,
    pub vonage_application_id: Option<String>,
    pub vonage_private_key: Option<String>,
    pub vonage_phone_number: Option<String>,
    pub tts_provider: Option<String>,
    pub elevenlabs_api_key: Option<String>,
    pub elevenlabs_voice_id: Option<String>,
    pub azure_speech_key: Option<String>,
    pub azure_speech_region: Option<String>,
    pub azure_voice_id: Option<String>,
    pub openai_api_key: Option<String>,
    pub openai_model: Option<String>,
}
