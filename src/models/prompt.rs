use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A call script: system prompt for the dialogue engine, a greeting template
/// with `{name}` substitution, and the structured fields the agent should
/// collect from an interested lead.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Prompt {
    pub id: i64,
    pub name: String,
    pub system_prompt: String,
    pub greeting: Option<String>,
    pub objection_handlers: Option<serde_json::Value>,
    pub closing_script: Option<String>,
    pub data_fields: Option<serde_json::Value>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePromptRequest {
    pub name: String,
    pub system_prompt: String,
    pub greeting: Option<String>,
    pub objection_handlers: Option<serde_json::Value>,
    pub closing_script: Option<String>,
    pub data_fields: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdatePromptRequest {
    pub name: Option<String>,
    pub system_prompt: Option<String>,
    pub greeting: Option<String>,
    pub objection_handlers: Option<serde_json::Value>,
    pub closing_script: Option<String>,
    pub data_fields: Option<serde_json::Value>,
}
