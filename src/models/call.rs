use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Call {
    pub id: i64,
    pub lead_id: Option<i64>,
    pub campaign_id: Option<i64>,
    pub provider: Option<String>,
    pub provider_call_id: Option<String>,
    pub status: CallStatus,
    pub direction: CallDirection,
    pub duration: Option<i32>,
    pub recording_url: Option<String>,
    pub transcript: Option<String>,
    pub outcome: Option<String>,
    pub collected_data: Option<serde_json::Value>,
    pub ai_summary: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
}

/// Call row joined with lead and campaign names for list views.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CallWithNames {
    #[sqlx(flatten)]
    #[serde(flatten)]
    pub call: Call,
    pub lead_name: Option<String>,
    pub lead_phone: Option<String>,
    pub campaign_name: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "call_direction", rename_all = "snake_case")]
pub enum CallDirection {
    Inbound,
    Outbound,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "call_status", rename_all = "snake_case")]
pub enum CallStatus {
    Queued,
    Initiated,
    Ringing,
    InProgress,
    Completed,
    Failed,
    Busy,
    NoAnswer,
    Voicemail,
    Canceled,
}

impl CallStatus {
    /// Map a provider status callback string (Twilio uses kebab-case) onto
    /// our lifecycle. Unknown strings map to None so callers can ignore them.
    pub fn from_provider(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(CallStatus::Queued),
            "initiated" => Some(CallStatus::Initiated),
            "ringing" => Some(CallStatus::Ringing),
            "in-progress" | "in_progress" | "answered" => Some(CallStatus::InProgress),
            "completed" => Some(CallStatus::Completed),
            "failed" => Some(CallStatus::Failed),
            "busy" => Some(CallStatus::Busy),
            "no-answer" | "no_answer" => Some(CallStatus::NoAnswer),
            "voicemail" => Some(CallStatus::Voicemail),
            "canceled" | "cancelled" => Some(CallStatus::Canceled),
            _ => None,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(
            self,
            CallStatus::Queued | CallStatus::Initiated | CallStatus::Ringing | CallStatus::InProgress
        )
    }

    /// Terminal states are absorbing; no webhook may move a call out of one.
    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }
}

/// Ordered transcript row, append-only per call.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct CallMessage {
    pub id: i64,
    pub call_id: i64,
    pub role: String,
    pub content: String,
    pub created_at: Option<DateTime<Utc>>,
}

/// Classified result of a completed call.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Interested,
    NotInterested,
    Callback,
    WrongNumber,
    Voicemail,
    NoAnswer,
    #[default]
    Unknown,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Interested => "interested",
            Outcome::NotInterested => "not_interested",
            Outcome::Callback => "callback",
            Outcome::WrongNumber => "wrong_number",
            Outcome::Voicemail => "voicemail",
            Outcome::NoAnswer => "no_answer",
            Outcome::Unknown => "unknown",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_status_mapping() {
        assert_eq!(CallStatus::from_provider("in-progress"), Some(CallStatus::InProgress));
        assert_eq!(CallStatus::from_provider("no-answer"), Some(CallStatus::NoAnswer));
        assert_eq!(CallStatus::from_provider("ringing"), Some(CallStatus::Ringing));
        assert_eq!(CallStatus::from_provider("gibberish"), None);
    }

    #[test]
    fn terminal_states_are_not_active() {
        for status in [
            CallStatus::Completed,
            CallStatus::Failed,
            CallStatus::Busy,
            CallStatus::NoAnswer,
            CallStatus::Voicemail,
            CallStatus::Canceled,
        ] {
            assert!(status.is_terminal());
            assert!(!status.is_active());
        }
        assert!(CallStatus::Ringing.is_active());
    }

    #[test]
    fn outcome_serializes_snake_case() {
        let json = serde_json::to_string(&Outcome::NotInterested).unwrap();
        assert_eq!(json, "\"not_interested\"");
        let parsed: Outcome = serde_json::from_str("\"wrong_number\"").unwrap();
        assert_eq!(parsed, Outcome::WrongNumber);
    }
}
