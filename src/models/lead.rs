use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::Outcome;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, sqlx::FromRow)]
pub struct Lead {
    pub id: i64,
    pub campaign_id: Option<i64>,
    pub phone: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub company: Option<String>,
    pub extra_data: Option<serde_json::Value>,
    pub status: LeadStatus,
    pub created_at: Option<DateTime<Utc>>,
}

/// Lead lifecycle. Pending leads are picked up by the dialer; once a call
/// completes the classified outcome label is copied onto the lead.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "lead_status", rename_all = "snake_case")]
pub enum LeadStatus {
    Pending,
    Calling,
    Completed,
    Failed,
    Interested,
    NotInterested,
    Callback,
    WrongNumber,
    Voicemail,
    NoAnswer,
    Unknown,
}

impl From<Outcome> for LeadStatus {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Interested => LeadStatus::Interested,
            Outcome::NotInterested => LeadStatus::NotInterested,
            Outcome::Callback => LeadStatus::Callback,
            Outcome::WrongNumber => LeadStatus::WrongNumber,
            Outcome::Voicemail => LeadStatus::Voicemail,
            Outcome::NoAnswer => LeadStatus::NoAnswer,
            Outcome::Unknown => LeadStatus::Unknown,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateLeadRequest {
    pub phone: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub company: Option<String>,
    pub extra_data: Option<serde_json::Value>,
    pub campaign_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportLeadsRequest {
    pub leads: Vec<CreateLeadRequest>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ImportLeadsResponse {
    pub imported: u64,
    pub skipped: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateLeadStatusRequest {
    pub status: LeadStatus,
}

/// Normalize a phone number to E.164-ish form: strip separators, map a
/// leading "00" to "+" and a bare leading "0" to the German country code.
pub fn normalize_phone(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '+')
        .collect();

    if let Some(rest) = cleaned.strip_prefix("00") {
        format!("+{rest}")
    } else if cleaned.starts_with('+') {
        cleaned
    } else if let Some(rest) = cleaned.strip_prefix('0') {
        format!("+49{rest}")
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_german_local_numbers() {
        assert_eq!(normalize_phone("0171 234 5678"), "+491712345678");
        assert_eq!(normalize_phone("0049 171 2345678"), "+491712345678");
        assert_eq!(normalize_phone("+49 (171) 234-5678"), "+491712345678");
    }

    #[test]
    fn leaves_international_numbers_alone() {
        assert_eq!(normalize_phone("+14155552671"), "+14155552671");
    }

    #[test]
    fn outcome_maps_onto_lead_status() {
        assert_eq!(LeadStatus::from(Outcome::Interested), LeadStatus::Interested);
        assert_eq!(LeadStatus::from(Outcome::Unknown), LeadStatus::Unknown);
    }
}
