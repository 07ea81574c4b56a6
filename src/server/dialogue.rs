//! Dialogue engine
//!
//! Drives the conversation on a live call: builds the greeting, generates
//! turn-by-turn replies from the session history, and classifies the outcome
//! once the call ends. Every spoken turn is persisted to call_messages as it
//! happens so a crashed call still leaves a transcript behind.

use serde::Deserialize;
use sqlx::PgPool;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::models::{Outcome, Prompt};
use crate::server::db;
use crate::server::openai::{ChatMessage, OpenAiClient, OpenAiError};
use crate::server::session::{CallPhase, CallSession, SessionStore};

const REPLY_MAX_TOKENS: u32 = 150;
const REPLY_TEMPERATURE: f32 = 0.7;
const ANALYSIS_MAX_TOKENS: u32 = 300;
const ANALYSIS_TEMPERATURE: f32 = 0.3;

/// Fallback script used when a campaign has no prompt attached.
pub const DEFAULT_SYSTEM_PROMPT: &str = "Du bist ein freundlicher Vertriebsmitarbeiter \
eines Solaranlagen-Anbieters. Du rufst Hausbesitzer an, um ihr Interesse an einer \
Photovoltaik-Anlage zu ermitteln. Stelle dich kurz vor, erklaere den Anlass des Anrufs \
und finde heraus, ob Interesse an einem unverbindlichen Beratungstermin besteht. \
Halte deine Antworten kurz und natuerlich, maximal zwei bis drei Saetze. Sei hoeflich \
und draenge nicht. Wenn kein Interesse besteht, bedanke dich und beende das Gespraech.";

const DEFAULT_GREETING: &str =
    "Guten Tag{name}, hier ist der automatische Assistent der Sonnenkraft GmbH. \
     Haben Sie einen kurzen Moment Zeit?";

#[derive(Error, Debug)]
pub enum DialogueError {
    #[error("no session for call")]
    NoSession,
    #[error("call is not accepting dialogue in its current phase")]
    WrongPhase,
    #[error(transparent)]
    OpenAi(#[from] OpenAiError),
    #[error(transparent)]
    Db(#[from] sqlx::Error),
}

/// Structured verdict the analysis prompt asks the model to return.
#[derive(Debug, Deserialize)]
struct AnalysisVerdict {
    outcome: Outcome,
    #[serde(default)]
    summary: Option<String>,
    #[serde(default)]
    collected_data: Option<serde_json::Value>,
}

#[derive(Debug, Clone)]
pub struct ConversationAnalysis {
    pub outcome: Outcome,
    pub summary: Option<String>,
    pub collected_data: Option<serde_json::Value>,
}

#[derive(Clone)]
pub struct DialogueEngine {
    db: PgPool,
    openai: OpenAiClient,
    sessions: SessionStore,
}

impl DialogueEngine {
    pub fn new(db: PgPool, openai: OpenAiClient, sessions: SessionStore) -> Self {
        Self { db, openai, sessions }
    }

    /// Render the opening line for a call, substituting `{name}` with the
    /// lead's name when one is known.
    pub fn greeting(prompt: Option<&Prompt>, lead_name: Option<&str>) -> String {
        let template = prompt
            .and_then(|p| p.greeting.as_deref())
            .unwrap_or(DEFAULT_GREETING);
        let name = match lead_name {
            Some(n) if !n.is_empty() => format!(" {n}"),
            _ => String::new(),
        };
        template.replace("{name}", &name)
    }

    pub fn system_prompt(prompt: Option<&Prompt>) -> String {
        let mut text = prompt
            .map(|p| p.system_prompt.clone())
            .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string());
        if let Some(fields) = prompt.and_then(|p| p.data_fields.as_ref()) {
            text.push_str(
                "\n\nWenn der Kunde Interesse zeigt, erfrage folgende Angaben: ",
            );
            text.push_str(&fields.to_string());
        }
        text
    }

    /// Record the greeting as the first assistant turn of the session.
    pub async fn record_greeting(
        &self,
        provider_call_id: &str,
        greeting: &str,
    ) -> Result<(), DialogueError> {
        let session = self
            .sessions
            .get(provider_call_id)
            .await
            .ok_or(DialogueError::NoSession)?;

        self.sessions
            .push_turn(provider_call_id, "assistant", greeting)
            .await;
        db::messages::insert(&self.db, session.call_id, "assistant", greeting).await?;
        Ok(())
    }

    /// Generate the next reply for the callee's utterance. Persists both
    /// turns and returns the text to speak.
    pub async fn generate_response(
        &self,
        provider_call_id: &str,
        user_input: &str,
        system_prompt: &str,
    ) -> Result<String, DialogueError> {
        let session = self
            .sessions
            .get(provider_call_id)
            .await
            .ok_or(DialogueError::NoSession)?;
        if !self
            .sessions
            .advance(provider_call_id, CallPhase::Responding)
            .await
        {
            return Err(DialogueError::WrongPhase);
        }

        self.sessions
            .push_turn(provider_call_id, "user", user_input)
            .await;
        db::messages::insert(&self.db, session.call_id, "user", user_input).await?;

        // Re-read to include the turn just pushed.
        let session = self
            .sessions
            .get(provider_call_id)
            .await
            .ok_or(DialogueError::NoSession)?;

        let mut messages = vec![ChatMessage::system(system_prompt)];
        messages.extend_from_slice(session.history_window());

        let reply = self
            .openai
            .chat(&messages, REPLY_MAX_TOKENS, REPLY_TEMPERATURE)
            .await?;

        self.sessions
            .push_turn(provider_call_id, "assistant", &reply)
            .await;
        db::messages::insert(&self.db, session.call_id, "assistant", &reply).await?;
        self.sessions
            .advance(provider_call_id, CallPhase::AwaitingSpeech)
            .await;

        info!(call_id = session.call_id, "generated dialogue turn");
        Ok(reply)
    }

    /// Classify a finished conversation. Calls with no user input are
    /// no-answers without consulting the model; otherwise the model returns
    /// a JSON verdict, with `unknown` as the fallback when it does not.
    pub async fn analyze_conversation(&self, session: &CallSession) -> ConversationAnalysis {
        let had_user_turns = session.history.iter().any(|m| m.role == "user");
        if !had_user_turns {
            return ConversationAnalysis {
                outcome: Outcome::NoAnswer,
                summary: Some("Kein Gespraech zustande gekommen.".into()),
                collected_data: None,
            };
        }

        let transcript = session
            .history
            .iter()
            .map(|m| format!("{}: {}", m.role, m.content))
            .collect::<Vec<_>>()
            .join("\n");

        let messages = vec![
            ChatMessage::system(
                "Du analysierst das Transkript eines Vertriebsanrufs. Antworte \
                 ausschliesslich mit einem JSON-Objekt der Form \
                 {\"outcome\": \"interested\" | \"not_interested\" | \"callback\" | \
                 \"wrong_number\" | \"voicemail\" | \"no_answer\" | \"unknown\", \
                 \"summary\": \"ein bis zwei Saetze\", \
                 \"collected_data\": { ... vom Kunden genannte Angaben ... }}",
            ),
            ChatMessage::user(transcript),
        ];

        match self
            .openai
            .chat(&messages, ANALYSIS_MAX_TOKENS, ANALYSIS_TEMPERATURE)
            .await
        {
            Ok(raw) => Self::parse_verdict(&raw),
            Err(err) => {
                error!(error = %err, "conversation analysis request failed");
                ConversationAnalysis {
                    outcome: Outcome::Unknown,
                    summary: None,
                    collected_data: None,
                }
            }
        }
    }

    /// Parse the model's verdict, tolerating code fences and prose around
    /// the JSON object. Unparseable output degrades to `unknown` with the
    /// raw text kept as the summary.
    fn parse_verdict(raw: &str) -> ConversationAnalysis {
        let trimmed = raw.trim();
        let json_slice = match (trimmed.find('{'), trimmed.rfind('}')) {
            (Some(start), Some(end)) if end > start => &trimmed[start..=end],
            _ => trimmed,
        };

        match serde_json::from_str::<AnalysisVerdict>(json_slice) {
            Ok(verdict) => ConversationAnalysis {
                outcome: verdict.outcome,
                summary: verdict.summary,
                collected_data: verdict.collected_data,
            },
            Err(err) => {
                warn!(error = %err, "analysis verdict was not valid JSON");
                ConversationAnalysis {
                    outcome: Outcome::Unknown,
                    summary: Some(trimmed.to_string()),
                    collected_data: None,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prompt_with_greeting(greeting: &str) -> Prompt {
        Prompt {
            id: 1,
            name: "test".into(),
            system_prompt: "sys".into(),
            greeting: Some(greeting.into()),
            objection_handlers: None,
            closing_script: None,
            data_fields: None,
            created_at: None,
            updated_at: None,
        }
    }

    #[test]
    fn greeting_substitutes_the_lead_name() {
        let p = prompt_with_greeting("Guten Tag{name}, hier spricht Anna.");
        let rendered = DialogueEngine::greeting(Some(&p), Some("Herr Meier"));
        assert_eq!(rendered, "Guten Tag Herr Meier, hier spricht Anna.");
    }

    #[test]
    fn greeting_drops_the_placeholder_without_a_name() {
        let p = prompt_with_greeting("Guten Tag{name}!");
        assert_eq!(DialogueEngine::greeting(Some(&p), None), "Guten Tag!");
        assert_eq!(DialogueEngine::greeting(Some(&p), Some("")), "Guten Tag!");
    }

    #[test]
    fn missing_prompt_uses_the_default_script() {
        let greeting = DialogueEngine::greeting(None, Some("Frau Braun"));
        assert!(greeting.contains("Frau Braun"));
        assert!(DialogueEngine::system_prompt(None).contains("Photovoltaik"));
    }

    #[test]
    fn verdict_parsing_handles_clean_json() {
        let analysis = DialogueEngine::parse_verdict(
            r#"{"outcome": "interested", "summary": "Termin gewuenscht.", "collected_data": {"roof": "Satteldach"}}"#,
        );
        assert_eq!(analysis.outcome, Outcome::Interested);
        assert_eq!(analysis.summary.as_deref(), Some("Termin gewuenscht."));
        assert!(analysis.collected_data.is_some());
    }

    #[test]
    fn verdict_parsing_strips_code_fences() {
        let analysis = DialogueEngine::parse_verdict(
            "```json\n{\"outcome\": \"not_interested\"}\n```",
        );
        assert_eq!(analysis.outcome, Outcome::NotInterested);
    }

    #[test]
    fn garbage_verdict_degrades_to_unknown() {
        let analysis = DialogueEngine::parse_verdict("Der Kunde war interessiert.");
        assert_eq!(analysis.outcome, Outcome::Unknown);
        assert_eq!(
            analysis.summary.as_deref(),
            Some("Der Kunde war interessiert.")
        );
    }
}
