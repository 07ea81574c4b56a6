//! In-memory call sessions
//!
//! One `CallSession` exists per live call, keyed by the provider's call id
//! (the id the provider echoes back in every webhook). The session carries
//! the conversation history and a phase machine that guards which webhook
//! actions are legal at any point in the call.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::warn;

use crate::server::openai::ChatMessage;

/// Hard cap on the history sent to the model. Older turns are dropped from
/// the prompt but stay persisted in call_messages.
const HISTORY_WINDOW: usize = 40;

/// Where a call currently is in its lifecycle.
///
/// ```text
/// Started -> Greeted -> AwaitingSpeech <-> Responding
///                            |
///                            v
///                       Reprompting -> AwaitingSpeech
/// (any) -> Ended
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallPhase {
    /// Provider accepted the call, greeting not yet delivered.
    Started,
    /// Greeting was spoken, first gather is running.
    Greeted,
    /// Waiting for the callee to speak.
    AwaitingSpeech,
    /// Speech received, generating and delivering the reply.
    Responding,
    /// No input was received, asking once more.
    Reprompting,
    /// Call is over. Terminal.
    Ended,
}

impl CallPhase {
    pub fn is_terminal(self) -> bool {
        self == CallPhase::Ended
    }

    /// Whether the machine may move from `self` to `next`.
    pub fn can_transition(self, next: CallPhase) -> bool {
        use CallPhase::*;
        if next == Ended {
            return self != Ended;
        }
        matches!(
            (self, next),
            (Started, Greeted)
                | (Greeted, AwaitingSpeech)
                | (Greeted, Reprompting)
                | (AwaitingSpeech, Responding)
                | (AwaitingSpeech, Reprompting)
                | (Responding, AwaitingSpeech)
                | (Reprompting, AwaitingSpeech)
                | (Reprompting, Responding)
        )
    }
}

#[derive(Debug, Clone)]
pub struct CallSession {
    pub call_id: i64,
    pub provider_call_id: String,
    pub campaign_id: Option<i64>,
    pub lead_id: Option<i64>,
    pub prompt_id: Option<i64>,
    pub phase: CallPhase,
    pub history: Vec<ChatMessage>,
    /// A no-input reprompt has already been used for this call.
    pub reprompted: bool,
    pub started_at: DateTime<Utc>,
}

impl CallSession {
    pub fn new(
        call_id: i64,
        provider_call_id: impl Into<String>,
        campaign_id: Option<i64>,
        lead_id: Option<i64>,
        prompt_id: Option<i64>,
    ) -> Self {
        Self {
            call_id,
            provider_call_id: provider_call_id.into(),
            campaign_id,
            lead_id,
            prompt_id,
            phase: CallPhase::Started,
            history: Vec::new(),
            reprompted: false,
            started_at: Utc::now(),
        }
    }

    /// History tail sent to the model, capped at the window size.
    pub fn history_window(&self) -> &[ChatMessage] {
        let skip = self.history.len().saturating_sub(HISTORY_WINDOW);
        &self.history[skip..]
    }
}

/// Concurrent map of live sessions. Cloning shares the underlying map.
#[derive(Clone, Default)]
pub struct SessionStore {
    inner: Arc<RwLock<HashMap<String, CallSession>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, session: CallSession) {
        let mut map = self.inner.write().await;
        if map
            .insert(session.provider_call_id.clone(), session)
            .is_some()
        {
            warn!("replaced existing session for provider call id");
        }
    }

    pub async fn get(&self, provider_call_id: &str) -> Option<CallSession> {
        self.inner.read().await.get(provider_call_id).cloned()
    }

    pub async fn contains(&self, provider_call_id: &str) -> bool {
        self.inner.read().await.contains_key(provider_call_id)
    }

    pub async fn active_count(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Move a session to a new phase. Illegal transitions are rejected and
    /// leave the session untouched.
    pub async fn advance(&self, provider_call_id: &str, next: CallPhase) -> bool {
        let mut map = self.inner.write().await;
        match map.get_mut(provider_call_id) {
            Some(session) if session.phase.can_transition(next) => {
                session.phase = next;
                true
            }
            Some(session) => {
                warn!(
                    from = ?session.phase,
                    to = ?next,
                    "rejected call phase transition"
                );
                false
            }
            None => false,
        }
    }

    pub async fn push_turn(&self, provider_call_id: &str, role: &str, content: &str) {
        let mut map = self.inner.write().await;
        if let Some(session) = map.get_mut(provider_call_id) {
            session.history.push(ChatMessage {
                role: role.into(),
                content: content.into(),
            });
        }
    }

    /// Mark the one allowed reprompt as used. Returns false when it was
    /// already spent, meaning the call should be wrapped up instead.
    pub async fn take_reprompt(&self, provider_call_id: &str) -> bool {
        let mut map = self.inner.write().await;
        match map.get_mut(provider_call_id) {
            Some(session) if !session.reprompted => {
                session.reprompted = true;
                true
            }
            _ => false,
        }
    }

    /// End the session and remove it from the store, returning its final
    /// state for outcome analysis.
    pub async fn end(&self, provider_call_id: &str) -> Option<CallSession> {
        let mut map = self.inner.write().await;
        map.remove(provider_call_id).map(|mut session| {
            session.phase = CallPhase::Ended;
            session
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(id: &str) -> CallSession {
        CallSession::new(1, id, Some(7), Some(9), Some(3))
    }

    #[test]
    fn phase_machine_accepts_the_happy_path() {
        use CallPhase::*;
        assert!(Started.can_transition(Greeted));
        assert!(Greeted.can_transition(AwaitingSpeech));
        assert!(AwaitingSpeech.can_transition(Responding));
        assert!(Responding.can_transition(AwaitingSpeech));
        assert!(AwaitingSpeech.can_transition(Ended));
    }

    #[test]
    fn phase_machine_rejects_skips_and_leaving_ended() {
        use CallPhase::*;
        assert!(!Started.can_transition(Responding));
        assert!(!Started.can_transition(AwaitingSpeech));
        assert!(!Responding.can_transition(Responding));
        assert!(!Ended.can_transition(AwaitingSpeech));
        assert!(!Ended.can_transition(Ended));
    }

    #[test]
    fn reprompt_can_lead_back_into_dialogue() {
        use CallPhase::*;
        assert!(Greeted.can_transition(Reprompting));
        assert!(AwaitingSpeech.can_transition(Reprompting));
        assert!(Reprompting.can_transition(AwaitingSpeech));
        assert!(Reprompting.can_transition(Responding));
        assert!(!Reprompting.can_transition(Greeted));
    }

    #[tokio::test]
    async fn sessions_are_isolated_per_call() {
        let store = SessionStore::new();
        store.insert(session("CA1")).await;
        store.insert(session("CA2")).await;

        store.push_turn("CA1", "user", "hallo").await;

        let s1 = store.get("CA1").await.unwrap();
        let s2 = store.get("CA2").await.unwrap();
        assert_eq!(s1.history.len(), 1);
        assert!(s2.history.is_empty());
        assert_eq!(store.active_count().await, 2);
    }

    #[tokio::test]
    async fn advance_enforces_the_machine() {
        let store = SessionStore::new();
        store.insert(session("CA1")).await;

        assert!(!store.advance("CA1", CallPhase::Responding).await);
        assert!(store.advance("CA1", CallPhase::Greeted).await);
        assert!(store.advance("CA1", CallPhase::AwaitingSpeech).await);
        assert_eq!(store.get("CA1").await.unwrap().phase, CallPhase::AwaitingSpeech);
    }

    #[tokio::test]
    async fn reprompt_is_single_use() {
        let store = SessionStore::new();
        store.insert(session("CA1")).await;

        assert!(store.take_reprompt("CA1").await);
        assert!(!store.take_reprompt("CA1").await);
    }

    #[tokio::test]
    async fn ending_removes_the_session() {
        let store = SessionStore::new();
        store.insert(session("CA1")).await;

        let ended = store.end("CA1").await.unwrap();
        assert_eq!(ended.phase, CallPhase::Ended);
        assert!(!store.contains("CA1").await);
        assert!(store.end("CA1").await.is_none());
    }

    #[tokio::test]
    async fn history_window_keeps_the_tail() {
        let store = SessionStore::new();
        store.insert(session("CA1")).await;
        for i in 0..50 {
            store.push_turn("CA1", "user", &format!("turn {i}")).await;
        }

        let s = store.get("CA1").await.unwrap();
        assert_eq!(s.history.len(), 50);
        let window = s.history_window();
        assert_eq!(window.len(), 40);
        assert_eq!(window[0].content, "turn 10");
        assert_eq!(window[39].content, "turn 49");
    }
}
