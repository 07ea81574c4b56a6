//! Voice webhooks
//!
//! Twilio-shaped form callbacks that drive a live call. Handlers always
//! answer 200: a persistence failure mid-call is logged but never surfaced
//! to the provider, because failing the webhook would drop the call.

use axum::extract::State;
use axum::http::header;
use axum::response::{IntoResponse, Response};
use axum::Form;
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info, warn};

use crate::models::{normalize_phone, CallDirection, CallStatus, Lead, LeadStatus, Outcome};
use crate::server::db;
use crate::server::dialogue::DialogueEngine;
use crate::server::session::{CallPhase, CallSession};
use crate::server::telephony::twiml::{self, Verb, VoiceResponse};
use crate::server::AppState;

const APOLOGY: &str =
    "Entschuldigung, es ist ein technisches Problem aufgetreten. Auf Wiederhoeren.";
const REPROMPT: &str = "Sind Sie noch dran? Ich habe Sie leider nicht verstanden.";
const GOODBYE: &str = "Vielen Dank fuer Ihre Zeit. Auf Wiederhoeren.";

/// Twilio posts call events as PascalCase form fields.
#[derive(Debug, Deserialize)]
pub struct TwilioPayload {
    #[serde(rename = "CallSid")]
    pub call_sid: String,
    #[serde(rename = "From")]
    pub from: Option<String>,
    #[serde(rename = "CallStatus")]
    pub call_status: Option<String>,
    #[serde(rename = "CallDuration")]
    pub call_duration: Option<String>,
    #[serde(rename = "SpeechResult")]
    pub speech_result: Option<String>,
    #[serde(rename = "RecordingUrl")]
    pub recording_url: Option<String>,
    #[serde(rename = "AnsweredBy")]
    pub answered_by: Option<String>,
}

fn xml(body: String) -> Response {
    ([(header::CONTENT_TYPE, "application/xml")], body).into_response()
}

fn respond(verbs: Vec<Verb>) -> Response {
    xml(twiml::render(VoiceResponse { verbs }))
}

fn apology() -> Response {
    respond(vec![twiml::say(APOLOGY, "de-DE"), twiml::hangup()])
}

/// Synthesize `text` into a Play verb, falling back to provider-side Say
/// when the TTS backend is unavailable.
async fn spoken(state: &AppState, text: &str, language: &str) -> Verb {
    match state.speech.speak(text, language).await {
        Ok(clip) => twiml::play(&clip.url),
        Err(err) => {
            warn!(error = %err, "speech synthesis failed, falling back to Say");
            twiml::say(text, language)
        }
    }
}

async fn call_language(state: &AppState, campaign_id: Option<i64>) -> String {
    if let Some(id) = campaign_id {
        if let Ok(Some(campaign)) = db::campaigns::get(&state.db, id).await {
            return campaign.language;
        }
    }
    "de-DE".into()
}

/// Answer webhook: greet the lead and open the first speech gather.
pub async fn voice(State(state): State<AppState>, Form(payload): Form<TwilioPayload>) -> Response {
    let Some(session) = state.sessions.get(&payload.call_sid).await else {
        warn!(call_sid = %payload.call_sid, "voice webhook for unknown call");
        return apology();
    };

    let prompt = match session.prompt_id {
        Some(id) => db::prompts::get(&state.db, id).await.ok().flatten(),
        None => None,
    };
    let lead = match session.lead_id {
        Some(id) => db::leads::get(&state.db, id).await.ok().flatten(),
        None => None,
    };

    let greeting = DialogueEngine::greeting(prompt.as_ref(), lead.as_ref().and_then(|l| l.name.as_deref()));
    if let Err(err) = state.dialogue.record_greeting(&payload.call_sid, &greeting).await {
        error!(call_sid = %payload.call_sid, error = %err, "failed to record greeting");
        return apology();
    }
    state.sessions.advance(&payload.call_sid, CallPhase::Greeted).await;
    state.sessions.advance(&payload.call_sid, CallPhase::AwaitingSpeech).await;

    let language = call_language(&state, session.campaign_id).await;
    let utterance = spoken(&state, &greeting, &language).await;
    respond(vec![
        twiml::gather_with_speech("/webhooks/twilio/gather", &language, utterance),
        Verb::Redirect(twiml::Redirect {
            url: "/webhooks/twilio/no-input".into(),
            method: Some("POST".into()),
        }),
    ])
}

/// Speech gather result: run the dialogue engine and speak the reply.
pub async fn gather(State(state): State<AppState>, Form(payload): Form<TwilioPayload>) -> Response {
    let speech = payload.speech_result.as_deref().unwrap_or("").trim().to_string();
    if speech.is_empty() {
        return no_input(State(state), Form(payload)).await;
    }

    let Some(session) = state.sessions.get(&payload.call_sid).await else {
        warn!(call_sid = %payload.call_sid, "gather webhook for unknown call");
        return apology();
    };

    let prompt = match session.prompt_id {
        Some(id) => db::prompts::get(&state.db, id).await.ok().flatten(),
        None => None,
    };
    let system_prompt = DialogueEngine::system_prompt(prompt.as_ref());

    let reply = match state
        .dialogue
        .generate_response(&payload.call_sid, &speech, &system_prompt)
        .await
    {
        Ok(reply) => reply,
        Err(err) => {
            error!(call_sid = %payload.call_sid, error = %err, "dialogue turn failed");
            return apology();
        }
    };

    state.events.broadcast(
        "call_message",
        json!({
            "call_id": session.call_id,
            "user": speech,
            "assistant": reply,
        }),
    );

    let language = call_language(&state, session.campaign_id).await;
    let utterance = spoken(&state, &reply, &language).await;
    respond(vec![
        twiml::gather_with_speech("/webhooks/twilio/gather", &language, utterance),
        Verb::Redirect(twiml::Redirect {
            url: "/webhooks/twilio/no-input".into(),
            method: Some("POST".into()),
        }),
    ])
}

/// Gather timed out without speech. One reprompt per call, then goodbye.
pub async fn no_input(
    State(state): State<AppState>,
    Form(payload): Form<TwilioPayload>,
) -> Response {
    let Some(session) = state.sessions.get(&payload.call_sid).await else {
        return respond(vec![twiml::hangup()]);
    };
    let language = call_language(&state, session.campaign_id).await;

    if state.sessions.take_reprompt(&payload.call_sid).await {
        state.sessions.advance(&payload.call_sid, CallPhase::Reprompting).await;
        state.sessions.advance(&payload.call_sid, CallPhase::AwaitingSpeech).await;
        let utterance = spoken(&state, REPROMPT, &language).await;
        respond(vec![
            twiml::gather_with_speech("/webhooks/twilio/gather", &language, utterance),
            Verb::Redirect(twiml::Redirect {
                url: "/webhooks/twilio/no-input".into(),
                method: Some("POST".into()),
            }),
        ])
    } else {
        let utterance = spoken(&state, GOODBYE, &language).await;
        respond(vec![utterance, twiml::hangup()])
    }
}

/// Call status callback. Terminal statuses close the call out, run outcome
/// analysis, and update the lead.
pub async fn status(State(state): State<AppState>, Form(payload): Form<TwilioPayload>) -> Response {
    let Some(status) = payload
        .call_status
        .as_deref()
        .and_then(CallStatus::from_provider)
    else {
        return ().into_response();
    };

    let duration = payload.call_duration.as_deref().and_then(|d| d.parse().ok());

    let call = if status.is_terminal() {
        db::calls::finish(&state.db, &payload.call_sid, status, duration).await
    } else {
        db::calls::set_status(&state.db, &payload.call_sid, status).await
    };
    let call = match call {
        Ok(call) => call,
        Err(err) => {
            error!(call_sid = %payload.call_sid, error = %err, "failed to persist call status");
            None
        }
    };

    if let Some(call) = &call {
        state.events.broadcast(
            "call_status",
            json!({ "call_id": call.id, "status": status }),
        );
    }

    if status.is_terminal() {
        finalize_call(&state, &payload.call_sid, status).await;
    }
    ().into_response()
}

async fn finalize_call(state: &AppState, call_sid: &str, status: CallStatus) {
    let Some(session) = state.sessions.end(call_sid).await else {
        settle_without_session(state, call_sid, status).await;
        return;
    };
    info!(call_id = session.call_id, ?status, "call ended");

    let (outcome, summary, collected) = if status == CallStatus::Completed {
        let analysis = state.dialogue.analyze_conversation(&session).await;
        (analysis.outcome, analysis.summary, analysis.collected_data)
    } else {
        let outcome = match status {
            CallStatus::Busy | CallStatus::NoAnswer => Outcome::NoAnswer,
            CallStatus::Voicemail => Outcome::Voicemail,
            _ => Outcome::Unknown,
        };
        (outcome, None, None)
    };

    if let Err(err) = db::calls::set_outcome(
        &state.db,
        session.call_id,
        outcome.as_str(),
        summary.as_deref(),
        collected.as_ref(),
    )
    .await
    {
        error!(call_id = session.call_id, error = %err, "failed to persist outcome");
    }

    let transcript = session
        .history
        .iter()
        .map(|m| format!("{}: {}", m.role, m.content))
        .collect::<Vec<_>>()
        .join("\n");
    if !transcript.is_empty() {
        if let Err(err) = db::calls::set_transcript(&state.db, session.call_id, &transcript).await {
            error!(call_id = session.call_id, error = %err, "failed to persist transcript");
        }
    }

    if let Some(lead_id) = session.lead_id {
        let lead_status = if status == CallStatus::Completed {
            LeadStatus::from(outcome)
        } else {
            match status {
                CallStatus::Busy | CallStatus::NoAnswer => LeadStatus::NoAnswer,
                CallStatus::Voicemail => LeadStatus::Voicemail,
                _ => LeadStatus::Failed,
            }
        };
        if let Err(err) = db::leads::set_status(&state.db, lead_id, lead_status).await {
            error!(lead_id, error = %err, "failed to update lead status");
        }
    }

    state.events.broadcast(
        "call_completed",
        json!({
            "call_id": session.call_id,
            "campaign_id": session.campaign_id,
            "outcome": outcome,
            "summary": summary,
        }),
    );
}

/// A call reached a terminal status with no session in memory, e.g. after
/// a restart mid-call. Settle the lead from the call row so it does not
/// stay claimed; leads already settled are left alone.
async fn settle_without_session(state: &AppState, call_sid: &str, status: CallStatus) {
    let call = match db::calls::get_by_provider_id(&state.db, call_sid).await {
        Ok(Some(call)) => call,
        Ok(None) => return,
        Err(err) => {
            error!(call_sid = %call_sid, error = %err, "failed to load call for settlement");
            return;
        }
    };
    let Some(lead_id) = call.lead_id else {
        return;
    };
    let lead_status = match status {
        CallStatus::Completed => LeadStatus::Completed,
        CallStatus::Busy | CallStatus::NoAnswer => LeadStatus::NoAnswer,
        CallStatus::Voicemail => LeadStatus::Voicemail,
        _ => LeadStatus::Failed,
    };
    if let Err(err) = db::leads::settle_if_calling(&state.db, lead_id, lead_status).await {
        error!(lead_id, error = %err, "failed to settle lead after call ended");
    }
}

/// Recording ready. Store the URL and refine the transcript with Whisper
/// in the background.
pub async fn recording(
    State(state): State<AppState>,
    Form(payload): Form<TwilioPayload>,
) -> Response {
    let Some(recording_url) = payload.recording_url else {
        return ().into_response();
    };

    if let Err(err) =
        db::calls::set_recording_url(&state.db, &payload.call_sid, &recording_url).await
    {
        error!(call_sid = %payload.call_sid, error = %err, "failed to store recording url");
        return ().into_response();
    }

    let call_sid = payload.call_sid.clone();
    tokio::spawn(async move {
        if let Err(err) = refine_transcript(&state, &call_sid, &recording_url).await {
            warn!(call_sid = %call_sid, error = %err, "transcript refinement failed");
        }
    });
    ().into_response()
}

async fn refine_transcript(
    state: &AppState,
    call_sid: &str,
    recording_url: &str,
) -> anyhow::Result<()> {
    let Some(call) = db::calls::get_by_provider_id(&state.db, call_sid).await? else {
        return Ok(());
    };

    let twilio = state.config.read().await.twilio.clone();
    let audio = reqwest::Client::new()
        .get(format!("{recording_url}.mp3"))
        .basic_auth(&twilio.account_sid, Some(&twilio.auth_token))
        .send()
        .await?
        .error_for_status()?
        .bytes()
        .await?
        .to_vec();

    let language = call_language(state, call.campaign_id).await;
    let short_lang = language.split('-').next().unwrap_or("de").to_string();
    let text = state.openai.transcribe(audio, "recording.mp3", &short_lang).await?;
    db::calls::set_transcript(&state.db, call.id, &text).await?;
    info!(call_id = call.id, "transcript refined from recording");
    Ok(())
}

/// Async answering machine detection verdict.
pub async fn amd(State(state): State<AppState>, Form(payload): Form<TwilioPayload>) -> Response {
    let Some(answered_by) = payload.answered_by.as_deref() else {
        return ().into_response();
    };
    if !answered_by.starts_with("machine") {
        return ().into_response();
    }

    info!(call_sid = %payload.call_sid, answered_by, "machine answered, hanging up");
    if let Some(session) = state.sessions.get(&payload.call_sid).await {
        if let Some(lead_id) = session.lead_id {
            if let Err(err) =
                db::leads::set_status(&state.db, lead_id, LeadStatus::Voicemail).await
            {
                error!(lead_id, error = %err, "failed to mark lead as voicemail");
            }
        }
    }
    if let Err(err) = db::calls::set_status(&state.db, &payload.call_sid, CallStatus::Voicemail).await
    {
        error!(call_sid = %payload.call_sid, error = %err, "failed to mark call as voicemail");
    }
    if let Err(err) = state.telephony.hangup(&payload.call_sid).await {
        warn!(call_sid = %payload.call_sid, error = %err, "hangup after machine detection failed");
    }
    ().into_response()
}

/// Inbound call: recognize the caller by number so known leads are greeted
/// by name with their campaign's script; unknown callers get the default.
pub async fn incoming(
    State(state): State<AppState>,
    Form(payload): Form<TwilioPayload>,
) -> Response {
    let lead = match payload.from.as_deref() {
        Some(from) => db::leads::find_by_phone(&state.db, &normalize_phone(from))
            .await
            .unwrap_or_else(|err| {
                error!(call_sid = %payload.call_sid, error = %err, "caller lookup failed");
                None
            }),
        None => None,
    };
    let prompt_id = match lead.as_ref().and_then(|l| l.campaign_id) {
        Some(id) => db::campaigns::get(&state.db, id)
            .await
            .ok()
            .flatten()
            .and_then(|c| c.prompt_id),
        None => None,
    };

    let provider = state.telephony.provider_name().await;
    let call = match db::calls::create(
        &state.db,
        lead.as_ref().and_then(|l| l.campaign_id),
        lead.as_ref().map(|l| l.id),
        provider,
        &payload.call_sid,
        CallDirection::Inbound,
    )
    .await
    {
        Ok(call) => call,
        Err(err) => {
            error!(call_sid = %payload.call_sid, error = %err, "failed to record inbound call");
            return apology();
        }
    };

    let session = inbound_session(call.id, &payload.call_sid, lead.as_ref(), prompt_id);
    state.sessions.insert(session).await;

    info!(
        call_id = call.id,
        from = ?payload.from,
        lead_id = ?lead.as_ref().map(|l| l.id),
        "inbound call accepted"
    );
    state.events.broadcast(
        "call_started",
        json!({ "call_id": call.id, "direction": "inbound" }),
    );

    voice(State(state), Form(payload)).await
}

/// Session for a caller who rang us. A recognized lead carries its id and
/// campaign into the session so the answer webhook greets it by name.
fn inbound_session(
    call_id: i64,
    call_sid: &str,
    lead: Option<&Lead>,
    prompt_id: Option<i64>,
) -> CallSession {
    CallSession::new(
        call_id,
        call_sid,
        lead.and_then(|l| l.campaign_id),
        lead.map(|l| l.id),
        prompt_id,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn known_lead() -> Lead {
        Lead {
            id: 9,
            campaign_id: Some(4),
            phone: "+491712345678".into(),
            name: Some("Anna Beck".into()),
            email: None,
            company: None,
            extra_data: None,
            status: LeadStatus::Interested,
            created_at: None,
        }
    }

    #[test]
    fn recognized_caller_is_carried_into_the_session() {
        let lead = known_lead();
        let session = inbound_session(12, "CAin1", Some(&lead), Some(3));
        assert_eq!(session.lead_id, Some(9));
        assert_eq!(session.campaign_id, Some(4));
        assert_eq!(session.prompt_id, Some(3));

        let greeting = DialogueEngine::greeting(None, lead.name.as_deref());
        assert!(greeting.contains("Anna Beck"));
    }

    #[test]
    fn unknown_caller_gets_an_anonymous_session() {
        let session = inbound_session(13, "CAin2", None, None);
        assert_eq!(session.lead_id, None);
        assert_eq!(session.campaign_id, None);
        assert_eq!(session.prompt_id, None);
    }
}
