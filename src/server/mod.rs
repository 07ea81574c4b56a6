//! HTTP server
//!
//! Router, shared state, and the REST handlers. Handlers follow one shape:
//! JSON in, `Result<Json<T>, StatusCode>` out, with the `Claims` extractor
//! gating everything under /api except auth and health.

pub mod auth;
pub mod config;
pub mod db;
pub mod dialer;
pub mod dialogue;
pub mod events;
pub mod openai;
pub mod session;
pub mod telephony;
pub mod tts;
pub mod webhooks;

use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use sqlx::PgPool;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::models::{
    Call, CallMessage, CallWithNames, Campaign, CampaignOverview, CampaignStatus,
    CreateCampaignRequest, CreateLeadRequest, CreatePromptRequest, ImportLeadsRequest,
    ImportLeadsResponse, Lead, LeadStatus, Prompt, Settings, UpdateLeadStatusRequest,
    UpdatePromptRequest, UpdateSettingsRequest,
};
use self::auth::Claims;
use self::config::{ProviderConfig, SharedConfig};
use self::dialer::Dialer;
use self::dialogue::DialogueEngine;
use self::events::EventHub;
use self::openai::OpenAiClient;
use self::session::SessionStore;
use self::telephony::Telephony;
use self::tts::Speech;

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: SharedConfig,
    pub telephony: Telephony,
    pub speech: Speech,
    pub openai: OpenAiClient,
    pub dialogue: DialogueEngine,
    pub dialer: Dialer,
    pub sessions: SessionStore,
    pub events: EventHub,
    pub jwt_secret: String,
}

impl AppState {
    pub async fn build(db: PgPool, jwt_secret: String) -> Self {
        let mut provider_config = ProviderConfig::from_env();
        match db::settings::get(&db).await {
            Ok(Some(saved)) => provider_config.apply_settings(&saved),
            Ok(None) => {}
            Err(err) => warn!(error = %err, "could not load saved settings"),
        }
        let max_concurrent = provider_config.max_concurrent_calls;
        let config: SharedConfig = Arc::new(RwLock::new(provider_config));

        let sessions = SessionStore::new();
        let events = EventHub::new();
        let telephony = Telephony::new(config.clone());
        let speech = Speech::new(config.clone());
        let openai = OpenAiClient::new(config.clone());
        let dialogue = DialogueEngine::new(db.clone(), openai.clone(), sessions.clone());
        let dialer = Dialer::new(
            db.clone(),
            telephony.clone(),
            sessions.clone(),
            events.clone(),
            max_concurrent,
        );

        Self {
            db,
            config,
            telephony,
            speech,
            openai,
            dialogue,
            dialer,
            sessions,
            events,
            jwt_secret,
        }
    }
}

pub fn create_router(state: AppState, audio_dir: &str) -> Router {
    Router::new()
        .route("/api/auth/register", post(auth::register))
        .route("/api/auth/login", post(auth::login))
        .route("/api/campaigns", get(list_campaigns).post(create_campaign))
        .route(
            "/api/campaigns/{id}",
            get(get_campaign).put(update_campaign).delete(delete_campaign),
        )
        .route("/api/campaigns/{id}/start", post(start_campaign))
        .route("/api/campaigns/{id}/pause", post(pause_campaign))
        .route("/api/campaigns/{id}/stop", post(stop_campaign))
        .route(
            "/api/campaigns/{id}/leads",
            get(list_campaign_leads).post(create_lead),
        )
        .route("/api/campaigns/{id}/leads/import", post(import_leads))
        .route("/api/campaigns/{id}/calls", get(list_campaign_calls))
        .route("/api/leads/{id}", get(get_lead).put(update_lead_status).delete(delete_lead))
        .route("/api/prompts", get(list_prompts).post(create_prompt))
        .route("/api/prompts/default", post(create_default_prompt))
        .route(
            "/api/prompts/{id}",
            get(get_prompt).put(update_prompt).delete(delete_prompt),
        )
        .route("/api/calls", get(list_calls))
        .route("/api/calls/active", get(list_active_calls))
        .route("/api/calls/{id}", get(get_call))
        .route("/api/calls/{id}/transcript", get(get_call_transcript))
        .route("/api/calls/{id}/end", post(end_call))
        .route("/api/settings", get(get_settings).put(update_settings))
        .route("/api/settings/voices", get(list_voices))
        .route("/api/stats", get(stats_overview))
        .route("/api/stats/calls-per-day", get(stats_calls_per_day))
        .route("/api/stats/outcomes", get(stats_outcomes))
        .route("/api/stats/duration-distribution", get(stats_durations))
        .route("/api/stats/campaign-performance", get(stats_campaigns))
        .route("/api/stats/hourly-distribution", get(stats_hourly))
        .route("/api/health", get(health))
        .route("/webhooks/twilio/voice", post(webhooks::voice))
        .route("/webhooks/twilio/gather", post(webhooks::gather))
        .route("/webhooks/twilio/no-input", post(webhooks::no_input))
        .route("/webhooks/twilio/status", post(webhooks::status))
        .route("/webhooks/twilio/recording", post(webhooks::recording))
        .route("/webhooks/twilio/amd", post(webhooks::amd))
        .route("/webhooks/twilio/incoming", post(webhooks::incoming))
        .route("/ws", get(ws_upgrade))
        .nest_service("/audio", ServeDir::new(audio_dir))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run_server(state: AppState, port: u16) -> anyhow::Result<()> {
    if let Err(err) = state.dialer.resume_active_campaigns().await {
        warn!(error = %err, "could not resume active campaigns");
    }

    let audio_dir = state.config.read().await.audio_dir.clone();
    tokio::fs::create_dir_all(&audio_dir).await?;
    let app = create_router(state, &audio_dir);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "listening");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn ws_upgrade(State(state): State<AppState>, upgrade: WebSocketUpgrade) -> Response {
    let hub = state.events.clone();
    upgrade.on_upgrade(move |socket| events::serve_socket(socket, hub))
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    let db_ok = sqlx::query("SELECT 1").execute(&state.db).await.is_ok();
    Json(json!({
        "status": if db_ok { "ok" } else { "degraded" },
        "active_calls": state.sessions.active_count().await,
    }))
}

// Campaigns

async fn list_campaigns(
    _claims: Claims,
    State(state): State<AppState>,
) -> Result<Json<Vec<CampaignOverview>>, StatusCode> {
    db::campaigns::list(&state.db)
        .await
        .map(Json)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

async fn create_campaign(
    _claims: Claims,
    State(state): State<AppState>,
    Json(req): Json<CreateCampaignRequest>,
) -> Result<(StatusCode, Json<Campaign>), StatusCode> {
    if req.name.trim().is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }
    let campaign = db::campaigns::create(&state.db, &req)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok((StatusCode::CREATED, Json(campaign)))
}

async fn get_campaign(
    _claims: Claims,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Campaign>, StatusCode> {
    db::campaigns::get(&state.db, id)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn update_campaign(
    _claims: Claims,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<CreateCampaignRequest>,
) -> Result<Json<Campaign>, StatusCode> {
    db::campaigns::update(&state.db, id, &req)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn delete_campaign(
    _claims: Claims,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, StatusCode> {
    let campaign = db::campaigns::get(&state.db, id)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::NOT_FOUND)?;
    if campaign.status == CampaignStatus::Active {
        return Err(StatusCode::BAD_REQUEST);
    }
    db::campaigns::delete(&state.db, id)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn start_campaign(
    _claims: Claims,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Campaign>, StatusCode> {
    let pending = db::leads::pending_count(&state.db, id)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    if pending == 0 {
        return Err(StatusCode::BAD_REQUEST);
    }

    let campaign = db::campaigns::set_status(&state.db, id, CampaignStatus::Active)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::NOT_FOUND)?;

    state.dialer.start_campaign(id).await;
    if let Err(err) = state.dialer.dispatch_now(id).await {
        warn!(campaign_id = id, error = %err, "initial dispatch failed");
    }
    Ok(Json(campaign))
}

async fn pause_campaign(
    _claims: Claims,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Campaign>, StatusCode> {
    let campaign = db::campaigns::set_status(&state.db, id, CampaignStatus::Paused)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::NOT_FOUND)?;
    state.dialer.stop_campaign(id).await;
    Ok(Json(campaign))
}

async fn stop_campaign(
    _claims: Claims,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Campaign>, StatusCode> {
    let campaign = db::campaigns::set_status(&state.db, id, CampaignStatus::Stopped)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::NOT_FOUND)?;
    state.dialer.stop_campaign(id).await;
    Ok(Json(campaign))
}

// Leads

#[derive(Debug, Deserialize)]
struct LeadsQuery {
    status: Option<LeadStatus>,
}

async fn list_campaign_leads(
    _claims: Claims,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(query): Query<LeadsQuery>,
) -> Result<Json<Vec<Lead>>, StatusCode> {
    db::leads::list_for_campaign(&state.db, id, query.status)
        .await
        .map(Json)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

async fn create_lead(
    _claims: Claims,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<CreateLeadRequest>,
) -> Result<(StatusCode, Json<Lead>), StatusCode> {
    if req.phone.trim().is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }
    let lead = db::leads::create(&state.db, id, &req).await.map_err(|err| {
        if matches!(&err, sqlx::Error::Database(e) if e.is_unique_violation()) {
            StatusCode::CONFLICT
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    })?;
    Ok((StatusCode::CREATED, Json(lead)))
}

async fn import_leads(
    _claims: Claims,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<ImportLeadsRequest>,
) -> Result<Json<ImportLeadsResponse>, StatusCode> {
    if req.leads.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }
    let valid: Vec<CreateLeadRequest> = req
        .leads
        .into_iter()
        .filter(|l| !l.phone.trim().is_empty())
        .collect();
    let imported = db::leads::import(&state.db, id, &valid)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok(Json(ImportLeadsResponse {
        imported,
        skipped: valid.len() as u64 - imported,
    }))
}

async fn get_lead(
    _claims: Claims,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Lead>, StatusCode> {
    db::leads::get(&state.db, id)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn update_lead_status(
    _claims: Claims,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<UpdateLeadStatusRequest>,
) -> Result<Json<Lead>, StatusCode> {
    db::leads::set_status(&state.db, id, req.status)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn delete_lead(
    _claims: Claims,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, StatusCode> {
    let deleted = db::leads::delete(&state.db, id)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(StatusCode::NOT_FOUND)
    }
}

// Prompts

async fn list_prompts(
    _claims: Claims,
    State(state): State<AppState>,
) -> Result<Json<Vec<Prompt>>, StatusCode> {
    db::prompts::list(&state.db)
        .await
        .map(Json)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

async fn create_prompt(
    _claims: Claims,
    State(state): State<AppState>,
    Json(req): Json<CreatePromptRequest>,
) -> Result<(StatusCode, Json<Prompt>), StatusCode> {
    if req.name.trim().is_empty() || req.system_prompt.trim().is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }
    let prompt = db::prompts::create(&state.db, &req)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok((StatusCode::CREATED, Json(prompt)))
}

async fn create_default_prompt(
    _claims: Claims,
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<Prompt>), StatusCode> {
    let prompt = db::prompts::create_default(&state.db)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    Ok((StatusCode::CREATED, Json(prompt)))
}

async fn get_prompt(
    _claims: Claims,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Prompt>, StatusCode> {
    db::prompts::get(&state.db, id)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn update_prompt(
    _claims: Claims,
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(req): Json<UpdatePromptRequest>,
) -> Result<Json<Prompt>, StatusCode> {
    db::prompts::update(&state.db, id, &req)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn delete_prompt(
    _claims: Claims,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<StatusCode, StatusCode> {
    let references = db::prompts::referencing_campaigns(&state.db, id)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    if references > 0 {
        return Err(StatusCode::BAD_REQUEST);
    }
    let deleted = db::prompts::delete(&state.db, id)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(StatusCode::NOT_FOUND)
    }
}

// Calls

#[derive(Debug, Deserialize)]
struct CallsQuery {
    campaign_id: Option<i64>,
    limit: Option<i64>,
}

async fn list_calls(
    _claims: Claims,
    State(state): State<AppState>,
    Query(query): Query<CallsQuery>,
) -> Result<Json<Vec<CallWithNames>>, StatusCode> {
    let limit = query.limit.unwrap_or(100).clamp(1, 500);
    db::calls::list(&state.db, query.campaign_id, limit)
        .await
        .map(Json)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

async fn list_campaign_calls(
    _claims: Claims,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<CallWithNames>>, StatusCode> {
    db::calls::list(&state.db, Some(id), 500)
        .await
        .map(Json)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

async fn list_active_calls(
    _claims: Claims,
    State(state): State<AppState>,
) -> Result<Json<Vec<CallWithNames>>, StatusCode> {
    db::calls::list_active(&state.db)
        .await
        .map(Json)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

async fn get_call(
    _claims: Claims,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<CallWithNames>, StatusCode> {
    db::calls::get(&state.db, id)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}

async fn get_call_transcript(
    _claims: Claims,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<CallMessage>>, StatusCode> {
    db::messages::list_for_call(&state.db, id)
        .await
        .map(Json)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

async fn end_call(
    _claims: Claims,
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Call>, StatusCode> {
    let call = db::calls::get(&state.db, id)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?
        .ok_or(StatusCode::NOT_FOUND)?;

    if !call.call.status.is_active() {
        return Err(StatusCode::BAD_REQUEST);
    }
    let provider_call_id = call
        .call
        .provider_call_id
        .clone()
        .ok_or(StatusCode::BAD_REQUEST)?;

    state
        .telephony
        .hangup(&provider_call_id)
        .await
        .map_err(|_| StatusCode::BAD_GATEWAY)?;
    Ok(Json(call.call))
}

// Settings

async fn get_settings(
    _claims: Claims,
    State(state): State<AppState>,
) -> Result<Json<Option<Settings>>, StatusCode> {
    db::settings::get(&state.db)
        .await
        .map(Json)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

async fn update_settings(
    _claims: Claims,
    State(state): State<AppState>,
    Json(req): Json<UpdateSettingsRequest>,
) -> Result<Json<Settings>, StatusCode> {
    let saved = db::settings::upsert(&state.db, &req)
        .await
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    state.config.write().await.apply_update(&req);
    Ok(Json(saved))
}

/// Voices offered by the currently selected speech backend.
async fn list_voices(
    _claims: Claims,
    State(state): State<AppState>,
) -> Result<Json<Vec<tts::Voice>>, StatusCode> {
    state
        .speech
        .voices()
        .await
        .map(Json)
        .map_err(|_| StatusCode::BAD_GATEWAY)
}

// Stats

async fn stats_overview(
    _claims: Claims,
    State(state): State<AppState>,
) -> Result<Json<Value>, StatusCode> {
    db::stats::overview(&state.db)
        .await
        .map(Json)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

#[derive(Debug, Deserialize)]
struct DaysQuery {
    days: Option<i64>,
}

async fn stats_calls_per_day(
    _claims: Claims,
    State(state): State<AppState>,
    Query(query): Query<DaysQuery>,
) -> Result<Json<Vec<Value>>, StatusCode> {
    let days = query.days.unwrap_or(30).clamp(1, 365);
    db::stats::calls_per_day(&state.db, days)
        .await
        .map(Json)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

async fn stats_outcomes(
    _claims: Claims,
    State(state): State<AppState>,
) -> Result<Json<Vec<Value>>, StatusCode> {
    db::stats::outcomes(&state.db)
        .await
        .map(Json)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

async fn stats_durations(
    _claims: Claims,
    State(state): State<AppState>,
) -> Result<Json<Vec<Value>>, StatusCode> {
    db::stats::duration_distribution(&state.db)
        .await
        .map(Json)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

async fn stats_campaigns(
    _claims: Claims,
    State(state): State<AppState>,
) -> Result<Json<Vec<Value>>, StatusCode> {
    db::stats::campaign_performance(&state.db)
        .await
        .map(Json)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

async fn stats_hourly(
    _claims: Claims,
    State(state): State<AppState>,
) -> Result<Json<Vec<Value>>, StatusCode> {
    db::stats::hourly_distribution(&state.db)
        .await
        .map(Json)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}
