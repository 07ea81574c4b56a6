//! Outbound call dispatcher
//!
//! Each active campaign gets a scheduler task that wakes every minute,
//! checks the campaign's dialing window, and claims pending leads up to the
//! campaign's concurrency limit. A process-wide semaphore caps dialing
//! across all campaigns. Each claimed lead is dialed by a worker with one
//! retry on provider failure.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Datelike, Local};
use serde_json::json;
use sqlx::PgPool;
use tokio::sync::{RwLock, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::models::{Campaign, CampaignStatus, CallDirection, Lead, LeadStatus};
use crate::server::db;
use crate::server::events::EventHub;
use crate::server::session::{CallSession, SessionStore};
use crate::server::telephony::Telephony;

const SCHEDULER_TICK: Duration = Duration::from_secs(60);
const DIAL_ATTEMPTS: u32 = 2;
const RETRY_BASE: Duration = Duration::from_secs(60);

#[derive(Clone)]
pub struct Dialer {
    db: PgPool,
    telephony: Telephony,
    sessions: SessionStore,
    events: EventHub,
    dial_permits: Arc<Semaphore>,
    schedulers: Arc<RwLock<HashMap<i64, CancellationToken>>>,
}

impl Dialer {
    pub fn new(
        db: PgPool,
        telephony: Telephony,
        sessions: SessionStore,
        events: EventHub,
        max_concurrent_calls: usize,
    ) -> Self {
        Self {
            db,
            telephony,
            sessions,
            events,
            dial_permits: Arc::new(Semaphore::new(max_concurrent_calls)),
            schedulers: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Spawn scheduler tasks for campaigns that were active before a
    /// restart.
    pub async fn resume_active_campaigns(&self) -> Result<(), sqlx::Error> {
        for campaign in db::campaigns::list_by_status(&self.db, CampaignStatus::Active).await? {
            db::leads::release_claimed(&self.db, campaign.id).await?;
            self.spawn_scheduler(campaign.id).await;
        }
        Ok(())
    }

    pub async fn start_campaign(&self, campaign_id: i64) {
        self.spawn_scheduler(campaign_id).await;
        self.events
            .broadcast("campaign_started", json!({ "campaign_id": campaign_id }));
    }

    pub async fn stop_campaign(&self, campaign_id: i64) {
        if let Some(token) = self.schedulers.write().await.remove(&campaign_id) {
            token.cancel();
        }
        if let Err(err) = db::leads::release_claimed(&self.db, campaign_id).await {
            error!(campaign_id, error = %err, "failed to release claimed leads");
        }
        self.events
            .broadcast("campaign_stopped", json!({ "campaign_id": campaign_id }));
    }

    async fn spawn_scheduler(&self, campaign_id: i64) {
        let mut schedulers = self.schedulers.write().await;
        if schedulers.contains_key(&campaign_id) {
            return;
        }
        let token = CancellationToken::new();
        schedulers.insert(campaign_id, token.clone());
        drop(schedulers);

        let dialer = self.clone();
        tokio::spawn(async move {
            info!(campaign_id, "campaign scheduler started");
            let mut tick = tokio::time::interval(SCHEDULER_TICK);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tick.tick() => {
                        if !dialer.run_tick(campaign_id).await {
                            break;
                        }
                    }
                }
            }
            dialer.schedulers.write().await.remove(&campaign_id);
            info!(campaign_id, "campaign scheduler stopped");
        });
    }

    /// One scheduler pass. Returns false when the scheduler should exit
    /// because the campaign is no longer active.
    async fn run_tick(&self, campaign_id: i64) -> bool {
        let campaign = match db::campaigns::get(&self.db, campaign_id).await {
            Ok(Some(campaign)) => campaign,
            Ok(None) => return false,
            Err(err) => {
                error!(campaign_id, error = %err, "scheduler tick failed to load campaign");
                return true;
            }
        };
        if campaign.status != CampaignStatus::Active {
            return false;
        }

        let now = Local::now();
        if !campaign.within_window(now.weekday(), now.time()) {
            return true;
        }

        if let Err(err) = self.dispatch_pending(&campaign).await {
            error!(campaign_id, error = %err, "dispatch failed");
        }
        true
    }

    /// Claim up to the campaign's free concurrency slots worth of pending
    /// leads and dial each in its own worker. When no pending leads remain
    /// and no calls are live, the campaign completes.
    pub async fn dispatch_pending(&self, campaign: &Campaign) -> Result<(), sqlx::Error> {
        let in_flight = db::calls::active_count_for_campaign(&self.db, campaign.id).await?;
        let free = i64::from(campaign.max_concurrent) - in_flight;
        if free <= 0 {
            return Ok(());
        }

        let leads = db::leads::claim_pending(&self.db, campaign.id, free).await?;
        if leads.is_empty() {
            if in_flight == 0 && db::leads::pending_count(&self.db, campaign.id).await? == 0 {
                self.complete_campaign(campaign.id).await?;
            }
            return Ok(());
        }

        info!(campaign_id = campaign.id, count = leads.len(), "dispatching leads");
        for lead in leads {
            let dialer = self.clone();
            let campaign = campaign.clone();
            tokio::spawn(async move {
                dialer.dial_lead(&campaign, lead).await;
            });
        }
        Ok(())
    }

    async fn complete_campaign(&self, campaign_id: i64) -> Result<(), sqlx::Error> {
        db::campaigns::set_status(&self.db, campaign_id, CampaignStatus::Completed).await?;
        if let Some(token) = self.schedulers.write().await.remove(&campaign_id) {
            token.cancel();
        }
        info!(campaign_id, "campaign completed");
        self.events
            .broadcast("campaign_completed", json!({ "campaign_id": campaign_id }));
        Ok(())
    }

    /// Dial one lead: retry the provider once with backoff, then record the
    /// call and session on success or fail the lead. A dial slot is held
    /// only while a provider call is in flight, never across the backoff,
    /// so one failing call does not starve other workers.
    async fn dial_lead(&self, campaign: &Campaign, lead: Lead) {
        let mut last_error = None;
        for attempt in 1..=DIAL_ATTEMPTS {
            let placed = {
                let _permit = match self.dial_permits.clone().acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => return,
                };
                self.telephony.place_call(&lead.phone).await
            };
            match placed {
                Ok(provider_call_id) => {
                    self.register_call(campaign, &lead, &provider_call_id).await;
                    return;
                }
                Err(err) => {
                    warn!(
                        lead_id = lead.id,
                        attempt,
                        error = %err,
                        "dial attempt failed"
                    );
                    last_error = Some(err);
                    if attempt < DIAL_ATTEMPTS {
                        tokio::time::sleep(RETRY_BASE * attempt).await;
                    }
                }
            }
        }

        error!(
            lead_id = lead.id,
            error = %last_error.map(|e| e.to_string()).unwrap_or_default(),
            "lead could not be dialed"
        );
        if let Err(err) = db::leads::set_status(&self.db, lead.id, LeadStatus::Failed).await {
            error!(lead_id = lead.id, error = %err, "failed to mark lead as failed");
        }
        self.events.broadcast(
            "call_failed",
            json!({ "campaign_id": campaign.id, "lead_id": lead.id }),
        );
    }

    async fn register_call(&self, campaign: &Campaign, lead: &Lead, provider_call_id: &str) {
        let provider = self.telephony.provider_name().await;
        let call = match db::calls::create(
            &self.db,
            Some(campaign.id),
            Some(lead.id),
            provider,
            provider_call_id,
            CallDirection::Outbound,
        )
        .await
        {
            Ok(call) => call,
            Err(err) => {
                error!(lead_id = lead.id, error = %err, "failed to record call");
                return;
            }
        };

        self.sessions
            .insert(CallSession::new(
                call.id,
                provider_call_id,
                Some(campaign.id),
                Some(lead.id),
                campaign.prompt_id,
            ))
            .await;

        self.events.broadcast(
            "call_started",
            json!({
                "call_id": call.id,
                "campaign_id": campaign.id,
                "lead_id": lead.id,
                "phone": lead.phone,
            }),
        );
    }

    /// Kick an immediate dispatch outside the scheduler cadence. Used right
    /// after a campaign starts so the first calls go out without waiting a
    /// full tick.
    pub async fn dispatch_now(&self, campaign_id: i64) -> Result<(), sqlx::Error> {
        if let Some(campaign) = db::campaigns::get(&self.db, campaign_id).await? {
            if campaign.status == CampaignStatus::Active {
                let now = Local::now();
                if campaign.within_window(now.weekday(), now.time()) {
                    self.dispatch_pending(&campaign).await?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::postgres::PgPoolOptions;

    use crate::server::config::{ProviderConfig, SharedConfig, TelephonyKind, TwilioConfig};

    fn test_dialer(max_concurrent_calls: usize) -> Dialer {
        let mut config = ProviderConfig::from_env();
        config.telephony = TelephonyKind::Twilio;
        config.twilio = TwilioConfig::default();
        let config: SharedConfig = Arc::new(RwLock::new(config));
        let pool = PgPoolOptions::new()
            .connect_lazy("postgres://localhost:1/unreachable")
            .unwrap();
        Dialer::new(
            pool,
            Telephony::new(config),
            SessionStore::new(),
            EventHub::new(),
            max_concurrent_calls,
        )
    }

    fn campaign() -> Campaign {
        Campaign {
            id: 1,
            name: "test".into(),
            status: CampaignStatus::Active,
            prompt_id: None,
            language: "de-DE".into(),
            schedule_start: None,
            schedule_end: None,
            schedule_days: None,
            max_concurrent: 5,
            created_at: None,
            updated_at: None,
        }
    }

    fn lead() -> Lead {
        Lead {
            id: 1,
            campaign_id: Some(1),
            phone: "+491712345678".into(),
            name: None,
            email: None,
            company: None,
            extra_data: None,
            status: LeadStatus::Calling,
            created_at: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn dial_slot_is_free_during_retry_backoff() {
        let dialer = test_dialer(1);
        let worker = {
            let dialer = dialer.clone();
            let campaign = campaign();
            tokio::spawn(async move { dialer.dial_lead(&campaign, lead()).await })
        };

        // The first attempt fails immediately (no provider credentials) and
        // the worker backs off. The single slot must be available while it
        // sleeps.
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(dialer.dial_permits.available_permits(), 1);

        worker.await.unwrap();
        assert_eq!(dialer.dial_permits.available_permits(), 1);
    }
}
