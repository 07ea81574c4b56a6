//! Lead queries and dispatch claiming

use sqlx::PgPool;

use super::calls::ACTIVE_STATUSES;
use crate::models::{normalize_phone, CreateLeadRequest, Lead, LeadStatus};

pub async fn list_for_campaign(
    pool: &PgPool,
    campaign_id: i64,
    status: Option<LeadStatus>,
) -> Result<Vec<Lead>, sqlx::Error> {
    match status {
        Some(status) => {
            sqlx::query_as::<_, Lead>(
                "SELECT * FROM leads WHERE campaign_id = $1 AND status = $2 ORDER BY id",
            )
            .bind(campaign_id)
            .bind(status)
            .fetch_all(pool)
            .await
        }
        None => {
            sqlx::query_as::<_, Lead>("SELECT * FROM leads WHERE campaign_id = $1 ORDER BY id")
                .bind(campaign_id)
                .fetch_all(pool)
                .await
        }
    }
}

pub async fn get(pool: &PgPool, id: i64) -> Result<Option<Lead>, sqlx::Error> {
    sqlx::query_as::<_, Lead>("SELECT * FROM leads WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Most recent lead matching a caller id, for recognizing inbound callers.
pub async fn find_by_phone(pool: &PgPool, phone: &str) -> Result<Option<Lead>, sqlx::Error> {
    sqlx::query_as::<_, Lead>("SELECT * FROM leads WHERE phone = $1 ORDER BY id DESC LIMIT 1")
        .bind(phone)
        .fetch_optional(pool)
        .await
}

pub async fn create(
    pool: &PgPool,
    campaign_id: i64,
    req: &CreateLeadRequest,
) -> Result<Lead, sqlx::Error> {
    sqlx::query_as::<_, Lead>(
        "INSERT INTO leads (campaign_id, phone, name, email, company, extra_data)
         VALUES ($1, $2, $3, $4, $5, $6)
         RETURNING *",
    )
    .bind(campaign_id)
    .bind(normalize_phone(&req.phone))
    .bind(&req.name)
    .bind(&req.email)
    .bind(&req.company)
    .bind(&req.extra_data)
    .fetch_one(pool)
    .await
}

/// Bulk import. Duplicate phone numbers within the campaign are skipped,
/// and the caller gets back how many rows actually landed.
pub async fn import(
    pool: &PgPool,
    campaign_id: i64,
    leads: &[CreateLeadRequest],
) -> Result<u64, sqlx::Error> {
    let mut imported = 0;
    let mut tx = pool.begin().await?;
    for lead in leads {
        let result = sqlx::query(
            "INSERT INTO leads (campaign_id, phone, name, email, company, extra_data)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT (campaign_id, phone) DO NOTHING",
        )
        .bind(campaign_id)
        .bind(normalize_phone(&lead.phone))
        .bind(&lead.name)
        .bind(&lead.email)
        .bind(&lead.company)
        .bind(&lead.extra_data)
        .execute(&mut *tx)
        .await?;
        imported += result.rows_affected();
    }
    tx.commit().await?;
    Ok(imported)
}

pub async fn set_status(
    pool: &PgPool,
    id: i64,
    status: LeadStatus,
) -> Result<Option<Lead>, sqlx::Error> {
    sqlx::query_as::<_, Lead>("UPDATE leads SET status = $2 WHERE id = $1 RETURNING *")
        .bind(id)
        .bind(status)
        .fetch_optional(pool)
        .await
}

pub async fn delete(pool: &PgPool, id: i64) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM leads WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Atomically claim up to `limit` pending leads for dialing by flipping
/// them to `calling`. Concurrent dispatchers skip rows another transaction
/// already locked, so a lead is never dialed twice.
pub async fn claim_pending(
    pool: &PgPool,
    campaign_id: i64,
    limit: i64,
) -> Result<Vec<Lead>, sqlx::Error> {
    sqlx::query_as::<_, Lead>(
        "UPDATE leads SET status = 'calling'
         WHERE id IN (
             SELECT id FROM leads
             WHERE campaign_id = $1 AND status = 'pending'
             ORDER BY id
             LIMIT $2
             FOR UPDATE SKIP LOCKED
         )
         RETURNING *",
    )
    .bind(campaign_id)
    .bind(limit)
    .fetch_all(pool)
    .await
}

pub async fn pending_count(pool: &PgPool, campaign_id: i64) -> Result<i64, sqlx::Error> {
    let (count,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM leads WHERE campaign_id = $1 AND status = 'pending'",
    )
    .bind(campaign_id)
    .fetch_one(pool)
    .await?;
    Ok(count)
}

/// Return leads stuck in `calling` to `pending`. Used when a campaign is
/// paused or the process restarts mid-dial. Leads whose call is still live
/// keep their claim, otherwise a resume would dial them a second time while
/// the first call is up.
pub async fn release_claimed(pool: &PgPool, campaign_id: i64) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(&format!(
        "UPDATE leads SET status = 'pending'
         WHERE campaign_id = $1 AND status = 'calling'
           AND id NOT IN (
               SELECT lead_id FROM calls
               WHERE lead_id IS NOT NULL AND status IN {ACTIVE_STATUSES}
           )",
    ))
    .bind(campaign_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}

/// Set a final status only on a lead still marked `calling`. Used when a
/// call reaches a terminal status without a live session, so an already
/// settled lead is never overwritten.
pub async fn settle_if_calling(
    pool: &PgPool,
    id: i64,
    status: LeadStatus,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("UPDATE leads SET status = $2 WHERE id = $1 AND status = 'calling'")
        .bind(id)
        .bind(status)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}
