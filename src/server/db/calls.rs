//! Call record queries

use sqlx::PgPool;

use crate::models::{Call, CallDirection, CallStatus, CallWithNames};

const WITH_NAMES: &str = "SELECT c.*, l.name AS lead_name, l.phone AS lead_phone, cp.name AS campaign_name
     FROM calls c
     LEFT JOIN leads l ON l.id = c.lead_id
     LEFT JOIN campaigns cp ON cp.id = c.campaign_id";

/// SQL list of the statuses a webhook may still move a call out of.
/// Terminal rows never match, so stale or out-of-order callbacks cannot
/// reopen a closed call.
pub(crate) const ACTIVE_STATUSES: &str = "('queued', 'initiated', 'ringing', 'in_progress')";

pub async fn list(
    pool: &PgPool,
    campaign_id: Option<i64>,
    limit: i64,
) -> Result<Vec<CallWithNames>, sqlx::Error> {
    match campaign_id {
        Some(campaign_id) => {
            sqlx::query_as::<_, CallWithNames>(&format!(
                "{WITH_NAMES} WHERE c.campaign_id = $1 ORDER BY c.id DESC LIMIT $2"
            ))
            .bind(campaign_id)
            .bind(limit)
            .fetch_all(pool)
            .await
        }
        None => {
            sqlx::query_as::<_, CallWithNames>(&format!(
                "{WITH_NAMES} ORDER BY c.id DESC LIMIT $1"
            ))
            .bind(limit)
            .fetch_all(pool)
            .await
        }
    }
}

pub async fn list_active(pool: &PgPool) -> Result<Vec<CallWithNames>, sqlx::Error> {
    sqlx::query_as::<_, CallWithNames>(&format!(
        "{WITH_NAMES} WHERE c.status IN {ACTIVE_STATUSES} ORDER BY c.id DESC"
    ))
    .fetch_all(pool)
    .await
}

pub async fn get(pool: &PgPool, id: i64) -> Result<Option<CallWithNames>, sqlx::Error> {
    sqlx::query_as::<_, CallWithNames>(&format!("{WITH_NAMES} WHERE c.id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn get_by_provider_id(
    pool: &PgPool,
    provider_call_id: &str,
) -> Result<Option<Call>, sqlx::Error> {
    sqlx::query_as::<_, Call>("SELECT * FROM calls WHERE provider_call_id = $1")
        .bind(provider_call_id)
        .fetch_optional(pool)
        .await
}

pub async fn create(
    pool: &PgPool,
    campaign_id: Option<i64>,
    lead_id: Option<i64>,
    provider: &str,
    provider_call_id: &str,
    direction: CallDirection,
) -> Result<Call, sqlx::Error> {
    sqlx::query_as::<_, Call>(
        "INSERT INTO calls (campaign_id, lead_id, provider, provider_call_id, direction, status, started_at)
         VALUES ($1, $2, $3, $4, $5, 'queued', NOW())
         RETURNING *",
    )
    .bind(campaign_id)
    .bind(lead_id)
    .bind(provider)
    .bind(provider_call_id)
    .bind(direction)
    .fetch_one(pool)
    .await
}

pub async fn set_status(
    pool: &PgPool,
    provider_call_id: &str,
    status: CallStatus,
) -> Result<Option<Call>, sqlx::Error> {
    sqlx::query_as::<_, Call>(&format!(
        "UPDATE calls SET status = $2
         WHERE provider_call_id = $1 AND status IN {ACTIVE_STATUSES}
         RETURNING *",
    ))
    .bind(provider_call_id)
    .bind(status)
    .fetch_optional(pool)
    .await
}

/// Close out a call with its terminal status and duration. Returns None
/// when the call is already closed.
pub async fn finish(
    pool: &PgPool,
    provider_call_id: &str,
    status: CallStatus,
    duration: Option<i32>,
) -> Result<Option<Call>, sqlx::Error> {
    sqlx::query_as::<_, Call>(&format!(
        "UPDATE calls SET status = $2, duration = COALESCE($3, duration), ended_at = NOW()
         WHERE provider_call_id = $1 AND status IN {ACTIVE_STATUSES}
         RETURNING *",
    ))
    .bind(provider_call_id)
    .bind(status)
    .bind(duration)
    .fetch_optional(pool)
    .await
}

pub async fn set_recording_url(
    pool: &PgPool,
    provider_call_id: &str,
    recording_url: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE calls SET recording_url = $2 WHERE provider_call_id = $1")
        .bind(provider_call_id)
        .bind(recording_url)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn set_transcript(
    pool: &PgPool,
    call_id: i64,
    transcript: &str,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE calls SET transcript = $2 WHERE id = $1")
        .bind(call_id)
        .bind(transcript)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn set_outcome(
    pool: &PgPool,
    call_id: i64,
    outcome: &str,
    ai_summary: Option<&str>,
    collected_data: Option<&serde_json::Value>,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        "UPDATE calls SET outcome = $2, ai_summary = $3, collected_data = $4 WHERE id = $1",
    )
    .bind(call_id)
    .bind(outcome)
    .bind(ai_summary)
    .bind(collected_data)
    .execute(pool)
    .await?;
    Ok(())
}

/// Calls on a campaign that are not yet terminal, for the concurrency gate.
pub async fn active_count_for_campaign(
    pool: &PgPool,
    campaign_id: i64,
) -> Result<i64, sqlx::Error> {
    let (count,): (i64,) = sqlx::query_as(&format!(
        "SELECT COUNT(*) FROM calls WHERE campaign_id = $1 AND status IN {ACTIVE_STATUSES}",
    ))
    .bind(campaign_id)
    .fetch_one(pool)
    .await?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_guard_covers_exactly_the_active_states() {
        let names: Vec<&str> = ACTIVE_STATUSES
            .trim_start_matches('(')
            .trim_end_matches(')')
            .split(", ")
            .map(|s| s.trim_matches('\''))
            .collect();
        assert_eq!(names.len(), 4);
        for name in names {
            let status = CallStatus::from_provider(name).unwrap();
            assert!(status.is_active());
            assert!(!status.is_terminal());
        }
    }
}
