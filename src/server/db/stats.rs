//! Reporting queries for the dashboard.

use serde_json::{json, Value};
use sqlx::PgPool;

pub async fn overview(pool: &PgPool) -> Result<Value, sqlx::Error> {
    let (total_campaigns, active_campaigns): (i64, i64) = sqlx::query_as(
        "SELECT COUNT(*), COUNT(*) FILTER (WHERE status = 'active') FROM campaigns",
    )
    .fetch_one(pool)
    .await?;

    let (total_leads, pending_leads): (i64, i64) = sqlx::query_as(
        "SELECT COUNT(*), COUNT(*) FILTER (WHERE status = 'pending') FROM leads",
    )
    .fetch_one(pool)
    .await?;

    let (total_calls, calls_today, interested, avg_duration): (i64, i64, i64, Option<f64>) =
        sqlx::query_as(
            "SELECT COUNT(*),
                    COUNT(*) FILTER (WHERE started_at >= CURRENT_DATE),
                    COUNT(*) FILTER (WHERE outcome = 'interested'),
                    AVG(duration) FILTER (WHERE duration IS NOT NULL)
             FROM calls",
        )
        .fetch_one(pool)
        .await?;

    Ok(json!({
        "total_campaigns": total_campaigns,
        "active_campaigns": active_campaigns,
        "total_leads": total_leads,
        "pending_leads": pending_leads,
        "total_calls": total_calls,
        "calls_today": calls_today,
        "interested_leads": interested,
        "avg_call_duration": avg_duration.map(|d| d.round() as i64),
    }))
}

pub async fn calls_per_day(pool: &PgPool, days: i64) -> Result<Vec<Value>, sqlx::Error> {
    let rows: Vec<(chrono::NaiveDate, i64, i64)> = sqlx::query_as(
        "SELECT started_at::date AS day,
                COUNT(*),
                COUNT(*) FILTER (WHERE status = 'completed')
         FROM calls
         WHERE started_at >= CURRENT_DATE - make_interval(days => $1::int)
         GROUP BY day
         ORDER BY day",
    )
    .bind(days)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(day, total, completed)| {
            json!({ "day": day, "total": total, "completed": completed })
        })
        .collect())
}

pub async fn outcomes(pool: &PgPool) -> Result<Vec<Value>, sqlx::Error> {
    let rows: Vec<(String, i64)> = sqlx::query_as(
        "SELECT COALESCE(outcome, 'unknown'), COUNT(*)
         FROM calls
         WHERE status = 'completed'
         GROUP BY 1
         ORDER BY 2 DESC",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(outcome, count)| json!({ "outcome": outcome, "count": count }))
        .collect())
}

pub async fn duration_distribution(pool: &PgPool) -> Result<Vec<Value>, sqlx::Error> {
    let rows: Vec<(String, i64)> = sqlx::query_as(
        "SELECT CASE
                    WHEN duration < 30 THEN '0-30s'
                    WHEN duration < 60 THEN '30-60s'
                    WHEN duration < 120 THEN '1-2m'
                    WHEN duration < 300 THEN '2-5m'
                    ELSE '5m+'
                END AS bucket,
                COUNT(*)
         FROM calls
         WHERE duration IS NOT NULL
         GROUP BY bucket
         ORDER BY MIN(duration)",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(bucket, count)| json!({ "bucket": bucket, "count": count }))
        .collect())
}

pub async fn campaign_performance(pool: &PgPool) -> Result<Vec<Value>, sqlx::Error> {
    let rows: Vec<(i64, String, i64, i64, i64)> = sqlx::query_as(
        "SELECT cp.id, cp.name,
                COUNT(c.id),
                COUNT(c.id) FILTER (WHERE c.status = 'completed'),
                COUNT(c.id) FILTER (WHERE c.outcome = 'interested')
         FROM campaigns cp
         LEFT JOIN calls c ON c.campaign_id = cp.id
         GROUP BY cp.id, cp.name
         ORDER BY cp.id",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(id, name, total, completed, interested)| {
            json!({
                "campaign_id": id,
                "name": name,
                "total_calls": total,
                "completed_calls": completed,
                "interested": interested,
            })
        })
        .collect())
}

pub async fn hourly_distribution(pool: &PgPool) -> Result<Vec<Value>, sqlx::Error> {
    let rows: Vec<(f64, i64, i64)> = sqlx::query_as(
        "SELECT EXTRACT(HOUR FROM started_at)::float8 AS hour,
                COUNT(*),
                COUNT(*) FILTER (WHERE outcome = 'interested')
         FROM calls
         WHERE started_at IS NOT NULL
         GROUP BY hour
         ORDER BY hour",
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(hour, total, interested)| {
            json!({ "hour": hour as i64, "total": total, "interested": interested })
        })
        .collect())
}
