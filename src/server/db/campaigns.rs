//! Campaign queries

use sqlx::PgPool;

use crate::models::{Campaign, CampaignOverview, CampaignStatus, CreateCampaignRequest};

pub async fn list(pool: &PgPool) -> Result<Vec<CampaignOverview>, sqlx::Error> {
    sqlx::query_as::<_, CampaignOverview>(
        "SELECT c.*,
                COUNT(l.id) AS total_leads,
                COUNT(l.id) FILTER (WHERE l.status = 'pending') AS pending_leads,
                (SELECT COUNT(*) FROM calls WHERE campaign_id = c.id AND status = 'completed')
                    AS completed_calls
         FROM campaigns c
         LEFT JOIN leads l ON l.campaign_id = c.id
         GROUP BY c.id
         ORDER BY c.id DESC",
    )
    .fetch_all(pool)
    .await
}

pub async fn get(pool: &PgPool, id: i64) -> Result<Option<Campaign>, sqlx::Error> {
    sqlx::query_as::<_, Campaign>("SELECT * FROM campaigns WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn list_by_status(
    pool: &PgPool,
    status: CampaignStatus,
) -> Result<Vec<Campaign>, sqlx::Error> {
    sqlx::query_as::<_, Campaign>("SELECT * FROM campaigns WHERE status = $1 ORDER BY id")
        .bind(status)
        .fetch_all(pool)
        .await
}

pub async fn create(pool: &PgPool, req: &CreateCampaignRequest) -> Result<Campaign, sqlx::Error> {
    sqlx::query_as::<_, Campaign>(
        "INSERT INTO campaigns (name, prompt_id, language, schedule_start, schedule_end, schedule_days, max_concurrent)
         VALUES ($1, $2, $3, $4, $5, $6, $7)
         RETURNING *",
    )
    .bind(&req.name)
    .bind(req.prompt_id)
    .bind(req.language.as_deref().unwrap_or("de-DE"))
    .bind(req.schedule_start)
    .bind(req.schedule_end)
    .bind(&req.schedule_days)
    .bind(req.max_concurrent.unwrap_or(5))
    .fetch_one(pool)
    .await
}

pub async fn update(
    pool: &PgPool,
    id: i64,
    req: &CreateCampaignRequest,
) -> Result<Option<Campaign>, sqlx::Error> {
    sqlx::query_as::<_, Campaign>(
        "UPDATE campaigns SET
            name = $2,
            prompt_id = $3,
            language = COALESCE($4, language),
            schedule_start = $5,
            schedule_end = $6,
            schedule_days = $7,
            max_concurrent = COALESCE($8, max_concurrent),
            updated_at = NOW()
         WHERE id = $1
         RETURNING *",
    )
    .bind(id)
    .bind(&req.name)
    .bind(req.prompt_id)
    .bind(&req.language)
    .bind(req.schedule_start)
    .bind(req.schedule_end)
    .bind(&req.schedule_days)
    .bind(req.max_concurrent)
    .fetch_optional(pool)
    .await
}

pub async fn set_status(
    pool: &PgPool,
    id: i64,
    status: CampaignStatus,
) -> Result<Option<Campaign>, sqlx::Error> {
    sqlx::query_as::<_, Campaign>(
        "UPDATE campaigns SET status = $2, updated_at = NOW() WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .bind(status)
    .fetch_optional(pool)
    .await
}

pub async fn delete(pool: &PgPool, id: i64) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM campaigns WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}
