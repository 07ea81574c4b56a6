//! Prompt (call script) queries

use sqlx::PgPool;

use crate::models::{CreatePromptRequest, Prompt, UpdatePromptRequest};
use crate::server::dialogue::DEFAULT_SYSTEM_PROMPT;

pub async fn list(pool: &PgPool) -> Result<Vec<Prompt>, sqlx::Error> {
    sqlx::query_as::<_, Prompt>("SELECT * FROM prompts ORDER BY id")
        .fetch_all(pool)
        .await
}

pub async fn get(pool: &PgPool, id: i64) -> Result<Option<Prompt>, sqlx::Error> {
    sqlx::query_as::<_, Prompt>("SELECT * FROM prompts WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn create(pool: &PgPool, req: &CreatePromptRequest) -> Result<Prompt, sqlx::Error> {
    sqlx::query_as::<_, Prompt>(
        "INSERT INTO prompts (name, system_prompt, greeting, objection_handlers, closing_script, data_fields)
         VALUES ($1, $2, $3, $4, $5, $6)
         RETURNING *",
    )
    .bind(&req.name)
    .bind(&req.system_prompt)
    .bind(&req.greeting)
    .bind(&req.objection_handlers)
    .bind(&req.closing_script)
    .bind(&req.data_fields)
    .fetch_one(pool)
    .await
}

pub async fn update(
    pool: &PgPool,
    id: i64,
    req: &UpdatePromptRequest,
) -> Result<Option<Prompt>, sqlx::Error> {
    sqlx::query_as::<_, Prompt>(
        "UPDATE prompts SET
            name = COALESCE($2, name),
            system_prompt = COALESCE($3, system_prompt),
            greeting = COALESCE($4, greeting),
            objection_handlers = COALESCE($5, objection_handlers),
            closing_script = COALESCE($6, closing_script),
            data_fields = COALESCE($7, data_fields),
            updated_at = NOW()
         WHERE id = $1
         RETURNING *",
    )
    .bind(id)
    .bind(&req.name)
    .bind(&req.system_prompt)
    .bind(&req.greeting)
    .bind(&req.objection_handlers)
    .bind(&req.closing_script)
    .bind(&req.data_fields)
    .fetch_optional(pool)
    .await
}

pub async fn delete(pool: &PgPool, id: i64) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM prompts WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// Number of campaigns still pointing at this prompt. Deletion is refused
/// while this is non-zero.
pub async fn referencing_campaigns(pool: &PgPool, id: i64) -> Result<i64, sqlx::Error> {
    let (count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM campaigns WHERE prompt_id = $1")
            .bind(id)
            .fetch_one(pool)
            .await?;
    Ok(count)
}

/// Seed the starter solar sales script if no prompts exist yet.
pub async fn create_default(pool: &PgPool) -> Result<Prompt, sqlx::Error> {
    sqlx::query_as::<_, Prompt>(
        "INSERT INTO prompts (name, system_prompt, greeting, data_fields)
         VALUES ($1, $2, $3, $4)
         RETURNING *",
    )
    .bind("Solar Beratung")
    .bind(DEFAULT_SYSTEM_PROMPT)
    .bind("Guten Tag{name}, hier ist der Assistent der Sonnenkraft GmbH. Haben Sie einen kurzen Moment Zeit?")
    .bind(serde_json::json!(["dachform", "stromverbrauch", "wunschtermin"]))
    .fetch_one(pool)
    .await
}
