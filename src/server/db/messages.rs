//! Call transcript rows

use sqlx::PgPool;

use crate::models::CallMessage;

pub async fn insert(
    pool: &PgPool,
    call_id: i64,
    role: &str,
    content: &str,
) -> Result<CallMessage, sqlx::Error> {
    sqlx::query_as::<_, CallMessage>(
        "INSERT INTO call_messages (call_id, role, content)
         VALUES ($1, $2, $3)
         RETURNING *",
    )
    .bind(call_id)
    .bind(role)
    .bind(content)
    .fetch_one(pool)
    .await
}

pub async fn list_for_call(pool: &PgPool, call_id: i64) -> Result<Vec<CallMessage>, sqlx::Error> {
    sqlx::query_as::<_, CallMessage>(
        "SELECT * FROM call_messages WHERE call_id = $1 ORDER BY id",
    )
    .bind(call_id)
    .fetch_all(pool)
    .await
}
