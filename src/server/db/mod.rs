//! Database access
//!
//! Plain sqlx queries grouped per resource. All functions take the pool and
//! surface `sqlx::Error` to the caller.

pub mod calls;
pub mod campaigns;
pub mod leads;
pub mod messages;
pub mod prompts;
pub mod settings;
pub mod stats;
pub mod users;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

pub async fn init_pool(database_url: &str) -> Result<PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await?;
    info!("connected to database");
    Ok(pool)
}

pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}
