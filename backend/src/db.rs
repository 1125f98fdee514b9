use anyhow::{Context, Result};
use diesel_async::{
    pooled_connection::{deadpool::Pool, AsyncDieselConnectionManager},
    AsyncPgConnection, RunQueryDsl,
};

pub type DbPool = Pool<AsyncPgConnection>;

const CREATE_CACHE_TABLE: &str = "CREATE TABLE IF NOT EXISTS cache_entries (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    expires_at TIMESTAMPTZ NOT NULL
)";

const CREATE_EXPIRY_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS cache_entries_expires_at_idx ON cache_entries (expires_at)";

pub fn establish_connection_pool(database_url: &str) -> Result<DbPool> {
    let manager = AsyncDieselConnectionManager::<AsyncPgConnection>::new(database_url);
    let pool = Pool::builder(manager)
        .max_size(10)
        .build()
        .context("Failed to create database pool")?;

    Ok(pool)
}

/// Create the cache table if this database has never seen it.
pub async fn ensure_schema(pool: &DbPool) -> Result<()> {
    let mut conn = pool
        .get()
        .await
        .context("Failed to get database connection")?;

    diesel::sql_query(CREATE_CACHE_TABLE)
        .execute(&mut *conn)
        .await
        .context("Failed to create cache_entries table")?;
    diesel::sql_query(CREATE_EXPIRY_INDEX)
        .execute(&mut *conn)
        .await
        .context("Failed to create cache_entries index")?;

    Ok(())
}
