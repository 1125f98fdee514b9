use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel_async::{AsyncPgConnection, RunQueryDsl};

use super::{CacheError, CacheStore};
use crate::db::DbPool;
use crate::schema::cache_entries;

/// Cache store backed by the `cache_entries` table.
#[derive(Clone)]
pub struct PostgresCache {
    pool: DbPool,
}

impl PostgresCache {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Delete rows whose TTL has passed.
    pub async fn purge_expired(&self) -> Result<usize, CacheError> {
        let mut conn = self.pool.get().await?;
        delete_expired(&mut conn, Utc::now()).await
    }
}

#[async_trait]
impl CacheStore for PostgresCache {
    async fn get_string(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.pool.get().await?;
        find_live(&mut conn, key, Utc::now()).await
    }

    async fn set_string(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let expires_at = expiry(Utc::now(), ttl);
        let mut conn = self.pool.get().await?;
        upsert(&mut conn, key, value, expires_at).await
    }
}

fn expiry(now: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|ttl| now.checked_add_signed(ttl))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

async fn find_live(
    conn: &mut AsyncPgConnection,
    entry_key: &str,
    now: DateTime<Utc>,
) -> Result<Option<String>, CacheError> {
    let value = cache_entries::table
        .filter(cache_entries::key.eq(entry_key))
        .filter(cache_entries::expires_at.gt(now))
        .select(cache_entries::value)
        .first::<String>(conn)
        .await
        .optional()?;

    Ok(value)
}

async fn upsert(
    conn: &mut AsyncPgConnection,
    entry_key: &str,
    entry_value: &str,
    expires_at: DateTime<Utc>,
) -> Result<(), CacheError> {
    diesel::insert_into(cache_entries::table)
        .values((
            cache_entries::key.eq(entry_key),
            cache_entries::value.eq(entry_value),
            cache_entries::expires_at.eq(expires_at),
        ))
        .on_conflict(cache_entries::key)
        .do_update()
        .set((
            cache_entries::value.eq(entry_value),
            cache_entries::expires_at.eq(expires_at),
        ))
        .execute(conn)
        .await?;

    Ok(())
}

async fn delete_expired(
    conn: &mut AsyncPgConnection,
    now: DateTime<Utc>,
) -> Result<usize, CacheError> {
    let removed = diesel::delete(cache_entries::table.filter(cache_entries::expires_at.le(now)))
        .execute(conn)
        .await?;

    Ok(removed)
}
