//! Key/value cache with per-entry TTL.
//!
//! The cache is advisory: [`Cache`] absorbs every store failure, turning
//! failed reads into misses and failed writes into a warning. Nothing in the
//! pipeline depends on an entry being present.

mod memory;
mod postgres;

pub use memory::MemoryCache;
pub use postgres::PostgresCache;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("failed to encode cache payload: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("cache connection unavailable: {0}")]
    Pool(#[from] diesel_async::pooled_connection::deadpool::PoolError),

    #[error("cache query failed: {0}")]
    Query(#[from] diesel::result::Error),
}

/// Storage backend for the cache.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// `Ok(None)` on a miss or an expired entry.
    async fn get_string(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set_string(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;
}

/// Best-effort view over a [`CacheStore`].
#[derive(Clone)]
pub struct Cache {
    store: Arc<dyn CacheStore>,
}

impl Cache {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    pub async fn get_string(&self, key: &str) -> Option<String> {
        match self.store.get_string(key).await {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(key, error = %e, "Cache read failed, treating as miss");
                None
            }
        }
    }

    /// A payload that no longer decodes as `T` is treated as a miss.
    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let raw = self.get_string(key).await?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::debug!(key, error = %e, "Ignoring undecodable cache entry");
                None
            }
        }
    }

    pub async fn set_string(&self, key: &str, value: &str, ttl: Duration) {
        if let Err(e) = self.store.set_string(key, value, ttl).await {
            tracing::warn!(key, error = %e, "Cache write failed");
        }
    }

    pub async fn set_json<T: Serialize + ?Sized>(&self, key: &str, value: &T, ttl: Duration) {
        let payload = match serde_json::to_string(value) {
            Ok(payload) => payload,
            Err(e) => {
                let e = CacheError::from(e);
                tracing::warn!(key, error = %e, "Cache write failed");
                return;
            }
        };
        self.set_string(key, &payload, ttl).await;
    }
}
