//! Redis Store - Shared Key-Value Backend
//!
//! Redis-backed store shared by every process: cache entries and token-bucket
//! state both live here.

use anyhow::{Context, Result};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client};
use std::time::Duration;
use tracing::{debug, info};

/// Redis store with `ConnectionManager` for automatic reconnection
pub struct RedisStore {
    /// Redis connection manager - handles reconnection automatically
    conn_manager: ConnectionManager,
}

impl RedisStore {
    /// Connect using `REDIS_URL` (default `redis://127.0.0.1:6379`)
    ///
    /// # Errors
    ///
    /// Returns an error if the Redis client cannot be created or connection fails.
    pub async fn new() -> Result<Self> {
        let redis_url =
            std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
        Self::with_url(&redis_url).await
    }

    /// Connect to a specific Redis URL
    ///
    /// # Errors
    ///
    /// Returns an error if the Redis client cannot be created or connection fails.
    pub async fn with_url(redis_url: &str) -> Result<Self> {
        info!(redis_url = %redis_url, "Initializing Redis store with ConnectionManager");

        let client = Client::open(redis_url)
            .with_context(|| format!("Failed to create Redis client with URL: {redis_url}"))?;

        let conn_manager = ConnectionManager::new(client)
            .await
            .context("Failed to establish Redis connection manager")?;

        let mut conn = conn_manager.clone();
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .context("Redis PING health check failed")?;

        info!(redis_url = %redis_url, "Redis store connected");

        Ok(Self { conn_manager })
    }
}

use crate::traits::KeyValueStore;
use async_trait::async_trait;

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.conn_manager.clone();
        let value: Option<Vec<u8>> = conn
            .get(key)
            .await
            .with_context(|| format!("Redis GET failed for key '{key}'"))?;
        Ok(value.filter(|bytes| !bytes.is_empty()))
    }

    async fn set_with_ttl(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
        let mut conn = self.conn_manager.clone();
        // SET EX rejects 0
        let secs = ttl.as_secs().max(1);
        let _: () = conn
            .set_ex(key, value, secs)
            .await
            .with_context(|| format!("Redis SET EX failed for key '{key}'"))?;
        debug!(key = %key, ttl_secs = secs, "[Redis] Stored key with TTL");
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let mut conn = self.conn_manager.clone();
        let _: () = conn
            .del(key)
            .await
            .with_context(|| format!("Redis DEL failed for key '{key}'"))?;
        Ok(())
    }

    /// Uses cursor-based `SCAN`, never `KEYS`
    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>> {
        let mut conn = self.conn_manager.clone();
        let mut keys = Vec::new();
        let mut cursor: u64 = 0;

        loop {
            let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut conn)
                .await
                .with_context(|| format!("Redis SCAN failed for pattern '{pattern}'"))?;

            cursor = next;
            keys.extend(batch);

            if cursor == 0 {
                break;
            }
        }

        // SCAN may return a key more than once
        keys.sort_unstable();
        keys.dedup();

        debug!(pattern = %pattern, count = keys.len(), "[Redis] Scanned keys matching pattern");
        Ok(keys)
    }

    async fn remove_bulk(&self, keys: &[String]) -> Result<usize> {
        if keys.is_empty() {
            return Ok(0);
        }

        let mut conn = self.conn_manager.clone();
        let count: usize = conn.del(keys).await.context("Redis bulk DEL failed")?;
        debug!(count = count, "[Redis] Removed keys in bulk");
        Ok(count)
    }

    async fn health_check(&self) -> bool {
        let test_key = "health_check_court_availability";
        let test_value = vec![1, 2, 3, 4];

        if self
            .set_with_ttl(test_key, &test_value, Duration::from_secs(10))
            .await
            .is_err()
        {
            return false;
        }
        match self.get(test_key).await {
            Ok(Some(retrieved)) => {
                let _ = self.remove(test_key).await;
                retrieved == test_value
            }
            _ => false,
        }
    }

    fn name(&self) -> &'static str {
        "Redis"
    }
}
