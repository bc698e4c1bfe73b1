use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tokio::sync::Mutex;

use crate::error::AppError;

/// Key-value store for ephemeral session state: device logins keyed by
/// access token and refresh token, all TTL-bound.
#[async_trait]
pub trait SessionCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, AppError>;
    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), AppError>;
    async fn delete(&self, key: &str) -> Result<(), AppError>;
    /// Atomic get-and-delete. Of two concurrent callers for the same key,
    /// exactly one observes the value. Single-use token redemption relies
    /// on this.
    async fn take(&self, key: &str) -> Result<Option<String>, AppError>;
}

/// Redis-backed cache used in dev and prod.
#[derive(Clone)]
pub struct RedisCache {
    connection: ConnectionManager,
}

impl RedisCache {
    pub async fn connect(redis_url: &str) -> Result<Self, AppError> {
        tracing::info!(redis_url = %redis_url, "Connecting to Redis");
        let client = redis::Client::open(redis_url)?;
        let connection = ConnectionManager::new(client).await?;
        tracing::info!("Redis connection established");
        Ok(Self { connection })
    }
}

#[async_trait]
impl SessionCache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        let mut con = self.connection.clone();
        let value: Option<String> = con.get(key).await?;
        tracing::debug!(key = %key, found = value.is_some(), "cache: GET");
        Ok(value)
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), AppError> {
        let mut con = self.connection.clone();
        let () = con.set_ex(key, value, ttl.as_secs()).await?;
        tracing::debug!(key = %key, ttl_secs = ttl.as_secs(), "cache: SETEX");
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), AppError> {
        let mut con = self.connection.clone();
        let () = con.del(key).await?;
        tracing::debug!(key = %key, "cache: DEL");
        Ok(())
    }

    async fn take(&self, key: &str) -> Result<Option<String>, AppError> {
        let mut con = self.connection.clone();
        // GETDEL makes read-then-delete a single server-side operation
        let value: Option<String> = con.get_del(key).await?;
        tracing::debug!(key = %key, found = value.is_some(), "cache: GETDEL");
        Ok(value)
    }
}

/// In-process cache for the test environment. Entries expire lazily on
/// access; atomicity comes from holding the map lock across read and
/// remove.
#[derive(Clone, Default)]
pub struct MemoryCache {
    entries: Arc<Mutex<HashMap<String, MemoryEntry>>>,
}

struct MemoryEntry {
    value: String,
    expires_at: Instant,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionCache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> Result<(), AppError> {
        let mut entries = self.entries.lock().await;
        entries.insert(
            key.to_string(),
            MemoryEntry {
                value: value.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), AppError> {
        let mut entries = self.entries.lock().await;
        entries.remove(key);
        Ok(())
    }

    async fn take(&self, key: &str) -> Result<Option<String>, AppError> {
        let mut entries = self.entries.lock().await;
        match entries.remove(key) {
            Some(entry) if entry.expires_at > Instant::now() => Ok(Some(entry.value)),
            _ => Ok(None),
        }
    }
}
