//! Key/value cache with per-entry expiry.
//!
//! Values are opaque strings (callers store JSON). Both backends share the
//! same lifecycle: build or connect at startup, [`Cache::close`] on shutdown.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use redis::{AsyncCommands, Client, aio::ConnectionManager};
use tokio::sync::RwLock;

use crate::{GatewayError, Result};

/// Trait for the key/value cache.
#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Stores `value` under `key` for `ttl`.
    async fn set_ex(&self, key: &str, value: String, ttl: Duration) -> Result<()>;

    async fn delete(&self, key: &str) -> Result<()>;

    /// Releases the backend. Later calls fail with [`GatewayError::CacheClosed`].
    async fn close(&self) {}
}

#[derive(Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

/// In-process cache built on moka.
#[derive(Clone)]
pub struct MokaCache {
    inner: moka::future::Cache<String, Entry>,
}

impl MokaCache {
    /// Creates a cache holding at most `max_capacity` entries.
    pub fn new(max_capacity: u64) -> Self {
        let inner = moka::future::Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(Duration::from_secs(60 * 60))
            .build();
        Self { inner }
    }
}

impl Default for MokaCache {
    fn default() -> Self {
        Self::new(10_000)
    }
}

#[async_trait]
impl Cache for MokaCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        match self.inner.get(key).await {
            Some(entry) if entry.expires_at > Instant::now() => Ok(Some(entry.value)),
            Some(_) => {
                self.inner.invalidate(key).await;
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set_ex(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        let entry = Entry {
            value,
            expires_at: Instant::now() + ttl,
        };
        self.inner.insert(key.to_string(), entry).await;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.inner.invalidate(key).await;
        Ok(())
    }

    async fn close(&self) {
        self.inner.invalidate_all();
    }
}

/// Redis-backed cache.
#[derive(Clone)]
pub struct RedisCache {
    conn: Arc<RwLock<Option<ConnectionManager>>>,
}

impl RedisCache {
    /// Connects to Redis at `url`.
    pub async fn connect(url: &str) -> Result<Self> {
        let client = Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        tracing::info!("connected to redis");
        Ok(Self {
            conn: Arc::new(RwLock::new(Some(conn))),
        })
    }

    async fn connection(&self) -> Result<ConnectionManager> {
        self.conn
            .read()
            .await
            .clone()
            .ok_or(GatewayError::CacheClosed)
    }
}

#[async_trait]
impl Cache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.connection().await?;
        Ok(conn.get(key).await?)
    }

    async fn set_ex(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        let mut conn = self.connection().await?;
        let _: () = conn.set_ex(key, value, ttl.as_secs().max(1)).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.connection().await?;
        let _: () = conn.del(key).await?;
        Ok(())
    }

    async fn close(&self) {
        if self.conn.write().await.take().is_some() {
            tracing::info!("redis connection closed");
        }
    }
}
