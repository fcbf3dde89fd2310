//! Cache collaborators for derived report data.
//!
//! The engine treats the cache strictly as an optimization: any failure here
//! is logged by the caller and answered by recomputing from the store.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::NaiveDate;
use redis::AsyncCommands;
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CacheError {
    #[error("cache connection failed: {0}")]
    ConnectionFailed(String),
    #[error("cache operation failed: {0}")]
    OperationFailed(String),
}

pub type Result<T> = std::result::Result<T, CacheError>;

/// Returns the cache key for a monthly report, one variant per class filter.
pub fn monthly_report_key(month: &str, class: Option<&str>) -> String {
    format!("attendance:report:{}:{}", month, class.unwrap_or("all"))
}

/// Returns the cache key for one day's statistics.
pub fn daily_stats_key(date: NaiveDate) -> String {
    format!("attendance:stats:{}", date.format("%Y-%m-%d"))
}

/// Key-value cache with per-entry TTL.
#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    async fn put(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()>;

    async fn forget(&self, key: &str) -> Result<()>;
}

#[derive(Debug, Clone)]
struct MemoryEntry {
    value: Vec<u8>,
    expires_at: Instant,
}

/// In-memory cache with lazy expiry. The default backend when no Redis is
/// configured, and the test double.
#[derive(Debug, Clone, Default)]
pub struct MemoryCache {
    store: Arc<RwLock<HashMap<String, MemoryEntry>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let store = self.store.read().await;
        match store.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Ok(Some(entry.value.clone())),
            _ => Ok(None),
        }
    }

    async fn put(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
        let entry = MemoryEntry {
            value: value.to_vec(),
            expires_at: Instant::now() + ttl,
        };
        let mut store = self.store.write().await;
        store.insert(key.to_string(), entry);
        Ok(())
    }

    async fn forget(&self, key: &str) -> Result<()> {
        let mut store = self.store.write().await;
        store.remove(key);
        Ok(())
    }
}

/// Redis cache backend using the connection manager for pooling.
#[derive(Clone)]
pub struct RedisCache {
    conn: redis::aio::ConnectionManager,
}

impl RedisCache {
    pub async fn new(url: &str) -> Result<Self> {
        let client =
            redis::Client::open(url).map_err(|e| CacheError::ConnectionFailed(e.to_string()))?;
        let conn = redis::aio::ConnectionManager::new(client)
            .await
            .map_err(|e| CacheError::ConnectionFailed(e.to_string()))?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl Cache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.conn.clone();
        let value: Option<Vec<u8>> = conn
            .get(key)
            .await
            .map_err(|e| CacheError::OperationFailed(e.to_string()))?;
        Ok(value)
    }

    async fn put(&self, key: &str, value: &[u8], ttl: Duration) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(key, value, ttl.as_secs().max(1))
            .await
            .map_err(|e| CacheError::OperationFailed(e.to_string()))?;
        Ok(())
    }

    async fn forget(&self, key: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(key)
            .await
            .map_err(|e| CacheError::OperationFailed(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monthly_report_key_defaults_to_all() {
        assert_eq!(monthly_report_key("2024-01", None), "attendance:report:2024-01:all");
    }

    #[test]
    fn monthly_report_key_includes_class() {
        assert_eq!(
            monthly_report_key("2024-01", Some("10")),
            "attendance:report:2024-01:10"
        );
    }

    #[test]
    fn daily_stats_key_uses_iso_date() {
        let date = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        assert_eq!(daily_stats_key(date), "attendance:stats:2024-01-15");
    }

    #[tokio::test]
    async fn memory_put_and_get() {
        let cache = MemoryCache::new();
        cache
            .put("attendance:stats:2024-01-15", b"stats", Duration::from_secs(60))
            .await
            .unwrap();

        let value = cache.get("attendance:stats:2024-01-15").await.unwrap();
        assert_eq!(value, Some(b"stats".to_vec()));
    }

    #[tokio::test]
    async fn memory_get_missing_key() {
        let cache = MemoryCache::new();
        assert_eq!(cache.get("attendance:stats:2024-01-15").await.unwrap(), None);
    }

    #[tokio::test]
    async fn memory_forget_removes_entry() {
        let cache = MemoryCache::new();
        cache
            .put("attendance:report:2024-01:all", b"report", Duration::from_secs(60))
            .await
            .unwrap();

        cache.forget("attendance:report:2024-01:all").await.unwrap();
        assert_eq!(cache.get("attendance:report:2024-01:all").await.unwrap(), None);
    }

    #[tokio::test]
    async fn memory_entries_expire() {
        let cache = MemoryCache::new();
        cache
            .put("attendance:stats:2024-01-15", b"stats", Duration::from_millis(50))
            .await
            .unwrap();

        assert!(cache.get("attendance:stats:2024-01-15").await.unwrap().is_some());

        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(cache.get("attendance:stats:2024-01-15").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn memory_put_overwrites() {
        let cache = MemoryCache::new();
        cache
            .put("attendance:stats:2024-01-15", b"first", Duration::from_secs(60))
            .await
            .unwrap();
        cache
            .put("attendance:stats:2024-01-15", b"second", Duration::from_secs(60))
            .await
            .unwrap();

        let value = cache.get("attendance:stats:2024-01-15").await.unwrap();
        assert_eq!(value, Some(b"second".to_vec()));
    }
}
