//! Seen-item cache
//!
//! A marker for an item ID means it was already published. Markers are
//! written only after a successful post and expire after a TTL (72 hours by
//! default), by which time the item has dropped out of the feed.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use crate::db::Database;
use crate::error::{DbError, Result};

/// Result of writing a marker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkOutcome {
    Stored,
    /// A live marker already exists; it is left untouched
    AlreadyStored,
}

#[async_trait]
pub trait SeenCache: Send + Sync {
    async fn is_seen(&self, key: &str) -> Result<bool>;

    async fn mark_seen(&self, key: &str, ttl: Duration) -> Result<MarkOutcome>;

    /// Drop expired markers, returning how many were removed
    async fn purge_expired(&self) -> Result<u64>;
}

impl Database {
    pub async fn is_seen_at(&self, key: &str, now: i64) -> Result<bool> {
        let row = sqlx::query_as::<_, (i64,)>(
            "SELECT 1 FROM seen_markers WHERE key = ? AND expires_at > ?",
        )
        .bind(key)
        .bind(now)
        .fetch_optional(self.pool())
        .await
        .map_err(DbError::SqlxError)?;

        Ok(row.is_some())
    }

    /// Insert a marker unless a live one exists. An expired marker is replaced.
    pub async fn mark_seen_at(&self, key: &str, ttl: Duration, now: i64) -> Result<MarkOutcome> {
        let expires_at = now + ttl.as_secs() as i64;

        let result = sqlx::query(
            r#"
            INSERT INTO seen_markers (key, stored_at, expires_at)
            VALUES (?, ?, ?)
            ON CONFLICT(key) DO UPDATE SET
                stored_at = excluded.stored_at,
                expires_at = excluded.expires_at
            WHERE seen_markers.expires_at <= excluded.stored_at
            "#,
        )
        .bind(key)
        .bind(now)
        .bind(expires_at)
        .execute(self.pool())
        .await
        .map_err(DbError::SqlxError)?;

        if result.rows_affected() == 0 {
            Ok(MarkOutcome::AlreadyStored)
        } else {
            Ok(MarkOutcome::Stored)
        }
    }

    pub async fn purge_seen_before(&self, now: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM seen_markers WHERE expires_at <= ?")
            .bind(now)
            .execute(self.pool())
            .await
            .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected())
    }

    pub async fn count_seen_at(&self, now: i64) -> Result<u64> {
        let (count,) =
            sqlx::query_as::<_, (i64,)>("SELECT COUNT(*) FROM seen_markers WHERE expires_at > ?")
                .bind(now)
                .fetch_one(self.pool())
                .await
                .map_err(DbError::SqlxError)?;

        Ok(count as u64)
    }
}

#[async_trait]
impl SeenCache for Database {
    async fn is_seen(&self, key: &str) -> Result<bool> {
        self.is_seen_at(key, chrono::Utc::now().timestamp()).await
    }

    async fn mark_seen(&self, key: &str, ttl: Duration) -> Result<MarkOutcome> {
        self.mark_seen_at(key, ttl, chrono::Utc::now().timestamp())
            .await
    }

    async fn purge_expired(&self) -> Result<u64> {
        self.purge_seen_before(chrono::Utc::now().timestamp()).await
    }
}

/// In-process cache, keyed by item ID with an expiry in unix seconds
#[derive(Default)]
pub struct MemorySeenCache {
    markers: Mutex<HashMap<String, i64>>,
}

impl MemorySeenCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate markers, as if these items had been posted just now
    pub fn with_keys<I, S>(keys: I, ttl: Duration) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let expires_at = chrono::Utc::now().timestamp() + ttl.as_secs() as i64;
        let markers = keys.into_iter().map(|k| (k.into(), expires_at)).collect();
        Self {
            markers: Mutex::new(markers),
        }
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.markers.lock().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl SeenCache for MemorySeenCache {
    async fn is_seen(&self, key: &str) -> Result<bool> {
        let now = chrono::Utc::now().timestamp();
        Ok(self
            .markers
            .lock()
            .unwrap()
            .get(key)
            .is_some_and(|expires_at| *expires_at > now))
    }

    async fn mark_seen(&self, key: &str, ttl: Duration) -> Result<MarkOutcome> {
        let now = chrono::Utc::now().timestamp();
        let mut markers = self.markers.lock().unwrap();

        if markers.get(key).is_some_and(|expires_at| *expires_at > now) {
            return Ok(MarkOutcome::AlreadyStored);
        }
        markers.insert(key.to_string(), now + ttl.as_secs() as i64);
        Ok(MarkOutcome::Stored)
    }

    async fn purge_expired(&self) -> Result<u64> {
        let now = chrono::Utc::now().timestamp();
        let mut markers = self.markers.lock().unwrap();
        let before = markers.len();
        markers.retain(|_, expires_at| *expires_at > now);
        Ok((before - markers.len()) as u64)
    }
}
