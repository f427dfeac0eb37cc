//! Posting quota tracking
//!
//! The quota state (remaining calls, media reservation, cooldown) lives in
//! a store so that separate invocations of the entry points see the same
//! values. [`RateTracker`] refreshes it from the posting platform.

use async_trait::async_trait;
use std::sync::Mutex;
use tracing::{info, warn};

use crate::db::Database;
use crate::error::{DbError, GallerycastError, Result};
use crate::platforms::Platform;
use crate::types::QuotaState;

#[async_trait]
pub trait QuotaStore: Send + Sync {
    /// Current state, or defaults if nothing was ever stored
    async fn load(&self) -> Result<QuotaState>;

    async fn save(&self, state: &QuotaState) -> Result<()>;
}

#[async_trait]
impl QuotaStore for Database {
    async fn load(&self) -> Result<QuotaState> {
        let row = sqlx::query_as::<_, (i64, i64, Option<i64>, Option<i64>)>(
            r#"
            SELECT remaining_calls, chars_reserved_per_media, refreshed_at, cooldown_until
            FROM quota_state WHERE id = 1
            "#,
        )
        .fetch_optional(self.pool())
        .await
        .map_err(DbError::SqlxError)?;

        Ok(match row {
            Some((remaining, reserved, refreshed_at, cooldown_until)) => QuotaState {
                remaining_calls: remaining.max(0) as u32,
                chars_reserved_per_media: reserved.max(0) as usize,
                refreshed_at,
                cooldown_until,
            },
            None => QuotaState::default(),
        })
    }

    async fn save(&self, state: &QuotaState) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO quota_state (id, remaining_calls, chars_reserved_per_media, refreshed_at, cooldown_until)
            VALUES (1, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                remaining_calls = excluded.remaining_calls,
                chars_reserved_per_media = excluded.chars_reserved_per_media,
                refreshed_at = excluded.refreshed_at,
                cooldown_until = excluded.cooldown_until
            "#,
        )
        .bind(state.remaining_calls as i64)
        .bind(state.chars_reserved_per_media as i64)
        .bind(state.refreshed_at)
        .bind(state.cooldown_until)
        .execute(self.pool())
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }
}

/// Quota store held in memory, for tests and single-process embedding
#[derive(Default)]
pub struct MemoryQuotaStore {
    state: Mutex<QuotaState>,
}

impl MemoryQuotaStore {
    pub fn new(state: QuotaState) -> Self {
        Self {
            state: Mutex::new(state),
        }
    }

    pub fn snapshot(&self) -> QuotaState {
        *self.state.lock().unwrap()
    }
}

#[async_trait]
impl QuotaStore for MemoryQuotaStore {
    async fn load(&self) -> Result<QuotaState> {
        Ok(self.snapshot())
    }

    async fn save(&self, state: &QuotaState) -> Result<()> {
        *self.state.lock().unwrap() = *state;
        Ok(())
    }
}

/// What a refresh managed to update
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshReport {
    pub state: QuotaState,
    pub quota_updated: bool,
    pub reservation_updated: bool,
}

/// Refreshes the stored quota from the posting platform
pub struct RateTracker<'a> {
    platform: &'a dyn Platform,
    store: &'a dyn QuotaStore,
}

impl<'a> RateTracker<'a> {
    pub fn new(platform: &'a dyn Platform, store: &'a dyn QuotaStore) -> Self {
        Self { platform, store }
    }

    /// Query remaining calls and the media reservation
    ///
    /// The two lookups are independent. A value that could not be fetched
    /// keeps its previous stored value; whatever did succeed is saved before
    /// the first error is returned.
    pub async fn refresh(&self, now: i64) -> Result<RefreshReport> {
        let mut state = self.store.load().await?;
        let mut first_error: Option<GallerycastError> = None;

        let quota_updated = match self.platform.remaining_quota().await {
            Ok(remaining) => {
                state.remaining_calls = remaining;
                true
            }
            Err(e) => {
                warn!(
                    platform = self.platform.name(),
                    error = %e,
                    kept = state.remaining_calls,
                    "quota lookup failed, keeping previous value"
                );
                first_error.get_or_insert(e);
                false
            }
        };

        let reservation_updated = match self.platform.media_reservation().await {
            Ok(reserved) => {
                state.chars_reserved_per_media = reserved;
                true
            }
            Err(e) => {
                warn!(
                    platform = self.platform.name(),
                    error = %e,
                    kept = state.chars_reserved_per_media,
                    "media reservation lookup failed, keeping previous value"
                );
                first_error.get_or_insert(e);
                false
            }
        };

        if quota_updated || reservation_updated {
            state.refreshed_at = Some(now);
            self.store.save(&state).await?;
            info!(
                remaining_calls = state.remaining_calls,
                chars_reserved_per_media = state.chars_reserved_per_media,
                "quota state refreshed"
            );
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(RefreshReport {
                state,
                quota_updated,
                reservation_updated,
            }),
        }
    }
}
