//! Pull-style task queue
//!
//! Tasks are named after the gallery item they carry, so adding an item
//! twice is a no-op. Leasing hides a task from other consumers until its
//! visibility timeout passes; a consumer that finishes deletes it, one that
//! crashes simply lets the lease run out and the task comes back.

use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;

use crate::db::Database;
use crate::error::{DbError, Result};
use crate::types::QueuedTask;

/// Result of adding a task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    Added,
    /// A task with this name is already queued; nothing changed
    AlreadyExists,
}

#[async_trait]
pub trait TaskQueue: Send + Sync {
    async fn add(&self, task: &QueuedTask) -> Result<AddOutcome>;

    /// Lease up to `max` available tasks, oldest first
    async fn lease(&self, max: usize, visibility: Duration) -> Result<Vec<QueuedTask>>;

    /// Remove a task. Deleting a task that is already gone is not an error.
    async fn delete(&self, task: &QueuedTask) -> Result<()>;
}

/// Queue depth split by lease state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct QueueStats {
    pub available: u64,
    pub leased: u64,
}

fn lease_seconds(visibility: Duration) -> i64 {
    visibility.as_secs().max(1) as i64
}

impl Database {
    pub async fn add_task_at(&self, task: &QueuedTask, now: i64) -> Result<AddOutcome> {
        let result = sqlx::query(
            r#"
            INSERT INTO tasks (name, payload, tag, enqueued_at, leased_until)
            VALUES (?, ?, ?, ?, 0)
            ON CONFLICT(name) DO NOTHING
            "#,
        )
        .bind(&task.name)
        .bind(&task.payload)
        .bind(&task.tag)
        .bind(now)
        .execute(self.pool())
        .await
        .map_err(DbError::SqlxError)?;

        if result.rows_affected() == 0 {
            Ok(AddOutcome::AlreadyExists)
        } else {
            Ok(AddOutcome::Added)
        }
    }

    /// Lease tasks as of `now` (unix seconds)
    ///
    /// Selection and claim happen in one UPDATE statement, so the write lock
    /// is taken up front and two consumers never claim the same row.
    pub async fn lease_tasks_at(
        &self,
        max: usize,
        visibility: Duration,
        now: i64,
    ) -> Result<Vec<QueuedTask>> {
        use sqlx::Row;

        let leased_until = now + lease_seconds(visibility);

        let rows = sqlx::query(
            r#"
            UPDATE tasks SET leased_until = ?
            WHERE name IN (
                SELECT name FROM tasks
                WHERE leased_until <= ?
                ORDER BY enqueued_at ASC, rowid ASC
                LIMIT ?
            )
            RETURNING rowid AS seq, name, payload, tag, enqueued_at
            "#,
        )
        .bind(leased_until)
        .bind(now)
        .bind(max as i64)
        .fetch_all(self.pool())
        .await
        .map_err(DbError::SqlxError)?;

        // RETURNING gives no ordering guarantee
        let mut claimed: Vec<(i64, i64, QueuedTask)> = rows
            .into_iter()
            .map(|row| {
                (
                    row.get("enqueued_at"),
                    row.get("seq"),
                    QueuedTask {
                        name: row.get("name"),
                        payload: row.get("payload"),
                        tag: row.get("tag"),
                    },
                )
            })
            .collect();
        claimed.sort_by_key(|(enqueued_at, seq, _)| (*enqueued_at, *seq));

        Ok(claimed.into_iter().map(|(_, _, task)| task).collect())
    }

    pub async fn delete_task(&self, name: &str) -> Result<()> {
        sqlx::query("DELETE FROM tasks WHERE name = ?")
            .bind(name)
            .execute(self.pool())
            .await
            .map_err(DbError::SqlxError)?;

        Ok(())
    }

    pub async fn queue_stats_at(&self, now: i64) -> Result<QueueStats> {
        let (available, leased) = sqlx::query_as::<_, (i64, i64)>(
            r#"
            SELECT
                COALESCE(SUM(CASE WHEN leased_until <= ? THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN leased_until > ? THEN 1 ELSE 0 END), 0)
            FROM tasks
            "#,
        )
        .bind(now)
        .bind(now)
        .fetch_one(self.pool())
        .await
        .map_err(DbError::SqlxError)?;

        Ok(QueueStats {
            available: available as u64,
            leased: leased as u64,
        })
    }
}

#[async_trait]
impl TaskQueue for Database {
    async fn add(&self, task: &QueuedTask) -> Result<AddOutcome> {
        self.add_task_at(task, chrono::Utc::now().timestamp()).await
    }

    async fn lease(&self, max: usize, visibility: Duration) -> Result<Vec<QueuedTask>> {
        self.lease_tasks_at(max, visibility, chrono::Utc::now().timestamp())
            .await
    }

    async fn delete(&self, task: &QueuedTask) -> Result<()> {
        self.delete_task(&task.name).await
    }
}

struct MemoryEntry {
    task: QueuedTask,
    leased_until: i64,
}

/// In-process queue with the same semantics as the SQLite one
#[derive(Default)]
pub struct MemoryTaskQueue {
    entries: Mutex<Vec<MemoryEntry>>,
}

impl MemoryTaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Names of all queued tasks in insertion order
    pub fn names(&self) -> Vec<String> {
        self.entries
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.task.name.clone())
            .collect()
    }

    pub fn lease_at(&self, max: usize, visibility: Duration, now: i64) -> Vec<QueuedTask> {
        let mut entries = self.entries.lock().unwrap();
        entries
            .iter_mut()
            .filter(|e| e.leased_until <= now)
            .take(max)
            .map(|e| {
                e.leased_until = now + lease_seconds(visibility);
                e.task.clone()
            })
            .collect()
    }
}

#[async_trait]
impl TaskQueue for MemoryTaskQueue {
    async fn add(&self, task: &QueuedTask) -> Result<AddOutcome> {
        let mut entries = self.entries.lock().unwrap();
        if entries.iter().any(|e| e.task.name == task.name) {
            return Ok(AddOutcome::AlreadyExists);
        }
        entries.push(MemoryEntry {
            task: task.clone(),
            leased_until: 0,
        });
        Ok(AddOutcome::Added)
    }

    async fn lease(&self, max: usize, visibility: Duration) -> Result<Vec<QueuedTask>> {
        Ok(self.lease_at(max, visibility, chrono::Utc::now().timestamp()))
    }

    async fn delete(&self, task: &QueuedTask) -> Result<()> {
        self.entries
            .lock()
            .unwrap()
            .retain(|e| e.task.name != task.name);
        Ok(())
    }
}
