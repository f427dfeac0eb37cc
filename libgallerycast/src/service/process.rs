//! Process task: publish a batch of queued items
//!
//! For each leased task the order is fixed: post, then write the seen
//! marker, then delete the task. A crash between the post and the other two
//! steps can publish an item twice; nothing is ever deleted unpublished.

use serde::Serialize;
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::cache::SeenCache;
use crate::config::ProcessingConfig;
use crate::format::StatusFormatter;
use crate::media::{Media, MediaSource};
use crate::platforms::Platform;
use crate::queue::TaskQueue;
use crate::quota::QuotaStore;
use crate::types::{QueuedTask, QuotaState};
use crate::Result;

/// Resolved processing knobs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessSettings {
    pub quota_floor: u32,
    pub lease_size: usize,
    pub visibility: Duration,
    pub cooldown: Duration,
    pub seen_ttl: Duration,
}

impl ProcessSettings {
    pub fn from_config(config: &ProcessingConfig) -> Result<Self> {
        Ok(Self {
            quota_floor: config.quota_floor,
            lease_size: config.lease_size,
            visibility: config.visibility_timeout()?,
            cooldown: config.cooldown()?,
            seen_ttl: config.seen_ttl()?,
        })
    }
}

impl Default for ProcessSettings {
    fn default() -> Self {
        Self {
            quota_floor: 100,
            lease_size: 20,
            visibility: Duration::from_secs(30),
            cooldown: Duration::from_secs(15 * 60),
            seen_ttl: Duration::from_secs(72 * 3600),
        }
    }
}

/// What happened to one leased task
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProcessOutcome {
    Posted {
        post_id: String,
        media_attached: bool,
        /// False when the seen marker could not be written
        marked: bool,
        /// False when the task could not be deleted
        deleted: bool,
    },
    /// Payload could not be decoded; the task stays queued
    Undecodable { reason: String },
    PostFailed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessItem {
    pub name: String,
    pub outcome: ProcessOutcome,
}

/// Why a run stopped before (or without) working through a full batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HaltReason {
    QuotaFloor { remaining: u32, floor: u32 },
    CoolingDown { until: i64 },
    PostingFailed { cooldown_until: i64 },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProcessReport {
    pub leased: usize,
    pub items: Vec<ProcessItem>,
    pub halt: Option<HaltReason>,
}

impl ProcessReport {
    pub fn posted(&self) -> usize {
        self.items
            .iter()
            .filter(|i| matches!(i.outcome, ProcessOutcome::Posted { .. }))
            .count()
    }

    /// True when a post failed; the entry point reports this as a failure
    pub fn posting_failed(&self) -> bool {
        matches!(self.halt, Some(HaltReason::PostingFailed { .. }))
    }
}

/// The collaborators one process run needs
pub struct Pipeline<'a> {
    pub queue: &'a dyn TaskQueue,
    pub cache: &'a dyn SeenCache,
    pub media: &'a dyn MediaSource,
    pub platform: &'a dyn Platform,
    pub quota: &'a dyn QuotaStore,
}

/// Lease a batch and publish it, as of `now` (unix seconds)
///
/// Does nothing while a cooldown is active or when the remaining quota is
/// under the floor. The quota is read again before every post after the
/// first, so a refresh that lands mid-batch stops the run at the floor.
/// The first failed post starts a cooldown and abandons the rest of the
/// batch; those leases simply time out.
pub async fn process(
    pipeline: &Pipeline<'_>,
    settings: &ProcessSettings,
    now: i64,
) -> Result<ProcessReport> {
    let mut report = ProcessReport::default();
    let mut state = pipeline.quota.load().await?;

    if let Some(halt) = gate(&state, settings, now) {
        info!(?halt, "nothing to do");
        report.halt = Some(halt);
        return Ok(report);
    }

    let tasks = pipeline
        .queue
        .lease(settings.lease_size, settings.visibility)
        .await?;
    report.leased = tasks.len();
    debug!(leased = tasks.len(), "leased tasks");

    for (index, task) in tasks.iter().enumerate() {
        if index > 0 {
            match pipeline.quota.load().await {
                Ok(current) => state = current,
                Err(e) => warn!(error = %e, "failed to re-read quota, using last known state"),
            }
            if let Some(halt) = gate(&state, settings, now) {
                info!(?halt, remaining_tasks = tasks.len() - index, "stopping batch");
                report.halt = Some(halt);
                break;
            }
        }

        let formatter = StatusFormatter::new(state.chars_reserved_per_media);
        let outcome = publish(pipeline, &formatter, settings, task).await;
        let failed = matches!(outcome, ProcessOutcome::PostFailed { .. });

        report.items.push(ProcessItem {
            name: task.name.clone(),
            outcome,
        });

        if failed {
            let cooldown_until = now + settings.cooldown.as_secs() as i64;
            state.cooldown_until = Some(cooldown_until);
            if let Err(e) = pipeline.quota.save(&state).await {
                warn!(error = %e, "failed to persist cooldown");
            }
            report.halt = Some(HaltReason::PostingFailed { cooldown_until });
            break;
        }
    }

    info!(
        leased = report.leased,
        posted = report.posted(),
        halted = report.halt.is_some(),
        "process finished"
    );
    Ok(report)
}

/// Whether the stored state allows another post
fn gate(state: &QuotaState, settings: &ProcessSettings, now: i64) -> Option<HaltReason> {
    if let Some(until) = state.cooldown_until.filter(|_| state.is_cooling_down(now)) {
        return Some(HaltReason::CoolingDown { until });
    }
    if state.remaining_calls < settings.quota_floor {
        return Some(HaltReason::QuotaFloor {
            remaining: state.remaining_calls,
            floor: settings.quota_floor,
        });
    }
    None
}

async fn publish(
    pipeline: &Pipeline<'_>,
    formatter: &StatusFormatter,
    settings: &ProcessSettings,
    task: &QueuedTask,
) -> ProcessOutcome {
    let item = match task.decode() {
        Ok(item) => item,
        Err(e) => {
            warn!(name = %task.name, error = %e, "undecodable task payload, skipping");
            return ProcessOutcome::Undecodable {
                reason: e.to_string(),
            };
        }
    };

    let media = pipeline.media.fetch(&item).await;
    let status = formatter.format(&item, media.is_attached());
    let sensitive = task.is_sensitive();

    let posted = match &media {
        Media::Attached(bytes) => {
            pipeline
                .platform
                .post_with_media(&status, bytes, sensitive)
                .await
        }
        Media::Skipped(_) => pipeline.platform.post_text(&status, sensitive).await,
    };

    let post_id = match posted {
        Ok(post_id) => post_id,
        Err(e) => {
            error!(
                name = %task.name,
                platform = pipeline.platform.name(),
                error = %e,
                "post failed, aborting batch"
            );
            return ProcessOutcome::PostFailed {
                reason: e.to_string(),
            };
        }
    };
    info!(name = %task.name, %post_id, "posted");

    let marked = match pipeline.cache.mark_seen(&item.id, settings.seen_ttl).await {
        Ok(_) => true,
        Err(e) => {
            warn!(id = %item.id, error = %e, "failed to write seen marker");
            false
        }
    };

    let deleted = match pipeline.queue.delete(task).await {
        Ok(()) => true,
        Err(e) => {
            warn!(name = %task.name, error = %e, "failed to delete task");
            false
        }
    };

    ProcessOutcome::Posted {
        post_id,
        media_attached: media.is_attached(),
        marked,
        deleted,
    }
}
