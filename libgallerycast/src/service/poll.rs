//! Poll task: move new gallery items into the queue

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cache::SeenCache;
use crate::gallery::GallerySource;
use crate::queue::{AddOutcome, TaskQueue};
use crate::types::{GalleryItem, QueuedTask};
use crate::Result;

/// What happened to one feed item
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "reason", rename_all = "snake_case")]
pub enum PollOutcome {
    Enqueued,
    AlreadySeen,
    AlreadyQueued,
    /// The cache could not be consulted; the item was skipped this round
    LookupFailed(String),
    EncodeFailed(String),
    EnqueueFailed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PollItem {
    pub id: String,
    pub outcome: PollOutcome,
}

/// Per-item results of one poll, oldest item first
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PollReport {
    pub items: Vec<PollItem>,
    /// Expired seen markers removed before polling
    pub purged: u64,
}

impl PollReport {
    pub fn enqueued(&self) -> usize {
        self.items
            .iter()
            .filter(|i| i.outcome == PollOutcome::Enqueued)
            .count()
    }

    pub fn skipped(&self) -> usize {
        self.items.len() - self.enqueued()
    }
}

/// Fetch the feed and enqueue every item not yet published
///
/// Only a feed failure is an error. Per-item problems are recorded in the
/// report and the item is skipped.
pub async fn poll(
    gallery: &dyn GallerySource,
    cache: &dyn SeenCache,
    queue: &dyn TaskQueue,
) -> Result<PollReport> {
    let mut report = PollReport::default();

    match cache.purge_expired().await {
        Ok(purged) => report.purged = purged,
        Err(e) => warn!(error = %e, "failed to purge expired seen markers"),
    }

    let items = gallery.fetch().await?;

    // The feed lists newest first
    for item in items.iter().rev() {
        let outcome = match cache.is_seen(&item.id).await {
            Ok(true) => PollOutcome::AlreadySeen,
            Ok(false) => enqueue(queue, item).await,
            Err(e) => {
                warn!(id = %item.id, error = %e, "seen lookup failed, skipping item");
                PollOutcome::LookupFailed(e.to_string())
            }
        };

        debug!(id = %item.id, ?outcome, "polled item");
        report.items.push(PollItem {
            id: item.id.clone(),
            outcome,
        });
    }

    info!(
        fetched = items.len(),
        enqueued = report.enqueued(),
        skipped = report.skipped(),
        "poll finished"
    );
    Ok(report)
}

async fn enqueue(queue: &dyn TaskQueue, item: &GalleryItem) -> PollOutcome {
    let task = match QueuedTask::from_item(item) {
        Ok(task) => task,
        Err(e) => {
            warn!(id = %item.id, error = %e, "failed to encode item");
            return PollOutcome::EncodeFailed(e.to_string());
        }
    };

    match queue.add(&task).await {
        Ok(AddOutcome::Added) => PollOutcome::Enqueued,
        Ok(AddOutcome::AlreadyExists) => PollOutcome::AlreadyQueued,
        Err(e) => {
            warn!(id = %item.id, error = %e, "failed to enqueue item");
            PollOutcome::EnqueueFailed(e.to_string())
        }
    }
}
