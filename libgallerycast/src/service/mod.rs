//! Service layer for Gallerycast
//!
//! The three entry points are plain async functions over collaborator
//! traits ([`poll::poll`], [`process::process`],
//! [`RateTracker::refresh`](crate::quota::RateTracker::refresh)).
//! `GallerycastService` wires them to the SQLite database and the clients
//! named in the configuration, which is what the CLI uses.
//!
//! # Example
//!
//! ```no_run
//! use libgallerycast::service::GallerycastService;
//!
//! # async fn example() -> libgallerycast::Result<()> {
//! let service = GallerycastService::new().await?;
//!
//! let report = service.poll().await?;
//! println!("enqueued {}", report.enqueued());
//!
//! let report = service.process().await?;
//! println!("posted {}", report.posted());
//! # Ok(())
//! # }
//! ```

pub mod poll;
pub mod process;

pub use poll::{PollItem, PollOutcome, PollReport};
pub use process::{
    HaltReason, Pipeline, ProcessItem, ProcessOutcome, ProcessReport, ProcessSettings,
};

use serde::Serialize;

use crate::gallery::{GallerySource, ImgurGallery};
use crate::media::{HttpMediaFetcher, MediaSource};
use crate::platforms::mastodon::MastodonClient;
use crate::platforms::Platform;
use crate::queue::QueueStats;
use crate::quota::{QuotaStore, RateTracker, RefreshReport};
use crate::types::QuotaState;
use crate::{Config, Database, Result};

/// Snapshot of the persisted state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Stats {
    pub queue: QueueStats,
    pub seen_markers: u64,
    pub quota: QuotaState,
}

/// Entry points bound to one configuration and its database
pub struct GallerycastService {
    config: Config,
    db: Database,
}

impl GallerycastService {
    /// Create a service from the default configuration location
    pub async fn new() -> Result<Self> {
        let config = Config::load()?;
        Self::from_config(config).await
    }

    /// Create a service with a pre-loaded configuration, opening (and
    /// migrating) its database
    pub async fn from_config(config: Config) -> Result<Self> {
        let db = Database::new(&config.database.path).await?;
        Ok(Self { config, db })
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Poll the configured gallery feed
    pub async fn poll(&self) -> Result<PollReport> {
        let gallery = ImgurGallery::from_config(&self.config.gallery)?;
        self.poll_with(&gallery).await
    }

    pub async fn poll_with(&self, gallery: &dyn GallerySource) -> Result<PollReport> {
        poll::poll(gallery, &self.db, &self.db).await
    }

    /// Publish one batch to the configured Mastodon account
    pub async fn process(&self) -> Result<ProcessReport> {
        let platform = MastodonClient::from_config(&self.config.mastodon)?;
        let processing = &self.config.processing;
        let media =
            HttpMediaFetcher::new(processing.max_media_bytes, processing.media_timeout()?)?;
        self.process_with(&platform, &media).await
    }

    pub async fn process_with(
        &self,
        platform: &dyn Platform,
        media: &dyn MediaSource,
    ) -> Result<ProcessReport> {
        let settings = ProcessSettings::from_config(&self.config.processing)?;
        let pipeline = Pipeline {
            queue: &self.db,
            cache: &self.db,
            media,
            platform,
            quota: &self.db,
        };
        process::process(&pipeline, &settings, chrono::Utc::now().timestamp()).await
    }

    /// Refresh the stored quota from the configured Mastodon account
    pub async fn refresh_limits(&self) -> Result<RefreshReport> {
        let platform = MastodonClient::from_config(&self.config.mastodon)?;
        self.refresh_limits_with(&platform).await
    }

    pub async fn refresh_limits_with(&self, platform: &dyn Platform) -> Result<RefreshReport> {
        RateTracker::new(platform, &self.db)
            .refresh(chrono::Utc::now().timestamp())
            .await
    }

    pub async fn stats(&self) -> Result<Stats> {
        let now = chrono::Utc::now().timestamp();
        Ok(Stats {
            queue: self.db.queue_stats_at(now).await?,
            seen_markers: self.db.count_seen_at(now).await?,
            quota: QuotaStore::load(&self.db).await?,
        })
    }
}
