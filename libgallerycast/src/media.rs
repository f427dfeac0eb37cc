//! Image download for attachments
//!
//! Fetching media never fails the caller: anything that goes wrong turns
//! into [`Media::Skipped`] and the item is posted with an inline link
//! instead. There is no retry here; a task that fails later is redelivered
//! by the queue anyway.

use async_trait::async_trait;
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::{PlatformError, Result};
use crate::types::GalleryItem;

/// Largest image the posting service accepts, in bytes
pub const DEFAULT_MAX_MEDIA_BYTES: u64 = 3_000_000;

pub const DEFAULT_MEDIA_TIMEOUT: Duration = Duration::from_secs(10);

/// Why an item goes out without an attachment
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    TooLarge(u64),
    /// The feed reported no size, which is treated as too large
    UnknownSize,
    NoLink,
    FetchFailed(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::TooLarge(size) => write!(f, "image too large ({} bytes)", size),
            SkipReason::UnknownSize => write!(f, "image size unknown"),
            SkipReason::NoLink => write!(f, "no image link"),
            SkipReason::FetchFailed(reason) => write!(f, "download failed: {}", reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Media {
    Attached(Vec<u8>),
    Skipped(SkipReason),
}

impl Media {
    pub fn is_attached(&self) -> bool {
        matches!(self, Media::Attached(_))
    }

    pub fn bytes(&self) -> Option<&[u8]> {
        match self {
            Media::Attached(bytes) => Some(bytes),
            Media::Skipped(_) => None,
        }
    }
}

/// Resolves the attachment for a gallery item
#[async_trait]
pub trait MediaSource: Send + Sync {
    async fn fetch(&self, item: &GalleryItem) -> Media;
}

/// Downloads images over HTTP with a size ceiling and a per-request timeout
pub struct HttpMediaFetcher {
    client: reqwest::Client,
    max_bytes: u64,
}

impl HttpMediaFetcher {
    pub fn new(max_bytes: u64, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("gallerycast/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PlatformError::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { client, max_bytes })
    }

    /// Decide from feed metadata alone whether a download is worth trying
    pub fn precheck(&self, item: &GalleryItem) -> std::result::Result<String, SkipReason> {
        if item.size_bytes == 0 {
            return Err(SkipReason::UnknownSize);
        }
        if item.size_bytes > self.max_bytes {
            return Err(SkipReason::TooLarge(item.size_bytes));
        }
        item.image_link().ok_or(SkipReason::NoLink)
    }

    /// Download `url`, giving up as soon as the body passes `max_bytes`
    ///
    /// The feed's size field is only a hint; the ceiling is enforced on what
    /// actually arrives.
    async fn download(&self, url: &str) -> std::result::Result<Vec<u8>, SkipReason> {
        let fetch_failed = |e: reqwest::Error| {
            if e.is_timeout() {
                SkipReason::FetchFailed(format!("timed out fetching {}", url))
            } else {
                SkipReason::FetchFailed(e.to_string())
            }
        };

        let mut response = self.client.get(url).send().await.map_err(fetch_failed)?;

        let status = response.status();
        if !status.is_success() {
            return Err(SkipReason::FetchFailed(format!(
                "HTTP {} from {}",
                status.as_u16(),
                url
            )));
        }

        if let Some(length) = response.content_length() {
            if length > self.max_bytes {
                return Err(SkipReason::TooLarge(length));
            }
        }

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(fetch_failed)? {
            body.extend_from_slice(&chunk);
            if body.len() as u64 > self.max_bytes {
                return Err(SkipReason::TooLarge(body.len() as u64));
            }
        }

        if body.is_empty() {
            return Err(SkipReason::FetchFailed(format!("empty body from {}", url)));
        }
        Ok(body)
    }
}

#[async_trait]
impl MediaSource for HttpMediaFetcher {
    async fn fetch(&self, item: &GalleryItem) -> Media {
        let url = match self.precheck(item) {
            Ok(url) => url,
            Err(reason) => {
                debug!(id = %item.id, %reason, "posting without attachment");
                return Media::Skipped(reason);
            }
        };

        match self.download(&url).await {
            Ok(bytes) => {
                debug!(id = %item.id, bytes = bytes.len(), "downloaded attachment");
                Media::Attached(bytes)
            }
            Err(reason @ SkipReason::TooLarge(_)) => {
                warn!(id = %item.id, %url, %reason, "image larger than the feed reported");
                Media::Skipped(reason)
            }
            Err(reason) => {
                warn!(id = %item.id, %url, %reason, "attachment download failed");
                Media::Skipped(reason)
            }
        }
    }
}
