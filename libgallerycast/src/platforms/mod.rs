//! Posting platform abstraction
//!
//! The processing pipeline only needs four things from the service it
//! republishes to: post text, post text with one image, report how many API
//! calls remain, and report how many characters an attachment costs.
//!
//! # Examples
//!
//! ```no_run
//! use libgallerycast::config::MastodonConfig;
//! use libgallerycast::platforms::{mastodon::MastodonClient, Platform};
//!
//! # async fn example() -> libgallerycast::error::Result<()> {
//! let config = MastodonConfig {
//!     instance: "mastodon.social".to_string(),
//!     token_file: "~/.config/gallerycast/mastodon.token".to_string(),
//!     timeout: "30s".to_string(),
//! };
//!
//! let platform = MastodonClient::from_config(&config)?;
//! println!("{} calls left", platform.remaining_quota().await?);
//! let id = platform.post_text("Hello (http://imgur.com/gallery/abcd123)", false).await?;
//! println!("Posted: {}", id);
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;

use crate::error::Result;

pub mod mastodon;

// Available outside tests so integration tests and embedders can use it
pub mod mock;

#[async_trait]
pub trait Platform: Send + Sync {
    /// Lowercase identifier, used in logs
    fn name(&self) -> &str;

    /// Publish a text-only status, returning the platform's post ID
    async fn post_text(&self, status: &str, sensitive: bool) -> Result<String>;

    /// Upload `media` and publish a status with it attached
    async fn post_with_media(&self, status: &str, media: &[u8], sensitive: bool)
        -> Result<String>;

    /// API calls left in the current rate-limit window
    async fn remaining_quota(&self) -> Result<u32>;

    /// Characters an attached image counts against the status length
    async fn media_reservation(&self) -> Result<usize>;
}
